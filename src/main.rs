use anyhow::{Context, Result};
use price_oracle::config::loader::AppConfig;
use price_oracle::observability::metrics::{gather_metrics, register_metrics};
use price_oracle::observability::tracing::init_tracing;
use price_oracle::{AssetType, PriceOracle};
use tracing::{info, warn};

/// `price_oracle [SYMBOL[:ASSET_TYPE] ...]`
///
/// Without arguments the configured watchlist is priced. Asset type defaults
/// to crypto. Set `ORACLE_ENV` to pick `config/<env>.toml`.
#[tokio::main]
async fn main() -> Result<()> {
    let env = std::env::var("ORACLE_ENV").unwrap_or_else(|_| "development".to_string());
    let config = AppConfig::load(&env).context("loading configuration")?;

    init_tracing(&config.logging);
    register_metrics().context("registering metrics")?;

    let oracle = PriceOracle::from_config(&config).context("building price oracle")?;
    let _sweeper = oracle.start_cache_sweeper();

    let requests = parse_requests(std::env::args().skip(1))?;
    let requests = if requests.is_empty() {
        config.watchlist
            .iter()
            .map(|entry| (entry.symbol.clone(), entry.asset_type))
            .collect()
    } else {
        requests
    };

    info!(env = %env, symbols = requests.len(), "pricing symbols");
    let prices = oracle.get_multiple_prices(&requests).await;

    for (symbol, _) in &requests {
        if let Some(None) = prices.get(symbol) {
            warn!(symbol = %symbol, "no consensus price");
        }
    }

    println!("{}", serde_json::to_string_pretty(&prices)?);
    println!("{}", serde_json::to_string_pretty(&oracle.breaker_states())?);

    if std::env::var("ORACLE_DUMP_METRICS").is_ok() {
        print!("{}", gather_metrics()?);
    }

    Ok(())
}

fn parse_requests(args: impl Iterator<Item = String>) -> Result<Vec<(String, AssetType)>> {
    args.map(|arg| match arg.split_once(':') {
        Some((symbol, asset_type)) => {
            let asset_type = asset_type
                .parse::<AssetType>()
                .map_err(|e| anyhow::anyhow!("{} in argument {:?}", e, arg))?;
            Ok((symbol.to_string(), asset_type))
        }
        None => Ok((arg, AssetType::Crypto)),
    })
    .collect()
}
