use tracing::Span;
use tracing_subscriber::EnvFilter;
use crate::config::LoggingConfig;
use crate::types::ids::{PriceKey, SourceId};

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
/// Calling it twice is harmless: the second install is ignored.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if let Err(e) = result {
        tracing::debug!("tracing subscriber already installed: {}", e);
    }
}

pub fn aggregation_span(key: &PriceKey) -> Span {
    tracing::info_span!(
        "aggregation",
        symbol = %key.symbol,
        asset_type = %key.asset_type,
    )
}

pub fn source_call_span(source: &SourceId, symbol: &str) -> Span {
    tracing::debug_span!(
        "source_call",
        source = %source,
        symbol = %symbol,
    )
}
