use crate::config::oracle::OracleConfig;
use crate::config::sources::{SourceConfig, SourceKind};
use crate::config::LoggingConfig;
use crate::error::{Error, Result};
use crate::types::ids::AssetType;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub oracle: OracleConfig,
    pub logging: LoggingConfig,
    pub sources: Vec<SourceConfig>,
    pub watchlist: Vec<WatchEntry>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WatchEntry {
    pub symbol: String,
    pub asset_type: AssetType,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            oracle: OracleConfig::default(),
            logging: LoggingConfig::default(),
            // Finnhub needs an API key, so it is only enabled from config files.
            sources: vec![
                SourceConfig::new(SourceKind::Binance),
                SourceConfig::new(SourceKind::Coinbase),
                SourceConfig::new(SourceKind::Kraken),
                SourceConfig::new(SourceKind::Yahoo),
            ],
            watchlist: vec![
                WatchEntry { symbol: "BTC".to_string(), asset_type: AssetType::Crypto },
                WatchEntry { symbol: "ETH".to_string(), asset_type: AssetType::Crypto },
            ],
        }
    }
}

impl AppConfig {
    /// Layered load: `config/default`, then `config/<env>`, then
    /// `ORACLE__SECTION__KEY` environment variables.
    pub fn load(env: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("ORACLE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        Self::finish(config)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        Self::finish(config)
    }

    fn finish(config: Config) -> Result<Self> {
        let app: AppConfig = config.try_deserialize()
            .map_err(|e| Error::ConfigError(e.to_string()))?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<()> {
        self.oracle.validate()?;

        let mut seen = std::collections::HashSet::new();
        for source in self.sources.iter().filter(|s| s.enabled) {
            let id = source.source_id();
            if !seen.insert(id.clone()) {
                return Err(Error::ConfigError(format!("duplicate source id: {}", id)));
            }
            if source.kind == SourceKind::Finnhub && source.api_key.is_none() {
                return Err(Error::ConfigError(format!("source {} requires api_key", id)));
            }
            let breaker = source.breaker_config();
            if breaker.failure_threshold == 0 || breaker.success_threshold == 0 {
                return Err(Error::ConfigError(format!(
                    "source {}: breaker thresholds must be positive",
                    id
                )));
            }
        }
        Ok(())
    }
}
