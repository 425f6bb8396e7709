use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::price_infra::circuit_breaker::CircuitBreakerConfig;
use crate::types::ids::{AssetType, SourceId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Binance,
    Coinbase,
    Kraken,
    Finnhub,
    Yahoo,
}

impl SourceKind {
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Binance => "binance",
            SourceKind::Coinbase => "coinbase",
            SourceKind::Kraken => "kraken",
            SourceKind::Finnhub => "finnhub",
            SourceKind::Yahoo => "yahoo",
        }
    }

    pub fn asset_types(&self) -> &'static [AssetType] {
        match self {
            SourceKind::Binance | SourceKind::Coinbase | SourceKind::Kraken => &[AssetType::Crypto],
            SourceKind::Finnhub | SourceKind::Yahoo => &[AssetType::Equity, AssetType::Forex],
        }
    }

    fn default_base_confidence(&self) -> f64 {
        match self {
            SourceKind::Binance | SourceKind::Coinbase => 0.95,
            SourceKind::Kraken => 0.90,
            SourceKind::Finnhub => 0.85,
            SourceKind::Yahoo => 0.80,
        }
    }

    // Free-tier equity APIs rate-limit hard, so they trip sooner and cool down longer.
    fn default_breaker(&self) -> CircuitBreakerConfig {
        match self {
            SourceKind::Binance | SourceKind::Coinbase => CircuitBreakerConfig {
                failure_threshold: 5,
                success_threshold: 2,
                timeout: Duration::from_secs(60),
            },
            SourceKind::Kraken => CircuitBreakerConfig {
                failure_threshold: 3,
                success_threshold: 2,
                timeout: Duration::from_secs(30),
            },
            SourceKind::Finnhub | SourceKind::Yahoo => CircuitBreakerConfig {
                failure_threshold: 3,
                success_threshold: 2,
                timeout: Duration::from_secs(120),
            },
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SourceConfig {
    pub kind: SourceKind,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_confidence: Option<f64>,
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
    #[serde(default)]
    pub failure_threshold: Option<u32>,
    #[serde(default)]
    pub success_threshold: Option<u32>,
    #[serde(default)]
    pub breaker_timeout_secs: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

fn default_http_timeout_ms() -> u64 {
    4_000
}

impl SourceConfig {
    pub fn new(kind: SourceKind) -> Self {
        SourceConfig {
            kind,
            source_id: None,
            enabled: true,
            base_url: None,
            api_key: None,
            base_confidence: None,
            http_timeout_ms: default_http_timeout_ms(),
            failure_threshold: None,
            success_threshold: None,
            breaker_timeout_secs: None,
        }
    }

    pub fn source_id(&self) -> SourceId {
        SourceId::new(self.source_id.as_deref().unwrap_or(self.kind.name()))
    }

    pub fn base_confidence(&self) -> f64 {
        self.base_confidence.unwrap_or_else(|| self.kind.default_base_confidence())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Kind defaults with any per-source overrides applied.
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        let defaults = self.kind.default_breaker();
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold.unwrap_or(defaults.failure_threshold),
            success_threshold: self.success_threshold.unwrap_or(defaults.success_threshold),
            timeout: self.breaker_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }
}
