use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::error::{Error, Result};

/// Engine-wide tuning for consensus, caching and fan-out.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct OracleConfig {
    pub staleness_threshold_secs: u64,
    pub max_deviation: f64,
    pub min_sources: usize,
    pub cache_ttl_secs: u64,
    pub per_call_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub cache_sweep_interval_secs: Option<u64>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig {
            staleness_threshold_secs: 300,  // 5 minutes
            max_deviation: 0.05,            // 5%
            min_sources: 2,
            cache_ttl_secs: 30,
            per_call_timeout_ms: 5_000,
            request_timeout_ms: 8_000,
            cache_sweep_interval_secs: None,
        }
    }
}

impl OracleConfig {
    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_secs(self.staleness_threshold_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_millis(self.per_call_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cache_sweep_interval(&self) -> Option<Duration> {
        self.cache_sweep_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.max_deviation.is_finite() || self.max_deviation <= 0.0 {
            return Err(Error::ConfigError(format!(
                "max_deviation must be a positive fraction, got {}",
                self.max_deviation
            )));
        }
        if self.min_sources == 0 {
            return Err(Error::ConfigError("min_sources must be at least 1".to_string()));
        }
        if self.staleness_threshold_secs == 0 {
            return Err(Error::ConfigError("staleness_threshold_secs must be positive".to_string()));
        }
        if self.per_call_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(Error::ConfigError("timeouts must be positive".to_string()));
        }
        Ok(())
    }
}
