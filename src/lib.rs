pub mod utils;
pub mod types;
pub mod price_infra;
pub mod error;
pub mod config;
pub mod observability;

pub use error::{Error, Result, SourceError};
pub use price_infra::circuit_breaker::{CircuitBreakerConfig, CircuitState};
pub use price_infra::connectors::PriceAdapter;
pub use price_infra::oracle::PriceOracle;
pub use types::ids::{AssetType, SourceId};
pub use types::quote::{AggregatedPrice, PriceQuote};
pub use types::timestamp::Timestamp;
