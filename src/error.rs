use thiserror::Error;
use crate::types::ids::{AssetType, SourceId};
use crate::types::timestamp::Timestamp;

#[derive(Error, Debug)]
pub enum Error {
    // Consensus Errors
    #[error("No data available for {symbol}")]
    NoDataAvailable {
        symbol: String,
    },

    #[error("All {rejected} quotes for {symbol} were rejected as outliers")]
    AllSourcesRejected {
        symbol: String,
        rejected: usize,
    },

    // Source Errors
    #[error("Source unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),

    #[error("Unknown source: {0}")]
    UnknownSource(SourceId),

    #[error("No sources registered for asset type {0}")]
    NoSourcesRegistered(AssetType),

    // Request Errors
    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),

    // System Errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Metrics error: {0}")]
    MetricsError(#[from] prometheus::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single source call.
///
/// These never abort an aggregation cycle: the facade excludes the source for
/// that cycle and moves on. `BreakerOpen` is produced by the circuit breaker
/// itself, every other variant comes from an adapter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("{source_id}: circuit breaker open until {retry_at}")]
    BreakerOpen {
        source_id: SourceId,
        retry_at: Timestamp,
    },

    #[error("{source_id}: request timed out")]
    Timeout {
        source_id: SourceId,
    },

    #[error("{source_id}: network error: {message}")]
    Network {
        source_id: SourceId,
        message: String,
    },

    #[error("{source_id}: unexpected HTTP status {status}")]
    HttpStatus {
        source_id: SourceId,
        status: u16,
    },

    #[error("{source_id}: invalid response: {message}")]
    InvalidResponse {
        source_id: SourceId,
        message: String,
    },

    #[error("{source_id}: no data for {symbol}")]
    NoData {
        source_id: SourceId,
        symbol: String,
    },
}

impl SourceError {
    pub fn source_id(&self) -> &SourceId {
        match self {
            SourceError::BreakerOpen { source_id, .. }
            | SourceError::Timeout { source_id }
            | SourceError::Network { source_id, .. }
            | SourceError::HttpStatus { source_id, .. }
            | SourceError::InvalidResponse { source_id, .. }
            | SourceError::NoData { source_id, .. } => source_id,
        }
    }

    /// Whether this outcome says something is wrong with the source.
    ///
    /// Only a well-formed "unknown symbol" answer is a valid empty result.
    /// Every other non-2xx reply counts against the source; adapters map the
    /// provider's own "not found" replies to `NoData` before this point.
    pub fn is_source_fault(&self) -> bool {
        match self {
            SourceError::Timeout { .. }
            | SourceError::Network { .. }
            | SourceError::HttpStatus { .. }
            | SourceError::InvalidResponse { .. } => true,
            SourceError::NoData { .. } | SourceError::BreakerOpen { .. } => false,
        }
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::BreakerOpen { .. } => "breaker_open",
            SourceError::Timeout { .. } => "timeout",
            SourceError::Network { .. } => "network",
            SourceError::HttpStatus { .. } => "http_status",
            SourceError::InvalidResponse { .. } => "invalid_response",
            SourceError::NoData { .. } => "no_data",
        }
    }
}
