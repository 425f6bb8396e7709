pub mod aggregator;
pub mod cache;
pub mod circuit_breaker;
pub mod connectors;
pub mod oracle;
