use lazy_static::lazy_static;
use crate::error::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Source metrics
    pub static ref SOURCE_CALLS: IntCounterVec = IntCounterVec::new(
        Opts::new("oracle_source_calls_total", "Source calls by outcome"),
        &["source", "outcome"]
    ).expect("valid metric definition");

    pub static ref BREAKER_TRANSITIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("oracle_breaker_transitions_total", "Circuit breaker state transitions"),
        &["source", "to_state"]
    ).expect("valid metric definition");

    // Consensus metrics
    pub static ref OUTLIERS_REJECTED: IntCounterVec = IntCounterVec::new(
        Opts::new("oracle_outliers_rejected_total", "Quotes dropped as outliers"),
        &["source"]
    ).expect("valid metric definition");

    pub static ref AGGREGATION_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("oracle_aggregation_failures_total", "Failed aggregation cycles by reason"),
        &["reason"]
    ).expect("valid metric definition");

    pub static ref CONSENSUS_CONFIDENCE: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "oracle_consensus_confidence",
            "Confidence of produced consensus prices"
        ).buckets(vec![0.25, 0.5, 0.75, 0.9, 0.95, 1.0])
    ).expect("valid metric definition");

    // Cache metrics
    pub static ref CACHE_HITS: IntCounter = IntCounter::new(
        "oracle_cache_hits_total",
        "Consensus cache hits"
    ).expect("valid metric definition");

    pub static ref CACHE_MISSES: IntCounter = IntCounter::new(
        "oracle_cache_misses_total",
        "Consensus cache misses"
    ).expect("valid metric definition");

    // Latency metrics
    pub static ref AGGREGATION_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "oracle_aggregation_latency_seconds",
            "End-to-end latency of an uncached price request"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])
    ).expect("valid metric definition");
}

pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(SOURCE_CALLS.clone()))?;
    REGISTRY.register(Box::new(BREAKER_TRANSITIONS.clone()))?;
    REGISTRY.register(Box::new(OUTLIERS_REJECTED.clone()))?;
    REGISTRY.register(Box::new(AGGREGATION_FAILURES.clone()))?;
    REGISTRY.register(Box::new(CONSENSUS_CONFIDENCE.clone()))?;
    REGISTRY.register(Box::new(CACHE_HITS.clone()))?;
    REGISTRY.register(Box::new(CACHE_MISSES.clone()))?;
    REGISTRY.register(Box::new(AGGREGATION_LATENCY.clone()))?;
    Ok(())
}

/// Text exposition of everything in [`REGISTRY`].
pub fn gather_metrics() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
