use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;
use futures_util::future::join_all;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};
use crate::config::loader::AppConfig;
use crate::config::oracle::OracleConfig;
use crate::error::{Error, Result, SourceError};
use crate::observability::metrics::{
    AGGREGATION_FAILURES, AGGREGATION_LATENCY, CONSENSUS_CONFIDENCE, SOURCE_CALLS,
};
use crate::observability::tracing::{aggregation_span, source_call_span};
use crate::price_infra::aggregator::ConsensusAggregator;
use crate::price_infra::cache::{CacheStats, ResultCache};
use crate::price_infra::circuit_breaker::{BreakerRegistry, BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig};
use crate::price_infra::connectors::{build_adapter, PriceAdapter};
use crate::types::ids::{normalize_symbol, AssetType, PriceKey, SourceId};
use crate::types::quote::{AggregatedPrice, PriceQuote};
use crate::utils::clock::{Clock, SystemClock};

/// Public entry point: cache lookup, fan-out through the breakers, consensus.
pub struct PriceOracle {
    config: OracleConfig,
    adapters: DashMap<SourceId, Arc<dyn PriceAdapter>>,
    breakers: BreakerRegistry,
    cache: Arc<ResultCache>,
    aggregator: ConsensusAggregator,
    clock: Arc<dyn Clock>,
}

impl PriceOracle {
    pub fn new(config: OracleConfig, clock: Arc<dyn Clock>) -> Self {
        let cache = Arc::new(ResultCache::new(config.cache_ttl(), clock.clone()));
        PriceOracle {
            aggregator: ConsensusAggregator::new(&config),
            breakers: BreakerRegistry::new(clock.clone()),
            adapters: DashMap::new(),
            cache,
            config,
            clock,
        }
    }

    /// Build the oracle with every enabled source from `app`, on the system clock.
    pub fn from_config(app: &AppConfig) -> Result<Self> {
        app.validate()?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let oracle = PriceOracle::new(app.oracle.clone(), clock.clone());

        for source in app.sources.iter().filter(|s| s.enabled) {
            let adapter = build_adapter(source, clock.clone())?;
            oracle.register_source(adapter, source.breaker_config());
        }

        if oracle.breakers.is_empty() {
            warn!("no price sources enabled");
        }
        Ok(oracle)
    }

    /// Add a source with its own breaker. Re-registering an id replaces both.
    pub fn register_source(&self, adapter: Arc<dyn PriceAdapter>, breaker: CircuitBreakerConfig) {
        let source_id = adapter.source_id().clone();
        info!(
            source = %source_id,
            asset_types = ?adapter.asset_types(),
            failure_threshold = breaker.failure_threshold,
            success_threshold = breaker.success_threshold,
            timeout_secs = breaker.timeout.as_secs(),
            "registering price source"
        );
        self.breakers.register(source_id.clone(), breaker);
        self.adapters.insert(source_id, adapter);
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Start the background cache purge if an interval is configured.
    pub fn start_cache_sweeper(&self) -> Option<JoinHandle<()>> {
        let interval = self.config.cache_sweep_interval()?;
        info!(interval_secs = interval.as_secs(), "starting cache sweeper");
        Some(self.cache.spawn_sweeper(interval))
    }

    pub async fn get_aggregated_price(&self, symbol: &str, asset_type: AssetType) -> Result<AggregatedPrice> {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Err(Error::InvalidSymbol(symbol));
        }

        let key = PriceKey::new(&symbol, asset_type);
        if let Some(cached) = self.cache.get(&key) {
            debug!(key = %key, "serving consensus price from cache");
            return Ok(cached);
        }

        let span = aggregation_span(&key);
        self.compute(key).instrument(span).await
    }

    /// Per-symbol failures become `None`; one bad symbol never fails the batch.
    pub async fn get_multiple_prices(
        &self,
        requests: &[(String, AssetType)],
    ) -> HashMap<String, Option<AggregatedPrice>> {
        let lookups = requests.iter().map(|(symbol, asset_type)| async move {
            let result = self.get_aggregated_price(symbol, *asset_type).await;
            (symbol.clone(), result)
        });

        join_all(lookups)
            .await
            .into_iter()
            .map(|(symbol, result)| match result {
                Ok(price) => (symbol, Some(price)),
                Err(e) => {
                    debug!(symbol = %symbol, error = %e, "no price in batch");
                    (symbol, None)
                }
            })
            .collect()
    }

    pub fn clear_cache(&self) {
        self.cache.invalidate_all();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// One breaker-guarded call to a single source, bypassing cache and consensus.
    pub async fn fetch_from_source(
        &self,
        source_id: &SourceId,
        symbol: &str,
        asset_type: AssetType,
    ) -> Result<PriceQuote> {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Err(Error::InvalidSymbol(symbol));
        }

        let adapter = self.adapters
            .get(source_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::UnknownSource(source_id.clone()))?;
        let breaker = self.breakers
            .get(source_id)
            .ok_or_else(|| Error::UnknownSource(source_id.clone()))?;

        let span = source_call_span(source_id, &symbol);
        let quote = call_source(adapter, breaker, symbol, asset_type, self.config.per_call_timeout())
            .instrument(span)
            .await?;
        Ok(quote)
    }

    pub fn breaker_states(&self) -> Vec<BreakerSnapshot> {
        self.breakers.snapshots()
    }

    pub fn reset_breaker(&self, source_id: &SourceId) -> Result<()> {
        if self.breakers.reset(source_id) {
            Ok(())
        } else {
            Err(Error::UnknownSource(source_id.clone()))
        }
    }

    pub fn reset_all_breakers(&self) {
        info!(sources = self.breakers.len(), "resetting all circuit breakers");
        self.breakers.reset_all();
    }

    /// Sources serving `asset_type`, ordered by id.
    fn sources_for(&self, asset_type: AssetType) -> Vec<(Arc<dyn PriceAdapter>, Arc<CircuitBreaker>)> {
        let mut targets: Vec<_> = self.adapters
            .iter()
            .filter(|entry| entry.value().supports(asset_type))
            .filter_map(|entry| {
                let breaker = self.breakers.get(entry.key())?;
                Some((entry.value().clone(), breaker))
            })
            .collect();
        targets.sort_by(|a, b| a.0.source_id().cmp(b.0.source_id()));
        targets
    }

    async fn compute(&self, key: PriceKey) -> Result<AggregatedPrice> {
        let started = Instant::now();
        let result = self.fan_out(&key).await.and_then(|quotes| {
            self.aggregator.aggregate(&key, quotes, self.clock.now())
        });
        AGGREGATION_LATENCY.observe(started.elapsed().as_secs_f64());

        match result {
            Ok(price) => {
                CONSENSUS_CONFIDENCE.observe(price.confidence);
                info!(
                    price = price.price,
                    confidence = price.confidence,
                    sources = price.sources.len(),
                    rejected = price.rejected.len(),
                    "consensus price computed"
                );
                self.cache.put(key, price.clone(), self.cache.default_ttl());
                Ok(price)
            }
            Err(e) => {
                AGGREGATION_FAILURES.with_label_values(&[failure_reason(&e)]).inc();
                warn!(error = %e, "aggregation failed");
                Err(e)
            }
        }
    }

    /// Query every matching source concurrently and collect what arrives
    /// before the request deadline. Late calls keep running detached so
    /// their breakers still see the outcome.
    async fn fan_out(&self, key: &PriceKey) -> Result<Vec<PriceQuote>> {
        let targets = self.sources_for(key.asset_type);
        if targets.is_empty() {
            return Err(Error::NoSourcesRegistered(key.asset_type));
        }

        let deadline = tokio::time::Instant::now() + self.config.request_timeout();
        let per_call_timeout = self.config.per_call_timeout();

        let mut pending: FuturesUnordered<JoinHandle<std::result::Result<PriceQuote, SourceError>>> = targets
            .into_iter()
            .map(|(adapter, breaker)| {
                let span = source_call_span(adapter.source_id(), &key.symbol);
                let call = call_source(adapter, breaker, key.symbol.clone(), key.asset_type, per_call_timeout);
                tokio::spawn(call.instrument(span))
            })
            .collect();

        let mut quotes = Vec::with_capacity(pending.len());
        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some(Ok(Ok(quote)))) => quotes.push(quote),
                Ok(Some(Ok(Err(e)))) => {
                    debug!(source = %e.source_id(), error = %e, "source excluded from this cycle");
                }
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "source task did not complete");
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        outstanding = pending.len(),
                        received = quotes.len(),
                        "request timeout reached, aggregating partial results"
                    );
                    break;
                }
            }
        }

        Ok(quotes)
    }
}

/// The per-call timeout runs inside the breaker so an expiry counts as a failure.
async fn call_source(
    adapter: Arc<dyn PriceAdapter>,
    breaker: Arc<CircuitBreaker>,
    symbol: String,
    asset_type: AssetType,
    timeout: Duration,
) -> std::result::Result<PriceQuote, SourceError> {
    let source_id = adapter.source_id().clone();

    let result = breaker
        .execute(async {
            match tokio::time::timeout(timeout, adapter.fetch(&symbol, asset_type)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(SourceError::Timeout { source_id: source_id.clone() }),
            }
        })
        .await;

    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    SOURCE_CALLS.with_label_values(&[source_id.as_str(), outcome]).inc();

    result
}

fn failure_reason(error: &Error) -> &'static str {
    match error {
        Error::NoDataAvailable { .. } => "no_data",
        Error::AllSourcesRejected { .. } => "all_rejected",
        Error::NoSourcesRegistered(_) => "no_sources",
        _ => "other",
    }
}
