use std::time::Duration;
use tracing::{debug, warn};
use crate::config::oracle::OracleConfig;
use crate::error::{Error, Result};
use crate::observability::metrics::OUTLIERS_REJECTED;
use crate::types::ids::{PriceKey, SourceId};
use crate::types::quote::{clamp_unit, AggregatedPrice, PriceQuote};
use crate::types::timestamp::Timestamp;
use crate::utils::helper::{median, relative_deviation};

/// Turns the quotes of one fan-out into a single consensus price.
#[derive(Clone, Debug)]
pub struct ConsensusAggregator {
    staleness_threshold: Duration,
    max_deviation: f64,
    min_sources: usize,
}

impl ConsensusAggregator {
    pub fn new(config: &OracleConfig) -> Self {
        ConsensusAggregator {
            staleness_threshold: config.staleness_threshold(),
            max_deviation: config.max_deviation,
            min_sources: config.min_sources.max(1),
        }
    }

    pub fn aggregate(
        &self,
        key: &PriceKey,
        quotes: Vec<PriceQuote>,
        now: Timestamp,
    ) -> Result<AggregatedPrice> {
        // Step 1: Drop stale and unusable quotes
        let mut fresh: Vec<PriceQuote> = quotes.into_iter()
            .filter(|q| {
                let usable = q.is_usable();
                let age = now.saturating_since(q.observed_at);
                if !usable {
                    debug!(source = %q.source, price = q.price, "discarding unusable quote");
                } else if age > self.staleness_threshold {
                    debug!(source = %q.source, age_ms = age.as_millis() as u64, "discarding stale quote");
                }
                usable && age <= self.staleness_threshold
            })
            .collect();

        if fresh.is_empty() {
            return Err(Error::NoDataAvailable { symbol: key.symbol.clone() });
        }

        // Arrival order must not leak into the float sums below
        fresh.sort_by(|a, b| {
            a.source.cmp(&b.source)
                .then(a.price.total_cmp(&b.price))
                .then(a.observed_at.cmp(&b.observed_at))
        });

        // Step 2: Median and outlier rejection
        let prices: Vec<f64> = fresh.iter().map(|q| q.price).collect();
        let Some(mid) = median(&prices) else {
            return Err(Error::NoDataAvailable { symbol: key.symbol.clone() });
        };

        let mut accepted: Vec<(PriceQuote, f64)> = Vec::with_capacity(fresh.len());
        let mut rejected: Vec<SourceId> = Vec::new();
        for quote in fresh {
            let deviation = relative_deviation(quote.price, mid);
            if deviation > self.max_deviation {
                warn!(
                    symbol = %key.symbol,
                    source = %quote.source,
                    price = quote.price,
                    median = mid,
                    deviation,
                    "rejecting outlier quote"
                );
                OUTLIERS_REJECTED.with_label_values(&[quote.source.as_str()]).inc();
                rejected.push(quote.source);
            } else {
                accepted.push((quote, deviation));
            }
        }

        if accepted.is_empty() {
            return Err(Error::AllSourcesRejected {
                symbol: key.symbol.clone(),
                rejected: rejected.len(),
            });
        }

        if accepted.len() < self.min_sources {
            debug!(
                symbol = %key.symbol,
                surviving = accepted.len(),
                min_sources = self.min_sources,
                "below minimum source count, confidence reduced"
            );
        }

        // Step 3: Confidence-weighted consensus
        let price = weighted_price(&accepted);
        if !price.is_finite() {
            warn!(symbol = %key.symbol, price, "consensus price is not finite");
            return Err(Error::NoDataAvailable { symbol: key.symbol.clone() });
        }

        // Step 4: Confidence from source count and residual spread
        let count = accepted.len();
        let avg_deviation = accepted.iter().map(|(_, d)| d).sum::<f64>() / count as f64;
        let source_factor = (count as f64 / self.min_sources as f64).min(1.0);
        let agreement_factor = 1.0 - (avg_deviation * 10.0).min(0.5);
        let confidence = clamp_unit(source_factor * agreement_factor);

        // Step 5: Staleness of the oldest survivor
        let oldest = accepted.iter()
            .map(|(q, _)| q.observed_at)
            .min()
            .unwrap_or(now);

        let mut sources: Vec<SourceId> = accepted.into_iter().map(|(q, _)| q.source).collect();
        sources.sort();
        sources.dedup();
        rejected.sort();
        rejected.dedup();

        Ok(AggregatedPrice {
            symbol: key.symbol.clone(),
            asset_type: key.asset_type,
            price,
            sources,
            rejected,
            computed_at: now,
            confidence,
            deviation: avg_deviation,
            staleness: now.saturating_since(oldest),
        })
    }
}

fn weighted_price(accepted: &[(PriceQuote, f64)]) -> f64 {
    let total_weight: f64 = accepted.iter().map(|(q, _)| q.base_confidence).sum();
    // Normalized weights keep every partial sum below the largest price
    if total_weight > 0.0 {
        accepted.iter().map(|(q, _)| q.price * (q.base_confidence / total_weight)).sum()
    } else {
        // Every source claims zero confidence: fall back to the plain mean
        let n = accepted.len() as f64;
        accepted.iter().map(|(q, _)| q.price / n).sum()
    }
}
