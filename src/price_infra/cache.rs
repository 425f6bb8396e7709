use std::sync::Arc;
use std::time::Duration;
use dashmap::DashMap;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use crate::observability::metrics::{CACHE_HITS, CACHE_MISSES};
use crate::types::ids::PriceKey;
use crate::types::quote::AggregatedPrice;
use crate::types::timestamp::Timestamp;
use crate::utils::clock::Clock;

#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub key: PriceKey,
    pub value: AggregatedPrice,
    pub expires_at: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub keys: Vec<String>,
}

/// Time-boxed memo of consensus results.
///
/// Entries are replaced wholesale on every write, so concurrent writers for
/// the same key resolve to last-writer-wins. Expired entries are treated as
/// absent on lookup.
pub struct ResultCache {
    entries: DashMap<PriceKey, CacheEntry>,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl ResultCache {
    pub fn new(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        ResultCache {
            entries: DashMap::new(),
            default_ttl,
            clock,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn get(&self, key: &PriceKey) -> Option<AggregatedPrice> {
        let now = self.clock.now();

        if let Some(entry) = self.entries.get(key) {
            if now < entry.expires_at {
                CACHE_HITS.inc();
                return Some(entry.value.clone());
            }
        }

        // Only evict if it is still the expired entry we saw; a fresh write
        // may have landed in between.
        self.entries.remove_if(key, |_, entry| now >= entry.expires_at);
        CACHE_MISSES.inc();
        None
    }

    pub fn put(&self, key: PriceKey, value: AggregatedPrice, ttl: Duration) {
        let expires_at = self.clock.now() + ttl;
        debug!(key = %key, expires_at = %expires_at, "caching consensus price");
        self.entries.insert(key.clone(), CacheEntry { key, value, expires_at });
    }

    pub fn invalidate_all(&self) {
        let count = self.entries.len();
        self.entries.clear();
        info!(entries = count, "consensus cache cleared");
    }

    /// Live entries only, keys sorted.
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let mut keys: Vec<String> = self.entries
            .iter()
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.key.to_string())
            .collect();
        keys.sort();

        CacheStats { size: keys.len(), keys }
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        before.saturating_sub(self.entries.len())
    }

    /// Periodic purge so keys nobody asks for again do not linger.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!(purged, "swept expired cache entries");
                }
            }
        })
    }
}
