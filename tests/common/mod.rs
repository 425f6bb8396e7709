#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use price_oracle::config::oracle::OracleConfig;
use price_oracle::utils::clock::{Clock, ManualClock};
use price_oracle::{AssetType, PriceAdapter, PriceOracle, PriceQuote, SourceError, SourceId, Timestamp};

pub const START_MS: u64 = 1_700_000_000_000;

/// What a scripted source answers on one call.
#[derive(Clone, Debug)]
pub enum Reply {
    Price(f64),
    /// Price observed this long before the call.
    Aged(f64, Duration),
    Fail,
    NoData,
}

pub struct ScriptedAdapter {
    id: SourceId,
    asset_types: Vec<AssetType>,
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    delay: Duration,
    confidence: f64,
    calls: AtomicUsize,
    clock: Arc<ManualClock>,
}

impl ScriptedAdapter {
    pub fn new(id: &str, asset_type: AssetType, fallback: Reply, clock: &Arc<ManualClock>) -> Self {
        ScriptedAdapter {
            id: SourceId::new(id),
            asset_types: vec![asset_type],
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: Duration::ZERO,
            confidence: 1.0,
            calls: AtomicUsize::new(0),
            clock: clock.clone(),
        }
    }

    /// Replies served in order before falling back.
    pub fn script(self, replies: Vec<Reply>) -> Self {
        *self.script.lock().unwrap() = replies.into();
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceAdapter for ScriptedAdapter {
    fn source_id(&self) -> &SourceId {
        &self.id
    }

    fn asset_types(&self) -> &[AssetType] {
        &self.asset_types
    }

    async fn fetch(&self, symbol: &str, _asset_type: AssetType) -> Result<PriceQuote, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let reply = self.script.lock().unwrap().pop_front().unwrap_or_else(|| self.fallback.clone());
        let now = self.clock.now();
        match reply {
            Reply::Price(price) => Ok(PriceQuote::new(self.id.clone(), price, now, self.confidence)),
            Reply::Aged(price, age) => {
                let observed_at = Timestamp::from_millis(now.as_millis() - age.as_millis() as u64);
                Ok(PriceQuote::new(self.id.clone(), price, observed_at, self.confidence))
            }
            Reply::Fail => Err(SourceError::Network {
                source_id: self.id.clone(),
                message: "connection reset".to_string(),
            }),
            Reply::NoData => Err(SourceError::NoData {
                source_id: self.id.clone(),
                symbol: symbol.to_string(),
            }),
        }
    }
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Timestamp::from_millis(START_MS)))
}

pub fn oracle(config: OracleConfig, clock: &Arc<ManualClock>) -> PriceOracle {
    PriceOracle::new(config, clock.clone())
}
