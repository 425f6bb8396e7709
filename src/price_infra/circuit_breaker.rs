use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, warn};
use crate::error::SourceError;
use crate::observability::metrics::BREAKER_TRANSITIONS;
use crate::types::ids::SourceId;
use crate::types::timestamp::Timestamp;
use crate::utils::clock::Clock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in Closed before opening.
    pub failure_threshold: u32,
    /// Consecutive HalfOpen successes before closing.
    pub success_threshold: u32,
    /// How long to stay Open before probing.
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        CircuitBreakerConfig {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Point-in-time view of one breaker.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    pub source: SourceId,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub next_retry_at: Option<Timestamp>,
    pub total_attempts: u64,
    pub total_failures: u64,
    pub total_successes: u64,
    pub total_rejected: u64,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    next_retry_at: Option<Timestamp>,
    trial_in_flight: bool,
    total_attempts: u64,
    total_failures: u64,
    total_successes: u64,
    total_rejected: u64,
}

impl BreakerInner {
    fn new() -> Self {
        BreakerInner {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            next_retry_at: None,
            trial_in_flight: false,
            total_attempts: 0,
            total_failures: 0,
            total_successes: 0,
            total_rejected: 0,
        }
    }
}

/// Per-source circuit breaker.
///
/// - **Closed**: calls pass through; consecutive failures are counted.
/// - **Open**: calls fail fast with [`SourceError::BreakerOpen`] until the
///   retry deadline passes.
/// - **HalfOpen**: one trial call at a time tests the source; enough
///   consecutive successes close the circuit, any failure reopens it.
pub struct CircuitBreaker {
    source: SourceId,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(source: SourceId, config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        CircuitBreaker {
            source,
            config,
            clock,
            inner: Mutex::new(BreakerInner::new()),
        }
    }

    pub fn source_id(&self) -> &SourceId {
        &self.source
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    // A poisoned lock only means a panic happened mid-update; the counters
    // are still usable.
    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!(source = %self.source, "circuit breaker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Run `call` under the current state rules and feed its outcome back
    /// into the state machine. Rejected calls are never polled.
    pub async fn execute<T, F>(&self, call: F) -> Result<T, SourceError>
    where
        F: Future<Output = Result<T, SourceError>>,
    {
        let mut permit = self.acquire()?;
        let outcome = call.await;

        match &outcome {
            Ok(_) => permit.complete(true),
            Err(e) if e.is_source_fault() => {
                debug!(source = %self.source, error = %e, "source call failed");
                permit.complete(false)
            }
            // "No data for symbol" is a healthy answer
            Err(_) => permit.complete(true),
        }

        outcome
    }

    /// Like [`execute`](Self::execute), but any error (including a fast-fail
    /// from an open circuit) is turned into the fallback value.
    pub async fn execute_with_fallback<T, F, G>(&self, call: F, fallback: G) -> T
    where
        F: Future<Output = Result<T, SourceError>>,
        G: FnOnce(SourceError) -> T,
    {
        match self.execute(call).await {
            Ok(value) => value,
            Err(e) => {
                debug!(source = %self.source, error = %e, "using fallback value");
                fallback(e)
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            source: self.source.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            next_retry_at: inner.next_retry_at,
            total_attempts: inner.total_attempts,
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
            total_rejected: inner.total_rejected,
        }
    }

    /// Administrative: force Closed and clear all counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        *inner = BreakerInner::new();
        info!(source = %self.source, "circuit breaker reset");
    }

    fn acquire(&self) -> Result<Permit<'_>, SourceError> {
        let now = self.clock.now();
        let mut inner = self.lock();

        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let retry_at = inner.next_retry_at.unwrap_or(now);
                if now < retry_at {
                    inner.total_rejected += 1;
                    return Err(SourceError::BreakerOpen {
                        source_id: self.source.clone(),
                        retry_at,
                    });
                }
                self.transition(&mut inner, CircuitState::HalfOpen);
                inner.consecutive_successes = 0;
                inner.trial_in_flight = true;
                true
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    inner.total_rejected += 1;
                    return Err(SourceError::BreakerOpen {
                        source_id: self.source.clone(),
                        retry_at: now,
                    });
                }
                inner.trial_in_flight = true;
                true
            }
        };

        inner.total_attempts += 1;
        Ok(Permit { breaker: self, trial, completed: false })
    }

    fn record_success(&self, trial: bool) {
        let mut inner = self.lock();
        inner.total_successes += 1;
        if trial {
            inner.trial_in_flight = false;
        }

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen if trial => {
                inner.consecutive_successes += 1;
                debug!(
                    source = %self.source,
                    successes = inner.consecutive_successes,
                    threshold = self.config.success_threshold,
                    "half-open trial succeeded"
                );
                if inner.consecutive_successes >= self.config.success_threshold {
                    self.transition(&mut inner, CircuitState::Closed);
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    inner.next_retry_at = None;
                }
            }
            // Late result of a call admitted before the circuit changed
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    fn record_failure(&self, trial: bool) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.total_failures += 1;
        if trial {
            inner.trial_in_flight = false;
        }

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.next_retry_at = Some(now + self.config.timeout);
                    self.transition(&mut inner, CircuitState::Open);
                } else {
                    debug!(
                        source = %self.source,
                        failures = inner.consecutive_failures,
                        threshold = self.config.failure_threshold,
                        "failure recorded"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.consecutive_failures += 1;
                inner.consecutive_successes = 0;
                inner.next_retry_at = Some(now + self.config.timeout);
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {
                inner.consecutive_failures += 1;
            }
        }
    }

    fn release_trial(&self) {
        let mut inner = self.lock();
        inner.trial_in_flight = false;
        debug!(source = %self.source, "half-open trial abandoned");
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        BREAKER_TRANSITIONS
            .with_label_values(&[self.source.as_str(), to.as_str()])
            .inc();

        match to {
            CircuitState::Open => warn!(
                source = %self.source,
                from = %from,
                failures = inner.consecutive_failures,
                retry_at = ?inner.next_retry_at,
                "circuit opened"
            ),
            _ => info!(source = %self.source, from = %from, to = %to, "circuit state changed"),
        }
    }
}

/// Admission ticket for one call. Dropping an unfinished trial permit frees
/// the half-open slot without touching the counters.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    completed: bool,
}

impl Permit<'_> {
    fn complete(&mut self, success: bool) {
        self.completed = true;
        if success {
            self.breaker.record_success(self.trial);
        } else {
            self.breaker.record_failure(self.trial);
        }
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.completed {
            self.breaker.release_trial();
        }
    }
}

/// Owns one breaker per registered source.
pub struct BreakerRegistry {
    breakers: DashMap<SourceId, Arc<CircuitBreaker>>,
    clock: Arc<dyn Clock>,
}

impl BreakerRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        BreakerRegistry {
            breakers: DashMap::new(),
            clock,
        }
    }

    /// Create the breaker for `source`, replacing any previous one.
    pub fn register(&self, source: SourceId, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        let breaker = Arc::new(CircuitBreaker::new(source.clone(), config, self.clock.clone()));
        if self.breakers.insert(source.clone(), breaker.clone()).is_some() {
            warn!(source = %source, "replaced existing circuit breaker");
        }
        breaker
    }

    pub fn get(&self, source: &SourceId) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(source).map(|entry| entry.value().clone())
    }

    /// Snapshots of every breaker, ordered by source id.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<_> = self.breakers
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.source.cmp(&b.source));
        snapshots
    }

    pub fn reset(&self, source: &SourceId) -> bool {
        match self.get(source) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
