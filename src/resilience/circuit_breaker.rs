//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: testing if dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: error percentage over the rolling window > threshold
//!                (once volume_threshold calls were observed)
//! Open → Half-Open: after reset timeout (not for forced-open breakers)
//! Half-Open → Closed: probe call succeeds (rolling stats reset)
//! Half-Open → Open: probe call fails or times out
//! ```
//!
//! # Design Decisions
//! - Per-dependency circuit breaker (not global)
//! - Rolling window split into fixed time buckets; stale buckets are
//!   discarded lazily on every access
//! - Open → Half-Open is evaluated lazily when the breaker is observed,
//!   no background timer
//! - Every state transition bumps an epoch; probe results from an older
//!   epoch (after reset, forced open or shutdown) are ignored
//! - State lives behind a `std::sync::Mutex` that is never held across
//!   an `.await`

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::schema::BreakerConfig;
use crate::observability::metrics;
use crate::resilience::Dependency;

/// Retry hint used when the breaker is not open (probe slots busy, single
/// failures).
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Numeric encoding for the state gauge.
    pub fn as_gauge(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

/// Result of one guarded invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    Timeout,
}

/// Error returned by [`CircuitBreaker::call`].
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    #[error("circuit open, retry after {retry_after:?}")]
    Open { retry_after: Duration },

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("call failed: {0}")]
    Failed(E),
}

/// Aggregated counters over the rolling window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollingStats {
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub rejections: u64,
    pub total: u64,
    pub error_percentage: f64,
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    index: u64,
    successes: u64,
    failures: u64,
    timeouts: u64,
    rejections: u64,
}

impl Bucket {
    fn new(index: u64) -> Self {
        Self {
            index,
            successes: 0,
            failures: 0,
            timeouts: 0,
            rejections: 0,
        }
    }
}

/// Fixed-length time window divided into equally sized buckets.
#[derive(Debug)]
struct RollingWindow {
    buckets: VecDeque<Bucket>,
    bucket_len: Duration,
    capacity: u64,
    origin: Instant,
}

impl RollingWindow {
    fn new(bucket_len: Duration, capacity: u32, now: Instant) -> Self {
        Self {
            buckets: VecDeque::with_capacity(capacity as usize),
            bucket_len,
            capacity: u64::from(capacity.max(1)),
            origin: now,
        }
    }

    fn index_at(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.origin).as_nanos();
        (elapsed / self.bucket_len.as_nanos().max(1)) as u64
    }

    fn rotate(&mut self, now: Instant) {
        let current = self.index_at(now);
        while let Some(front) = self.buckets.front() {
            if front.index + self.capacity <= current {
                self.buckets.pop_front();
            } else {
                break;
            }
        }
    }

    fn current(&mut self, now: Instant) -> &mut Bucket {
        self.rotate(now);
        let index = self.index_at(now);
        if self.buckets.back().map(|b| b.index) != Some(index) {
            self.buckets.push_back(Bucket::new(index));
        }
        let last = self.buckets.len() - 1;
        &mut self.buckets[last]
    }

    fn record(&mut self, outcome: Outcome, now: Instant) {
        let bucket = self.current(now);
        match outcome {
            Outcome::Success => bucket.successes += 1,
            Outcome::Failure => bucket.failures += 1,
            Outcome::Timeout => bucket.timeouts += 1,
        }
    }

    fn record_rejection(&mut self, now: Instant) {
        self.current(now).rejections += 1;
    }

    fn stats(&mut self, now: Instant) -> RollingStats {
        self.rotate(now);
        let mut stats = RollingStats::default();
        for b in &self.buckets {
            stats.successes += b.successes;
            stats.failures += b.failures;
            stats.timeouts += b.timeouts;
            stats.rejections += b.rejections;
        }
        stats.total = stats.successes + stats.failures + stats.timeouts;
        if stats.total > 0 {
            stats.error_percentage =
                (stats.failures + stats.timeouts) as f64 * 100.0 / stats.total as f64;
        }
        stats
    }

    fn clear(&mut self) {
        self.buckets.clear();
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    window: RollingWindow,
    opened_at: Option<Instant>,
    forced_open: bool,
    probes_in_flight: u32,
    epoch: u64,
    shut_down: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TicketKind {
    Call,
    Probe,
}

/// Admission granted by the breaker. Must be completed with an outcome;
/// dropping it unfinished (cancelled caller) releases a probe slot.
struct Ticket<'a> {
    breaker: &'a CircuitBreaker,
    kind: TicketKind,
    epoch: u64,
    done: bool,
}

impl Ticket<'_> {
    fn complete(mut self, outcome: Outcome) {
        self.done = true;
        self.breaker.record(self.kind, self.epoch, outcome);
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        if !self.done && self.kind == TicketKind::Probe {
            self.breaker.release_probe(self.epoch);
        }
    }
}

/// Point-in-time view of a breaker for status reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerStatus {
    pub name: Dependency,
    pub state: CircuitState,
    pub forced_open: bool,
    pub stats: RollingStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    pub config: BreakerConfig,
}

/// Circuit breaker guarding one dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: Dependency,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: Dependency, config: BreakerConfig) -> Self {
        let now = Instant::now();
        let window = RollingWindow::new(config.bucket_duration(), config.rolling_buckets, now);
        metrics::record_breaker_state(name.as_str(), CircuitState::Closed);
        Self {
            name,
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                window,
                opened_at: None,
                forced_open: false,
                probes_in_flight: 0,
                epoch: 0,
                shut_down: false,
            }),
        }
    }

    pub fn name(&self) -> Dependency {
        self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Inner is consistent between transitions, so a poisoned lock is safe to reuse.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state, applying a due Open → Half-Open transition.
    pub fn state(&self) -> CircuitState {
        let now = Instant::now();
        let mut inner = self.lock();
        self.refresh(&mut inner, now);
        inner.state
    }

    /// Run `op` under this breaker: fail fast when open (without invoking
    /// `op`), enforce the invocation timeout and record the outcome.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let ticket = self
            .try_acquire()
            .map_err(|retry_after| BreakerError::Open { retry_after })?;

        let timeout = self.config.timeout();
        match tokio::time::timeout(timeout, op()).await {
            Ok(Ok(value)) => {
                ticket.complete(Outcome::Success);
                Ok(value)
            }
            Ok(Err(e)) => {
                ticket.complete(Outcome::Failure);
                Err(BreakerError::Failed(e))
            }
            Err(_) => {
                tracing::warn!(dependency = %self.name, timeout = ?timeout, "Guarded call timed out");
                ticket.complete(Outcome::Timeout);
                Err(BreakerError::Timeout(timeout))
            }
        }
    }

    /// How long a caller should wait before trying again.
    pub fn retry_after(&self) -> Duration {
        let now = Instant::now();
        let mut inner = self.lock();
        self.refresh(&mut inner, now);
        self.retry_after_locked(&inner, now)
    }

    /// Force the breaker Closed and clear its statistics.
    pub fn reset(&self) {
        let now = Instant::now();
        let mut inner = self.lock();
        self.transition(&mut inner, CircuitState::Closed, now);
        tracing::info!(dependency = %self.name, "Circuit breaker reset");
    }

    /// Force the breaker Open. It stays open until [`reset`](Self::reset).
    pub fn force_open(&self) {
        let now = Instant::now();
        let mut inner = self.lock();
        self.transition(&mut inner, CircuitState::Open, now);
        inner.forced_open = true;
        tracing::warn!(dependency = %self.name, "Circuit breaker forced open");
    }

    /// Stop accepting probes and abandon any pending half-open evaluation.
    pub fn shutdown(&self) {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.shut_down = true;
        if inner.state == CircuitState::HalfOpen {
            self.transition(&mut inner, CircuitState::Open, now);
        } else {
            inner.epoch += 1;
        }
        inner.probes_in_flight = 0;
    }

    pub fn status(&self) -> BreakerStatus {
        let now = Instant::now();
        let mut inner = self.lock();
        self.refresh(&mut inner, now);
        let retry_after_secs = (inner.state == CircuitState::Open)
            .then(|| ceil_secs(self.retry_after_locked(&inner, now)));
        BreakerStatus {
            name: self.name,
            state: inner.state,
            forced_open: inner.forced_open,
            stats: inner.window.stats(now),
            retry_after_secs,
            config: self.config.clone(),
        }
    }

    fn try_acquire(&self) -> Result<Ticket<'_>, Duration> {
        let now = Instant::now();
        let mut inner = self.lock();
        self.refresh(&mut inner, now);

        let state = inner.state;
        let kind = match state {
            CircuitState::Closed => TicketKind::Call,
            CircuitState::HalfOpen
                if !inner.shut_down && inner.probes_in_flight < self.config.half_open_max_probes =>
            {
                inner.probes_in_flight += 1;
                TicketKind::Probe
            }
            CircuitState::Open | CircuitState::HalfOpen => {
                inner.window.record_rejection(now);
                metrics::record_breaker_rejection(self.name.as_str());
                return Err(self.retry_after_locked(&inner, now));
            }
        };

        Ok(Ticket {
            breaker: self,
            kind,
            epoch: inner.epoch,
            done: false,
        })
    }

    fn record(&self, kind: TicketKind, epoch: u64, outcome: Outcome) {
        let now = Instant::now();
        let mut inner = self.lock();

        match kind {
            TicketKind::Probe => {
                if epoch != inner.epoch || inner.state != CircuitState::HalfOpen {
                    tracing::debug!(dependency = %self.name, "Discarding stale probe result");
                    return;
                }
                inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
                inner.window.record(outcome, now);
                let next = if outcome == Outcome::Success {
                    CircuitState::Closed
                } else {
                    CircuitState::Open
                };
                self.transition(&mut inner, next, now);
            }
            TicketKind::Call => {
                if epoch != inner.epoch {
                    tracing::debug!(dependency = %self.name, "Discarding stale call result");
                    return;
                }
                inner.window.record(outcome, now);
                if inner.state != CircuitState::Closed {
                    return;
                }
                let stats = inner.window.stats(now);
                if stats.total >= u64::from(self.config.volume_threshold)
                    && stats.error_percentage > f64::from(self.config.error_threshold_percentage)
                {
                    tracing::warn!(
                        dependency = %self.name,
                        error_percentage = stats.error_percentage,
                        threshold = self.config.error_threshold_percentage,
                        total = stats.total,
                        "Error threshold exceeded, opening circuit"
                    );
                    self.transition(&mut inner, CircuitState::Open, now);
                }
            }
        }
    }

    fn release_probe(&self, epoch: u64) {
        let mut inner = self.lock();
        if epoch == inner.epoch {
            inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
        }
    }

    fn refresh(&self, inner: &mut Inner, now: Instant) {
        if inner.state != CircuitState::Open || inner.forced_open {
            return;
        }
        let due = inner
            .opened_at
            .is_some_and(|at| now.saturating_duration_since(at) >= self.config.reset_timeout());
        if due {
            self.transition(inner, CircuitState::HalfOpen, now);
        }
    }

    fn retry_after_locked(&self, inner: &Inner, now: Instant) -> Duration {
        match (inner.state, inner.opened_at) {
            (CircuitState::Open, _) if inner.forced_open => self.config.reset_timeout(),
            (CircuitState::Open, Some(at)) => {
                let remaining = self
                    .config
                    .reset_timeout()
                    .saturating_sub(now.saturating_duration_since(at));
                remaining.max(DEFAULT_RETRY_AFTER)
            }
            _ => DEFAULT_RETRY_AFTER,
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState, now: Instant) {
        let from = inner.state;
        inner.state = to;
        inner.epoch += 1;
        inner.probes_in_flight = 0;
        match to {
            CircuitState::Open => {
                inner.opened_at = Some(now);
            }
            CircuitState::HalfOpen => {}
            CircuitState::Closed => {
                inner.opened_at = None;
                inner.forced_open = false;
                inner.window.clear();
            }
        }
        if from != to {
            tracing::info!(dependency = %self.name, from = ?from, to = ?to, "Circuit state changed");
        }
        metrics::record_breaker_state(self.name.as_str(), to);
    }
}

/// Round a duration up to whole seconds (for `Retry-After`).
pub fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
