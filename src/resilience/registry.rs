//! Breaker registry and guarded execution.
//!
//! # Responsibilities
//! - Own exactly one circuit breaker per dependency
//! - Wrap downstream calls with jitter, breaker admission and fallback
//! - Expose status and manual control for the admin API

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::config::schema::ResilienceConfig;
use crate::resilience::circuit_breaker::{BreakerError, BreakerStatus, CircuitBreaker, CircuitState};
use crate::resilience::jitter::JitterBounds;
use crate::resilience::Dependency;

/// Errors surfaced by guarded execution.
#[derive(Debug, thiserror::Error)]
pub enum ResilienceError {
    #[error("no circuit breaker registered for '{0}'")]
    UnknownBreaker(String),

    #[error("{dependency} unavailable: {reason}")]
    Unavailable {
        dependency: Dependency,
        retry_after: Duration,
        reason: String,
    },
}

impl ResilienceError {
    /// Retry hint for the caller, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ResilienceError::Unavailable { retry_after, .. } => Some(*retry_after),
            ResilienceError::UnknownBreaker(_) => None,
        }
    }
}

/// Substitute result used when a guarded call does not succeed.
pub enum Fallback<T> {
    /// A ready value.
    Value(T),
    /// Computed on demand.
    Lazy(Box<dyn FnOnce() -> T + Send>),
    /// Computed asynchronously on demand.
    Async(Box<dyn FnOnce() -> BoxFuture<'static, T> + Send>),
}

impl<T> Fallback<T> {
    pub fn value(value: T) -> Self {
        Fallback::Value(value)
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Fallback::Lazy(Box::new(f))
    }

    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        Fallback::Async(Box::new(move || Box::pin(f())))
    }

    async fn resolve(self) -> T {
        match self {
            Fallback::Value(value) => value,
            Fallback::Lazy(f) => f(),
            Fallback::Async(f) => f().await,
        }
    }
}

impl<T> fmt::Debug for Fallback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Fallback::Value(_) => "Value",
            Fallback::Lazy(_) => "Lazy",
            Fallback::Async(_) => "Async",
        };
        f.debug_tuple("Fallback").field(&kind).finish()
    }
}

/// Registry of per-dependency circuit breakers.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: BTreeMap<Dependency, Arc<CircuitBreaker>>,
    jitter: JitterBounds,
}

impl BreakerRegistry {
    /// Build one breaker per dependency. Dependencies missing from the
    /// configuration get the built-in defaults.
    pub fn init(config: &ResilienceConfig) -> Self {
        let defaults = ResilienceConfig::default();
        let breakers = Dependency::ALL
            .into_iter()
            .map(|dep| {
                let cfg = config
                    .breakers
                    .get(&dep)
                    .or_else(|| defaults.breakers.get(&dep))
                    .cloned()
                    .unwrap_or_default();
                tracing::info!(
                    dependency = %dep,
                    timeout_ms = cfg.timeout_ms,
                    error_threshold = cfg.error_threshold_percentage,
                    reset_timeout_ms = cfg.reset_timeout_ms,
                    "Circuit breaker registered"
                );
                (dep, Arc::new(CircuitBreaker::new(dep, cfg)))
            })
            .collect();

        Self {
            breakers,
            jitter: JitterBounds::new(config.jitter_min_ms, config.jitter_max_ms),
        }
    }

    /// Replace the pre-dispatch jitter bounds.
    pub fn with_jitter(mut self, jitter: JitterBounds) -> Self {
        self.jitter = jitter;
        self
    }

    /// Look up the breaker for `dependency`.
    pub fn breaker(&self, dependency: Dependency) -> Result<&Arc<CircuitBreaker>, ResilienceError> {
        self.breakers.get(&dependency).ok_or_else(|| {
            tracing::error!(dependency = %dependency, "No circuit breaker registered");
            ResilienceError::UnknownBreaker(dependency.to_string())
        })
    }

    /// Run `op` against `dependency` under its breaker.
    ///
    /// On rejection, timeout or failure the fallback is resolved when
    /// given; otherwise a structured [`ResilienceError::Unavailable`] is
    /// returned. An open breaker never invokes `op`.
    pub async fn execute<T, E, F, Fut>(
        &self,
        dependency: Dependency,
        op: F,
        fallback: Option<Fallback<T>>,
    ) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let breaker = self.breaker(dependency)?;

        if breaker.state() != CircuitState::Open {
            self.jitter.delay().await;
        }

        let err = match breaker.call(op).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let retry_after = match &err {
            BreakerError::Open { retry_after } => *retry_after,
            _ => breaker.retry_after(),
        };
        let reason = err.to_string();

        match fallback {
            Some(fallback) => {
                tracing::warn!(
                    dependency = %dependency,
                    error = %reason,
                    "Guarded call failed, serving fallback"
                );
                Ok(fallback.resolve().await)
            }
            None => {
                tracing::warn!(dependency = %dependency, error = %reason, "Guarded call failed");
                Err(ResilienceError::Unavailable {
                    dependency,
                    retry_after,
                    reason,
                })
            }
        }
    }

    pub fn status(&self, dependency: Dependency) -> Option<BreakerStatus> {
        self.breakers.get(&dependency).map(|b| b.status())
    }

    /// Status by dependency name; unknown names yield `None`.
    pub fn status_by_name(&self, name: &str) -> Option<BreakerStatus> {
        name.parse::<Dependency>().ok().and_then(|dep| self.status(dep))
    }

    pub fn all_status(&self) -> BTreeMap<Dependency, BreakerStatus> {
        self.breakers
            .iter()
            .map(|(dep, breaker)| (*dep, breaker.status()))
            .collect()
    }

    /// Force `dependency`'s breaker Closed and clear its statistics.
    pub fn reset(&self, dependency: Dependency) -> Result<(), ResilienceError> {
        self.breaker(dependency)?.reset();
        Ok(())
    }

    /// Force `dependency`'s breaker Open until reset.
    pub fn open(&self, dependency: Dependency) -> Result<(), ResilienceError> {
        self.breaker(dependency)?.force_open();
        Ok(())
    }

    /// Abandon pending half-open probes on every breaker.
    pub fn shutdown(&self) {
        for breaker in self.breakers.values() {
            breaker.shutdown();
        }
        tracing::info!(count = self.breakers.len(), "Circuit breakers shut down");
    }
}
