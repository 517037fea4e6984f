//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → bulkhead.rs (per-route in-flight ceiling, reject when full)
//!     → handler
//!         → registry.rs execute(dependency, op, fallback)
//!             → jitter.rs (randomized pre-dispatch delay)
//!             → circuit_breaker.rs (admission, invocation timeout, stats)
//!             → on failure: fallback or structured Unavailable error
//! ```
//!
//! # Design Decisions
//! - One breaker per downstream dependency, never global
//! - Breakers and bulkheads are per process; replicas do not share state
//! - Registry is constructed explicitly and threaded through `AppState`
//! - Bulkheads are independent of breakers and never retry

pub mod bulkhead;
pub mod circuit_breaker;
pub mod jitter;
pub mod registry;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use bulkhead::{Admission, Bulkhead, BulkheadPermit, CompartmentSnapshot};
pub use circuit_breaker::{BreakerError, BreakerStatus, CircuitBreaker, CircuitState};
pub use registry::{BreakerRegistry, Fallback, ResilienceError};

/// A downstream dependency guarded by its own circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dependency {
    /// The upstream NYT HTTP API.
    External,
    /// The saved-articles entity store.
    Database,
    /// The distributed key-value cache.
    Cache,
}

impl Dependency {
    pub const ALL: [Dependency; 3] = [Dependency::External, Dependency::Database, Dependency::Cache];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dependency::External => "external",
            Dependency::Database => "database",
            Dependency::Cache => "cache",
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dependency {
    type Err = ResilienceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "external" => Ok(Dependency::External),
            "database" => Ok(Dependency::Database),
            "cache" => Ok(Dependency::Cache),
            _ => Err(ResilienceError::UnknownBreaker(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_round_trips_names() {
        for dep in Dependency::ALL {
            assert_eq!(dep.as_str().parse::<Dependency>().unwrap(), dep);
        }
        assert_eq!(" External ".parse::<Dependency>().unwrap(), Dependency::External);
    }

    #[test]
    fn test_unknown_dependency_name() {
        let err = "mainframe".parse::<Dependency>().unwrap_err();
        assert!(matches!(err, ResilienceError::UnknownBreaker(name) if name == "mainframe"));
    }
}
