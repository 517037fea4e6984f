//! Per-route concurrency limiter.
//!
//! # Responsibilities
//! - Map a request path to its ceiling by longest matching prefix
//! - Admit or reject atomically (no check-then-increment race)
//! - Release the slot when the RAII permit drops, on every exit path

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::schema::BulkheadConfig;
use crate::observability::metrics;

/// Retry hint returned with every rejection.
pub const BULKHEAD_RETRY_AFTER: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct Compartment {
    route_prefix: String,
    max_concurrent: usize,
    timeout_ms: u64,
    in_flight: AtomicUsize,
    rejected: AtomicU64,
}

/// Outcome of an admission attempt.
#[derive(Debug)]
pub enum Admission {
    /// No compartment covers this path.
    Unbounded,
    /// A slot was taken; it is released when the permit drops.
    Admitted(BulkheadPermit),
    /// The compartment is full.
    Rejected {
        route_prefix: String,
        retry_after: Duration,
    },
}

/// RAII guard holding one in-flight slot.
#[derive(Debug)]
pub struct BulkheadPermit {
    compartment: Arc<Compartment>,
}

impl BulkheadPermit {
    pub fn route_prefix(&self) -> &str {
        &self.compartment.route_prefix
    }
}

impl Drop for BulkheadPermit {
    fn drop(&mut self) {
        let c = &self.compartment;
        // Saturating: never go below zero even on a double release.
        let prev = c
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        metrics::record_bulkhead_in_flight(&c.route_prefix, prev.saturating_sub(1));
    }
}

/// Point-in-time view of one compartment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompartmentSnapshot {
    pub route_prefix: String,
    pub in_flight: usize,
    pub max_concurrent: usize,
    pub timeout_ms: u64,
    pub rejected_total: u64,
}

/// Set of per-route compartments.
#[derive(Debug, Default)]
pub struct Bulkhead {
    compartments: Vec<Arc<Compartment>>,
}

impl Bulkhead {
    /// Build compartments, ordered so the longest prefix matches first.
    pub fn new(configs: &[BulkheadConfig]) -> Self {
        let mut compartments: Vec<Arc<Compartment>> = configs
            .iter()
            .map(|cfg| {
                Arc::new(Compartment {
                    route_prefix: cfg.route_prefix.clone(),
                    max_concurrent: cfg.max_concurrent,
                    timeout_ms: cfg.timeout_ms,
                    in_flight: AtomicUsize::new(0),
                    rejected: AtomicU64::new(0),
                })
            })
            .collect();
        compartments.sort_by(|a, b| b.route_prefix.len().cmp(&a.route_prefix.len()));
        Self { compartments }
    }

    fn compartment_for(&self, path: &str) -> Option<&Arc<Compartment>> {
        self.compartments
            .iter()
            .find(|c| path.starts_with(c.route_prefix.as_str()))
    }

    /// Try to take a slot for `path`.
    pub fn try_admit(&self, path: &str) -> Admission {
        let Some(compartment) = self.compartment_for(path) else {
            return Admission::Unbounded;
        };

        let mut prev = compartment.in_flight.load(Ordering::Acquire);
        loop {
            if prev >= compartment.max_concurrent {
                compartment.rejected.fetch_add(1, Ordering::Relaxed);
                metrics::record_bulkhead_rejection(&compartment.route_prefix);
                tracing::warn!(
                    route = %compartment.route_prefix,
                    in_flight = prev,
                    max_concurrent = compartment.max_concurrent,
                    "Bulkhead full, rejecting request"
                );
                return Admission::Rejected {
                    route_prefix: compartment.route_prefix.clone(),
                    retry_after: BULKHEAD_RETRY_AFTER,
                };
            }
            match compartment.in_flight.compare_exchange_weak(
                prev,
                prev + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => prev = actual,
            }
        }

        metrics::record_bulkhead_in_flight(&compartment.route_prefix, prev + 1);
        Admission::Admitted(BulkheadPermit {
            compartment: compartment.clone(),
        })
    }

    /// Current in-flight count for the compartment covering `path`.
    pub fn in_flight(&self, path: &str) -> Option<usize> {
        self.compartment_for(path)
            .map(|c| c.in_flight.load(Ordering::Acquire))
    }

    pub fn snapshot(&self) -> Vec<CompartmentSnapshot> {
        let mut out: Vec<CompartmentSnapshot> = self
            .compartments
            .iter()
            .map(|c| CompartmentSnapshot {
                route_prefix: c.route_prefix.clone(),
                in_flight: c.in_flight.load(Ordering::Acquire),
                max_concurrent: c.max_concurrent,
                timeout_ms: c.timeout_ms,
                rejected_total: c.rejected.load(Ordering::Relaxed),
            })
            .collect();
        out.sort_by(|a, b| a.route_prefix.cmp(&b.route_prefix));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulkhead() -> Bulkhead {
        Bulkhead::new(&[
            BulkheadConfig::new("/api", 10),
            BulkheadConfig::new("/api/archive", 2),
        ])
    }

    #[test]
    fn test_longest_prefix_wins() {
        let b = bulkhead();
        match b.try_admit("/api/archive/2024/1") {
            Admission::Admitted(permit) => assert_eq!(permit.route_prefix(), "/api/archive"),
            other => panic!("expected admission, got {other:?}"),
        }
        match b.try_admit("/api/books/x") {
            Admission::Admitted(permit) => assert_eq!(permit.route_prefix(), "/api"),
            other => panic!("expected admission, got {other:?}"),
        }
    }

    #[test]
    fn test_unmatched_path_is_unbounded() {
        assert!(matches!(bulkhead().try_admit("/health"), Admission::Unbounded));
    }

    #[test]
    fn test_rejects_at_ceiling_and_releases_on_drop() {
        let b = bulkhead();
        let first = b.try_admit("/api/archive/a");
        let second = b.try_admit("/api/archive/b");
        assert!(matches!(first, Admission::Admitted(_)));
        assert!(matches!(second, Admission::Admitted(_)));

        match b.try_admit("/api/archive/c") {
            Admission::Rejected { route_prefix, retry_after } => {
                assert_eq!(route_prefix, "/api/archive");
                assert_eq!(retry_after, Duration::from_secs(1));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(b.in_flight("/api/archive"), Some(2));

        drop(first);
        assert_eq!(b.in_flight("/api/archive"), Some(1));
        assert!(matches!(b.try_admit("/api/archive/d"), Admission::Admitted(_)));
        drop(second);
        // The permit from the last admit was dropped immediately.
        assert_eq!(b.in_flight("/api/archive"), Some(0));
    }

    #[test]
    fn test_concurrent_admissions_never_exceed_ceiling() {
        let b = Arc::new(Bulkhead::new(&[BulkheadConfig::new("/api/books", 5)]));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let b = b.clone();
                std::thread::spawn(move || {
                    let mut held = Vec::new();
                    for _ in 0..50 {
                        if let Admission::Admitted(p) = b.try_admit("/api/books/x") {
                            assert!(b.in_flight("/api/books").unwrap() <= 5);
                            held.push(p);
                        }
                        if held.len() > 1 {
                            held.remove(0);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(b.in_flight("/api/books"), Some(0));
    }

    #[test]
    fn test_snapshot_reports_rejections() {
        let b = Bulkhead::new(&[BulkheadConfig::new("/api/saved", 0)]);
        assert!(matches!(b.try_admit("/api/saved"), Admission::Rejected { .. }));
        let snap = b.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].rejected_total, 1);
        assert_eq!(snap[0].in_flight, 0);
    }
}
