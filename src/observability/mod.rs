//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Handlers, breakers, bulkheads, cache client
//!     → logging.rs (tracing subscriber: EnvFilter, pretty or JSON)
//!     → metrics.rs (gateway_* counters, gauges, histograms)
//!
//! Request path:
//!     TraceLayer span (method, path, correlation_id)
//!     → track_metrics (route template, status, latency)
//!
//! Consumers:
//!     → stdout
//!     → Prometheus scrape on observability.metrics_address
//! ```
//!
//! # Design Decisions
//! - Metric labels use the matched route template, never the raw path
//! - Breaker state is exported as a gauge (0 closed, 1 half-open, 2 open)
//! - Without an installed recorder every metric call is a no-op

pub mod logging;
pub mod metrics;
