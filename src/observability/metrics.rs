//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, cache, breakers, bulkheads)
//! - Expose Prometheus-compatible metrics endpoint
//! - Record per-route request metrics from a middleware
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, route, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_cache_operations_total` (counter): cache ops by op and result
//! - `gateway_circuit_state` (gauge): 0=closed, 1=half_open, 2=open
//! - `gateway_circuit_rejections_total` (counter): fast-failed calls
//! - `gateway_bulkhead_in_flight` (gauge): in-flight requests per route
//! - `gateway_bulkhead_rejections_total` (counter): rejected requests
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so unit tests
//!   and library users pay nothing
//! - Labels use the matched route template, never the raw path

use std::net::SocketAddr;
use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::CircuitState;

/// Install the Prometheus recorder and its scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, route: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("route", route.to_string()),
        ("status", status.to_string()),
    ];
    counter!("gateway_requests_total", &labels).increment(1);
    histogram!("gateway_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

/// `result` is one of `hit`, `miss`, `stored`, `deleted`, `purged`, `error`.
pub fn record_cache(op: &'static str, result: &'static str) {
    counter!("gateway_cache_operations_total", "op" => op, "result" => result).increment(1);
}

pub fn record_breaker_state(dependency: &str, state: CircuitState) {
    gauge!("gateway_circuit_state", "dependency" => dependency.to_string()).set(state.as_gauge());
}

pub fn record_breaker_rejection(dependency: &str) {
    counter!("gateway_circuit_rejections_total", "dependency" => dependency.to_string()).increment(1);
}

pub fn record_bulkhead_in_flight(route: &str, in_flight: usize) {
    gauge!("gateway_bulkhead_in_flight", "route" => route.to_string()).set(in_flight as f64);
}

pub fn record_bulkhead_rejection(route: &str) {
    counter!("gateway_bulkhead_rejections_total", "route" => route.to_string()).increment(1);
}

/// Middleware recording count and latency for every request.
pub async fn track_metrics(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;
    record_request(&method, &route, response.status().as_u16(), start);
    response
}
