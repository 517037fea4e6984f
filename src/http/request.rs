//! Request correlation.
//!
//! # Responsibilities
//! - Accept a caller-supplied `X-Correlation-ID` or generate a UUID v4
//! - Echo it on every response
//! - Attach it to the request span so every log line carries it

use std::convert::Infallible;

use axum::{
    body::Body,
    extract::FromRequestParts,
    http::{request::Parts, HeaderName, Request},
};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::Span;

pub const X_CORRELATION_ID: &str = "x-correlation-id";

fn header_name() -> HeaderName {
    HeaderName::from_static(X_CORRELATION_ID)
}

/// Layer setting `X-Correlation-ID` on requests that lack one.
pub fn set_correlation_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(header_name(), MakeRequestUuid)
}

/// Layer copying the request's `X-Correlation-ID` to the response.
pub fn propagate_correlation_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(header_name())
}

/// Span factory for `TraceLayer`.
pub fn make_request_span(request: &Request<Body>) -> Span {
    let correlation_id = request
        .headers()
        .get(X_CORRELATION_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        correlation_id = %correlation_id,
    )
}

/// The request's correlation ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(X_CORRELATION_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Ok(CorrelationId(id))
    }
}
