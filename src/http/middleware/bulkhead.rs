//! Bulkhead admission middleware.
//! Applies per-route concurrency ceilings before any handler work.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::GatewayError;
use crate::resilience::{Admission, Bulkhead};

pub async fn bulkhead_middleware(
    State(bulkhead): State<Arc<Bulkhead>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match bulkhead.try_admit(request.uri().path()) {
        Admission::Unbounded => next.run(request).await,
        // The permit is held until the handler finishes or its future is
        // dropped (client disconnect).
        Admission::Admitted(_permit) => next.run(request).await,
        Admission::Rejected {
            route_prefix,
            retry_after,
        } => GatewayError::Overloaded {
            route_prefix,
            retry_after,
        }
        .into_response(),
    }
}
