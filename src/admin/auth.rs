//! Bearer-key authentication for the admin API.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::GatewayError;
use crate::http::server::AppState;

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(key) if key == state.config.admin.api_key => next.run(request).await,
        _ => {
            tracing::warn!(path = %request.uri().path(), "Rejected admin request");
            GatewayError::Unauthorized.into_response()
        }
    }
}
