//! Admin API.
//!
//! Breaker inspection and manual control, bulkhead occupancy and cache
//! invalidation, all behind a static bearer key.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/breakers", get(list_breakers))
        .route("/admin/breakers/{name}", get(get_breaker))
        .route("/admin/breakers/{name}/open", post(open_breaker))
        .route("/admin/breakers/{name}/close", post(reset_breaker))
        .route("/admin/breakers/{name}/reset", post(reset_breaker))
        .route("/admin/bulkheads", get(list_bulkheads))
        .route("/admin/cache/purge", post(purge_cache))
        .route("/admin/cache/tags/{tag}", delete(purge_tag))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
