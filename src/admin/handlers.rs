use std::collections::BTreeMap;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::http::request::CorrelationId;
use crate::http::server::AppState;
use crate::resilience::{BreakerStatus, CompartmentSnapshot, Dependency};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: &'static str,
    pub uptime_secs: u64,
    pub cache_backend: &'static str,
    pub cache_enabled: bool,
    pub breakers: BTreeMap<Dependency, BreakerStatus>,
    pub bulkheads: Vec<CompartmentSnapshot>,
    pub saved_articles: usize,
}

/// Body of `POST /admin/cache/purge`.
#[derive(Debug, Deserialize)]
pub struct PurgeRequest {
    pub tag: Option<String>,
    pub pattern: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PurgeResult {
    pub purged: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        cache_backend: state.cache.backend_name(),
        cache_enabled: state.cache.is_enabled(),
        breakers: state.breakers.all_status(),
        bulkheads: state.bulkhead.snapshot(),
        saved_articles: state.saved.len(),
    })
}

pub async fn list_breakers(State(state): State<AppState>) -> Json<BTreeMap<Dependency, BreakerStatus>> {
    Json(state.breakers.all_status())
}

pub async fn get_breaker(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<BreakerStatus>, GatewayError> {
    state
        .breakers
        .status_by_name(&name)
        .map(Json)
        .ok_or_else(|| GatewayError::NotFound(format!("no circuit breaker named '{name}'")))
}

fn parse_dependency(name: &str) -> Result<Dependency, GatewayError> {
    name.parse()
        .map_err(|_| GatewayError::NotFound(format!("no circuit breaker named '{name}'")))
}

pub async fn open_breaker(
    State(state): State<AppState>,
    CorrelationId(correlation_id): CorrelationId,
    Path(name): Path<String>,
) -> Result<Json<BreakerStatus>, GatewayError> {
    let dep = parse_dependency(&name)?;
    state.breakers.open(dep)?;
    tracing::warn!(dependency = %dep, correlation_id = %correlation_id, "Breaker forced open via admin API");
    breaker_status(&state, dep)
}

/// `close` and `reset` both force the breaker Closed with fresh statistics.
pub async fn reset_breaker(
    State(state): State<AppState>,
    CorrelationId(correlation_id): CorrelationId,
    Path(name): Path<String>,
) -> Result<Json<BreakerStatus>, GatewayError> {
    let dep = parse_dependency(&name)?;
    state.breakers.reset(dep)?;
    tracing::info!(dependency = %dep, correlation_id = %correlation_id, "Breaker reset via admin API");
    breaker_status(&state, dep)
}

fn breaker_status(state: &AppState, dep: Dependency) -> Result<Json<BreakerStatus>, GatewayError> {
    state
        .breakers
        .status(dep)
        .map(Json)
        .ok_or_else(|| GatewayError::NotFound(format!("no circuit breaker named '{dep}'")))
}

pub async fn list_bulkheads(State(state): State<AppState>) -> Json<Vec<CompartmentSnapshot>> {
    Json(state.bulkhead.snapshot())
}

pub async fn purge_cache(
    State(state): State<AppState>,
    CorrelationId(correlation_id): CorrelationId,
    payload: Result<Json<PurgeRequest>, JsonRejection>,
) -> Result<Json<PurgeResult>, GatewayError> {
    let Json(request) = payload.map_err(|e| GatewayError::BadRequest(e.body_text()))?;
    let purged = match (request.tag, request.pattern) {
        (Some(tag), None) => state.cache.purge_by_tag(&tag).await,
        (None, Some(pattern)) => state.cache.purge_pattern(&pattern).await,
        _ => {
            return Err(GatewayError::BadRequest(
                "exactly one of 'tag' or 'pattern' is required".to_string(),
            ))
        }
    };
    tracing::info!(purged, correlation_id = %correlation_id, "Cache purged via admin API");
    Ok(Json(PurgeResult { purged }))
}

pub async fn purge_tag(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Json<PurgeResult> {
    Json(PurgeResult {
        purged: state.cache.purge_by_tag(&tag).await,
    })
}
