//! Saved-article handlers.
//!
//! Reads of the list are cached under the `saved` tag; every mutation
//! purges that tag. `PATCH` and `DELETE` honor `If-Match`: the entity's
//! current ETag is compared first, then the store applies the change only
//! if the version it was computed from is still current.

use std::convert::Infallible;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::cache::etag::make_etag;
use crate::error::GatewayError;
use crate::http::conditional::{
    cache_control, check_if_match, conditional_response, entity_response, provided_if_match,
    CacheStatus,
};
use crate::http::server::AppState;
use crate::resilience::Dependency;
use crate::saved::{NewSavedArticle, SavedArticle, SavedArticlePatch, SavedError};

/// Cache tag covering every saved-article read.
pub const SAVED_TAG: &str = "saved";

const SAVED_ROUTE: &str = "saved";

pub async fn list(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, GatewayError> {
    let policy = state.policies.load().saved.clone();
    let cache_control = cache_control(&policy);
    let key = state.cache.keys().request_key(SAVED_ROUTE, &json!({ "view": "list" }));

    if let Some(body) = state.cache.get_raw(&key).await {
        return Ok(conditional_response(&headers, body, &cache_control, CacheStatus::Hit));
    }

    let store = state.saved.clone();
    let items = with_db(&state, move || Ok(store.list())).await?;
    let body = to_body(&json!({ "count": items.len(), "items": items }))?;

    if state.cache.set_raw(&key, body.clone(), policy.ttl()).await {
        state.cache.tag_attach(SAVED_TAG, &[key]).await;
    }
    Ok(conditional_response(&headers, body, &cache_control, CacheStatus::Miss))
}

pub async fn get_one(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, GatewayError> {
    let store = state.saved.clone();
    let article = with_db(&state, move || store.get(&id)).await?;
    let body = to_body(&article)?;
    let cache_control = cache_control(&state.policies.load().saved);
    Ok(conditional_response(&headers, body, &cache_control, CacheStatus::Miss))
}

pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<NewSavedArticle>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let Json(new) = payload.map_err(|e| GatewayError::BadRequest(e.body_text()))?;
    let store = state.saved.clone();
    let article = with_db(&state, move || store.create(new)).await?;
    state.cache.purge_by_tag(SAVED_TAG).await;

    tracing::info!(id = %article.id, "Saved article created");
    let location = format!("/api/saved/{}", article.id);
    let mut response = entity_response(
        StatusCode::CREATED,
        to_body(&article)?,
        &cache_control(&state.policies.load().saved),
    );
    if let Ok(value) = HeaderValue::from_str(&location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    Ok(response)
}

pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<SavedArticlePatch>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let Json(patch) = payload.map_err(|e| GatewayError::BadRequest(e.body_text()))?;
    let current = load_checked(&state, &headers, &id).await?;

    let store = state.saved.clone();
    let version = current.version;
    let updated = with_db(&state, move || store.update(&id, version, patch))
        .await
        .map_err(|e| with_provided_tag(e, &headers))?;
    state.cache.purge_by_tag(SAVED_TAG).await;

    tracing::info!(id = %updated.id, version = updated.version, "Saved article updated");
    Ok(entity_response(
        StatusCode::OK,
        to_body(&updated)?,
        &cache_control(&state.policies.load().saved),
    ))
}

pub async fn remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, GatewayError> {
    let current = load_checked(&state, &headers, &id).await?;

    let store = state.saved.clone();
    let version = current.version;
    let target = id.clone();
    with_db(&state, move || store.delete(&target, version))
        .await
        .map_err(|e| with_provided_tag(e, &headers))?;
    state.cache.purge_by_tag(SAVED_TAG).await;

    tracing::info!(id = %id, "Saved article deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Load the entity and verify `If-Match` against its current ETag.
async fn load_checked(state: &AppState, headers: &HeaderMap, id: &str) -> Result<SavedArticle, GatewayError> {
    let store = state.saved.clone();
    let owned = id.to_string();
    let current = with_db(state, move || store.get(&owned)).await?;
    check_if_match(headers, &make_etag(to_body(&current)?))?;
    Ok(current)
}

/// Run a store operation under the `database` breaker.
async fn with_db<T, F>(state: &AppState, op: F) -> Result<T, GatewayError>
where
    F: FnOnce() -> Result<T, SavedError>,
{
    let result = state
        .breakers
        .execute(Dependency::Database, || async move { Ok::<_, Infallible>(op()) }, None)
        .await?;
    result.map_err(GatewayError::from)
}

/// A version conflict found by the store reports the client's tag too.
fn with_provided_tag(err: GatewayError, headers: &HeaderMap) -> GatewayError {
    match err {
        GatewayError::PreconditionFailed { current_etag, .. } => GatewayError::PreconditionFailed {
            current_etag,
            provided_etag: provided_if_match(headers),
        },
        other => other,
    }
}

fn to_body<T: serde::Serialize>(value: &T) -> Result<String, GatewayError> {
    serde_json::to_string(value).map_err(|e| GatewayError::Internal(e.to_string()))
}
