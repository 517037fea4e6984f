//! Cacheable NYT read handlers.
//!
//! # Request Flow
//! ```text
//! validate params → NytRequest
//!     → cache get (key from route + normalized params)
//!         HIT  → ETag compare → 304 | 200 (X-Cache-Status: HIT)
//!         MISS → execute(External, upstream fetch, degraded fallback)
//!             Fresh    → cache set (endpoint TTL) + tags → 304 | 200 (MISS)
//!             Degraded → 200, no-store, never cached
//! ```
//!
//! Concurrent misses on one key may both fetch; the last write wins.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Response,
};

use crate::error::GatewayError;
use crate::http::conditional::{cache_control, conditional_response, degraded_response, CacheStatus};
use crate::http::server::AppState;
use crate::resilience::{Dependency, Fallback};
use crate::upstream::types::current_year;
use crate::upstream::{Fetched, NytRequest, SearchParams};

pub async fn article_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Result<Response, GatewayError> {
    serve_cached(&state, &headers, NytRequest::article_search(params)?).await
}

pub async fn top_stories(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(section): Path<String>,
) -> Result<Response, GatewayError> {
    serve_cached(&state, &headers, NytRequest::top_stories(&section)?).await
}

pub async fn archive(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((year, month)): Path<(String, String)>,
) -> Result<Response, GatewayError> {
    let year: u16 = year
        .parse()
        .map_err(|_| GatewayError::BadRequest(format!("invalid year '{year}'")))?;
    let month: u8 = month
        .parse()
        .map_err(|_| GatewayError::BadRequest(format!("invalid month '{month}'")))?;
    serve_cached(&state, &headers, NytRequest::archive(year, month, current_year())?).await
}

pub async fn books(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(list): Path<String>,
) -> Result<Response, GatewayError> {
    serve_cached(&state, &headers, NytRequest::books(&list)?).await
}

pub async fn most_popular(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((kind, period)): Path<(String, String)>,
) -> Result<Response, GatewayError> {
    let period: u8 = period
        .parse()
        .map_err(|_| GatewayError::BadRequest(format!("invalid period '{period}'")))?;
    serve_cached(&state, &headers, NytRequest::most_popular(&kind, period)?).await
}

async fn serve_cached(
    state: &AppState,
    headers: &HeaderMap,
    request: NytRequest,
) -> Result<Response, GatewayError> {
    let policy = request.policy(&state.policies.load()).clone();
    let cache_control = cache_control(&policy);
    let key = state.cache.keys().request_key(request.route(), &request.params());

    if let Some(body) = state.cache.get_raw(&key).await {
        tracing::debug!(key = %key, route = request.route(), "Cache hit");
        return Ok(conditional_response(headers, body, &cache_control, CacheStatus::Hit));
    }

    match fetch_guarded(state, &request).await? {
        Fetched::Degraded(payload) => {
            tracing::warn!(route = request.route(), "Serving degraded payload");
            Ok(degraded_response(payload.to_string()))
        }
        Fetched::Fresh(payload) => {
            let body = payload.to_string();
            if state.cache.set_raw(&key, body.clone(), policy.ttl()).await {
                let keys = [key];
                for tag in request.tags() {
                    state.cache.tag_attach(&tag, &keys).await;
                }
            }
            Ok(conditional_response(headers, body, &cache_control, CacheStatus::Miss))
        }
    }
}

/// Call upstream under the `external` breaker. Transient failures feed the
/// breaker and fall back to the degraded payload; business errors pass
/// through as 502 without counting against upstream health.
async fn fetch_guarded(state: &AppState, request: &NytRequest) -> Result<Fetched, GatewayError> {
    let fallback = Fallback::value(Ok(Fetched::Degraded(request.degraded_payload())));
    let outcome = state
        .breakers
        .execute(
            Dependency::External,
            || async {
                match state.upstream.fetch(request).await {
                    Ok(payload) => Ok(Ok(Fetched::Fresh(payload))),
                    Err(e) if e.is_transient() => Err(e),
                    Err(e) => Ok(Err(e)),
                }
            },
            Some(fallback),
        )
        .await?;
    Ok(outcome?)
}
