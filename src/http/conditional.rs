//! Conditional responses.
//!
//! # Responsibilities
//! - Build `Cache-Control` from an endpoint policy
//! - Answer `If-None-Match` with 304 or a full 200 carrying `ETag`
//! - Check `If-Match` preconditions for mutations
//!
//! # Design Decisions
//! - The ETag is always computed from the exact body bytes sent
//! - Degraded payloads carry no ETag and `no-store`

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;

use crate::cache::etag::{etag_matches, extract_etag, make_etag};
use crate::config::schema::EndpointPolicy;
use crate::error::GatewayError;

pub const X_CACHE_STATUS: HeaderName = HeaderName::from_static("x-cache-status");

/// Where a cacheable payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// `Cache-Control` value for `policy`.
pub fn cache_control(policy: &EndpointPolicy) -> String {
    let mut directives = vec![
        if policy.s_maxage_secs > 0 { "public" } else { "private" }.to_string(),
        format!("max-age={}", policy.max_age_secs),
    ];
    if policy.s_maxage_secs > 0 {
        directives.push(format!("s-maxage={}", policy.s_maxage_secs));
    }
    if policy.stale_while_revalidate_secs > 0 {
        directives.push(format!(
            "stale-while-revalidate={}",
            policy.stale_while_revalidate_secs
        ));
    }
    if policy.must_revalidate {
        directives.push("must-revalidate".to_string());
    }
    directives.join(", ")
}

/// Whether `If-None-Match` matches `etag`.
pub fn if_none_match(headers: &HeaderMap, etag: &str) -> bool {
    let Some(raw) = headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    if raw.trim() == "*" {
        return true;
    }
    raw.split(',')
        .filter_map(|candidate| extract_etag(Some(candidate)))
        .any(|candidate| etag_matches(&candidate, etag))
}

/// Verify `If-Match` against the current representation's tag.
/// An absent header passes.
pub fn check_if_match(headers: &HeaderMap, current_etag: &str) -> Result<(), GatewayError> {
    let Some(value) = headers.get(header::IF_MATCH) else {
        return Ok(());
    };
    let raw = value.to_str().unwrap_or_default().trim();
    if raw == "*" {
        return Ok(());
    }
    match extract_etag(Some(raw)) {
        Some(provided) if etag_matches(&provided, current_etag) => Ok(()),
        Some(provided) => Err(GatewayError::PreconditionFailed {
            current_etag: current_etag.to_string(),
            provided_etag: provided,
        }),
        None => Err(GatewayError::PreconditionFailed {
            current_etag: current_etag.to_string(),
            provided_etag: raw.to_string(),
        }),
    }
}

/// The `If-Match` tag the client sent, if any (for conflict reporting).
pub fn provided_if_match(headers: &HeaderMap) -> String {
    headers
        .get(header::IF_MATCH)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn header_value(s: &str) -> HeaderValue {
    HeaderValue::from_str(s).unwrap_or_else(|_| HeaderValue::from_static("no-store"))
}

/// 304 when the client's tag matches, otherwise 200 with the body.
pub fn conditional_response(
    request_headers: &HeaderMap,
    body: String,
    cache_control: &str,
    status: CacheStatus,
) -> Response {
    let etag = make_etag(&body);
    let not_modified = if_none_match(request_headers, &etag);

    let mut response = if not_modified {
        Response::new(Body::empty())
    } else {
        Response::new(Body::from(body))
    };
    let headers = response.headers_mut();
    headers.insert(header::ETAG, header_value(&etag));
    headers.insert(header::CACHE_CONTROL, header_value(cache_control));
    headers.insert(X_CACHE_STATUS, HeaderValue::from_static(status.as_str()));
    if not_modified {
        *response.status_mut() = StatusCode::NOT_MODIFIED;
    } else {
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    response
}

/// 200 with a degraded fallback payload: no ETag, never stored.
pub fn degraded_response(body: String) -> Response {
    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(X_CACHE_STATUS, HeaderValue::from_static(CacheStatus::Miss.as_str()));
    response
}

/// Entity response with a fresh `ETag` (for mutations).
pub fn entity_response(status: StatusCode, body: String, cache_control: &str) -> Response {
    let etag = make_etag(&body);
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(header::ETAG, header_value(&etag));
    headers.insert(header::CACHE_CONTROL, header_value(cache_control));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(name, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn test_cache_control_directives() {
        let policy = EndpointPolicy::new(300, 60, 300, 600, false);
        assert_eq!(
            cache_control(&policy),
            "public, max-age=60, s-maxage=300, stale-while-revalidate=600"
        );
        let private = EndpointPolicy::new(60, 0, 0, 0, true);
        assert_eq!(cache_control(&private), "private, max-age=0, must-revalidate");
    }

    #[test]
    fn test_matching_tag_yields_304_without_body() {
        let body = r#"{"results":[]}"#.to_string();
        let etag = make_etag(&body);
        let req = headers(header::IF_NONE_MATCH, &format!("\"other\", W/{etag}"));
        let response = conditional_response(&req, body, "public, max-age=60", CacheStatus::Hit);
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(response.headers()[header::ETAG], etag.as_str());
        assert_eq!(response.headers()[X_CACHE_STATUS], "HIT");
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
    }

    #[test]
    fn test_mismatched_tag_yields_200() {
        let req = headers(header::IF_NONE_MATCH, "\"stale\"");
        let response = conditional_response(&req, "{}".into(), "private, max-age=0", CacheStatus::Miss);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[X_CACHE_STATUS], "MISS");
    }

    #[test]
    fn test_wildcard_if_none_match() {
        assert!(if_none_match(&headers(header::IF_NONE_MATCH, "*"), "\"x\""));
        assert!(!if_none_match(&HeaderMap::new(), "\"x\""));
    }

    #[test]
    fn test_if_match_checks() {
        let current = make_etag("v1");
        assert!(check_if_match(&HeaderMap::new(), &current).is_ok());
        assert!(check_if_match(&headers(header::IF_MATCH, &current), &current).is_ok());
        assert!(check_if_match(&headers(header::IF_MATCH, "*"), &current).is_ok());

        match check_if_match(&headers(header::IF_MATCH, "\"old\""), &current) {
            Err(GatewayError::PreconditionFailed {
                current_etag,
                provided_etag,
            }) => {
                assert_eq!(current_etag, current);
                assert_eq!(provided_etag, "\"old\"");
            }
            other => panic!("expected precondition failure, got {other:?}"),
        }
    }

    #[test]
    fn test_degraded_response_is_not_storable() {
        let response = degraded_response("{}".into());
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
        assert!(response.headers().get(header::ETAG).is_none());
    }
}
