//! Problem Details responses.
//!
//! # Responsibilities
//! - Render every error as `application/problem+json`
//! - Carry `Retry-After` for 429/503
//! - Fill request-scoped fields (`instance`, `correlationId`) from a
//!   middleware so error constructors stay context-free
//!
//! # Design Decisions
//! - The `Problem` travels in the response extensions; the enrich
//!   middleware re-renders the body once the request context is known

use axum::{
    body::Body,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::http::request::X_CORRELATION_ID;

pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

/// RFC 7807 problem document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provided_etag: Option<String>,
}

impl Problem {
    pub fn new(status: StatusCode, slug: &str, title: &str, detail: impl Into<String>) -> Self {
        Self {
            problem_type: format!("/problems/{slug}"),
            title: title.to_string(),
            status: status.as_u16(),
            detail: detail.into(),
            instance: None,
            retry_after: None,
            correlation_id: None,
            current_etag: None,
            provided_etag: None,
        }
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after = Some(secs);
        self
    }

    pub fn with_etags(mut self, current: impl Into<String>, provided: impl Into<String>) -> Self {
        self.current_etag = Some(current.into());
        self.provided_etag = Some(provided.into());
        self
    }

    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn body(&self) -> Body {
        match serde_json::to_vec(self) {
            Ok(bytes) => Body::from(bytes),
            Err(_) => Body::from(self.detail.clone()),
        }
    }
}

impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        let mut response = Response::new(self.body());
        *response.status_mut() = self.status_code();
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(PROBLEM_CONTENT_TYPE));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        if let Some(secs) = self.retry_after {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response.extensions_mut().insert(self);
        response
    }
}

/// Middleware adding `instance` and `correlationId` to problem responses.
pub async fn enrich_problem(request: Request<Body>, next: Next) -> Response {
    let instance = request.uri().path().to_string();
    let correlation_id = request
        .headers()
        .get(X_CORRELATION_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut response = next.run(request).await;
    let Some(mut problem) = response.extensions_mut().remove::<Problem>() else {
        return response;
    };

    problem.instance.get_or_insert(instance);
    if problem.correlation_id.is_none() {
        problem.correlation_id = correlation_id;
    }
    response.headers_mut().remove(header::CONTENT_LENGTH);
    *response.body_mut() = problem.body();
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_serializes_camel_case() {
        let problem = Problem::new(StatusCode::PRECONDITION_FAILED, "precondition-failed", "Precondition Failed", "stale")
            .with_etags("\"a\"", "\"b\"");
        let json = serde_json::to_value(&problem).unwrap();
        assert_eq!(json["type"], "/problems/precondition-failed");
        assert_eq!(json["status"], 412);
        assert_eq!(json["currentEtag"], "\"a\"");
        assert_eq!(json["providedEtag"], "\"b\"");
        assert!(json.get("retryAfter").is_none());
    }

    #[test]
    fn test_problem_response_headers() {
        let response = Problem::new(StatusCode::SERVICE_UNAVAILABLE, "overloaded", "Overloaded", "busy")
            .with_retry_after(1)
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
        assert_eq!(response.headers()[header::CONTENT_TYPE], PROBLEM_CONTENT_TYPE);
        assert!(response.extensions().get::<Problem>().is_some());
    }
}
