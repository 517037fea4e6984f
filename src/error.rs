//! Gateway-level error type.
//!
//! Subsystem errors (`ResilienceError`, `UpstreamError`, `SavedError`)
//! converge here; `IntoResponse` renders each variant as a Problem
//! Details document with the matching status code.

use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::cache::etag::make_etag;
use crate::http::response::Problem;
use crate::resilience::circuit_breaker::ceil_secs;
use crate::resilience::ResilienceError;
use crate::saved::SavedError;
use crate::upstream::UpstreamError;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{dependency} unavailable: {reason}")]
    ServiceUnavailable {
        dependency: String,
        retry_after: Duration,
        reason: String,
    },

    #[error("too many concurrent requests for {route_prefix}")]
    Overloaded {
        route_prefix: String,
        retry_after: Duration,
    },

    #[error("precondition failed: current {current_etag}, provided {provided_etag}")]
    PreconditionFailed {
        current_etag: String,
        provided_etag: String,
    },

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("missing or invalid admin credentials")]
    Unauthorized,

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::ServiceUnavailable { .. } | GatewayError::Overloaded { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::PreconditionFailed { .. } => StatusCode::PRECONDITION_FAILED,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_problem(&self) -> Problem {
        let status = self.status();
        match self {
            GatewayError::ServiceUnavailable { retry_after, .. } => {
                Problem::new(status, "service-unavailable", "Service Unavailable", self.to_string())
                    .with_retry_after(ceil_secs(*retry_after).max(1))
            }
            GatewayError::Overloaded { retry_after, .. } => {
                Problem::new(status, "overloaded", "Overloaded", self.to_string())
                    .with_retry_after(ceil_secs(*retry_after).max(1))
            }
            GatewayError::PreconditionFailed {
                current_etag,
                provided_etag,
            } => Problem::new(
                status,
                "precondition-failed",
                "Precondition Failed",
                "The resource was modified; refetch it and retry with the current ETag",
            )
            .with_etags(current_etag.clone(), provided_etag.clone()),
            GatewayError::BadRequest(_) => {
                Problem::new(status, "bad-request", "Bad Request", self.to_string())
            }
            GatewayError::NotFound(_) => Problem::new(status, "not-found", "Not Found", self.to_string()),
            GatewayError::Upstream(_) => Problem::new(status, "bad-gateway", "Bad Gateway", self.to_string()),
            GatewayError::Unauthorized => {
                Problem::new(status, "unauthorized", "Unauthorized", self.to_string())
            }
            GatewayError::Internal(_) => Problem::new(
                status,
                "internal-error",
                "Internal Server Error",
                "An unexpected error occurred",
            ),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        if let GatewayError::Internal(reason) = &self {
            tracing::error!(error = %reason, "Internal error");
        }
        let mut response = self.to_problem().into_response();
        if matches!(self, GatewayError::Unauthorized) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<ResilienceError> for GatewayError {
    fn from(err: ResilienceError) -> Self {
        match err {
            ResilienceError::Unavailable {
                dependency,
                retry_after,
                reason,
            } => GatewayError::ServiceUnavailable {
                dependency: dependency.to_string(),
                retry_after,
                reason,
            },
            ResilienceError::UnknownBreaker(_) => GatewayError::Internal(err.to_string()),
        }
    }
}

impl From<UpstreamError> for GatewayError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::InvalidParams(msg) => GatewayError::BadRequest(msg),
            other => GatewayError::Upstream(other.to_string()),
        }
    }
}

impl From<SavedError> for GatewayError {
    fn from(err: SavedError) -> Self {
        match err {
            SavedError::NotFound(_) => GatewayError::NotFound(err.to_string()),
            SavedError::Invalid(msg) => GatewayError::BadRequest(msg),
            SavedError::VersionConflict { current } => GatewayError::PreconditionFailed {
                current_etag: make_etag(serde_json::to_vec(&*current).unwrap_or_default()),
                provided_etag: String::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::Dependency;

    #[test]
    fn test_unavailable_maps_to_503_with_retry_after() {
        let err: GatewayError = ResilienceError::Unavailable {
            dependency: Dependency::External,
            retry_after: Duration::from_millis(2_500),
            reason: "circuit open".into(),
        }
        .into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "3");
    }

    #[test]
    fn test_unknown_breaker_is_internal() {
        let err: GatewayError = ResilienceError::UnknownBreaker("x".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_problem().detail, "An unexpected error occurred");
    }

    #[test]
    fn test_upstream_mapping() {
        let bad: GatewayError = UpstreamError::InvalidParams("page".into()).into();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
        let business: GatewayError = UpstreamError::Status {
            status: 404,
            message: "no such list".into(),
        }
        .into();
        assert_eq!(business.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_unauthorized_sets_challenge() {
        let response = GatewayError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }
}
