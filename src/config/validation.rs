//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, thresholds within 0-100)
//! - Detect conflicting bulkhead prefixes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::{GatewayConfig, PLACEHOLDER_ADMIN_KEY};

/// One semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("listener.bind_address", "must be a socket address"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be greater than 0"));
    }

    match url::Url::parse(&config.upstream.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => errors.push(ValidationError::new("upstream.base_url", "must be an http(s) URL")),
    }

    if config.cache.build_id.trim().is_empty() {
        errors.push(ValidationError::new("cache.build_id", "must not be empty"));
    }
    if config.cache.namespace.trim().is_empty() {
        errors.push(ValidationError::new("cache.namespace", "must not be empty"));
    }
    if let Some(url) = &config.cache.redis_url {
        if !(url.starts_with("redis://") || url.starts_with("rediss://")) {
            errors.push(ValidationError::new("cache.redis_url", "must use redis:// or rediss://"));
        }
    }
    if config.cache.tag_ttl_secs == 0 {
        errors.push(ValidationError::new("cache.tag_ttl_secs", "must be greater than 0"));
    }

    let resilience = &config.resilience;
    if resilience.jitter_min_ms > resilience.jitter_max_ms {
        errors.push(ValidationError::new(
            "resilience.jitter_min_ms",
            "must not exceed jitter_max_ms",
        ));
    }
    for (dep, breaker) in &resilience.breakers {
        let field = |name: &str| format!("resilience.breakers.{dep}.{name}");
        if breaker.timeout_ms == 0 {
            errors.push(ValidationError::new(field("timeout_ms"), "must be greater than 0"));
        }
        if breaker.error_threshold_percentage == 0 || breaker.error_threshold_percentage > 100 {
            errors.push(ValidationError::new(
                field("error_threshold_percentage"),
                "must be between 1 and 100",
            ));
        }
        if breaker.reset_timeout_ms == 0 {
            errors.push(ValidationError::new(field("reset_timeout_ms"), "must be greater than 0"));
        }
        if breaker.rolling_buckets == 0 {
            errors.push(ValidationError::new(field("rolling_buckets"), "must be greater than 0"));
        } else if breaker.rolling_window_ms < u64::from(breaker.rolling_buckets) {
            errors.push(ValidationError::new(
                field("rolling_window_ms"),
                "must be at least one millisecond per bucket",
            ));
        }
        if breaker.half_open_max_probes == 0 {
            errors.push(ValidationError::new(field("half_open_max_probes"), "must be greater than 0"));
        }
    }

    let mut prefixes = HashSet::new();
    for (i, bulkhead) in config.bulkheads.iter().enumerate() {
        let field = |name: &str| format!("bulkheads[{i}].{name}");
        if !bulkhead.route_prefix.starts_with('/') {
            errors.push(ValidationError::new(field("route_prefix"), "must start with '/'"));
        }
        if bulkhead.max_concurrent == 0 {
            errors.push(ValidationError::new(field("max_concurrent"), "must be greater than 0"));
        }
        if !prefixes.insert(bulkhead.route_prefix.as_str()) {
            errors.push(ValidationError::new(field("route_prefix"), "duplicate prefix"));
        }
    }

    if config.admin.enabled
        && (config.admin.api_key.trim().is_empty() || config.admin.api_key == PLACEHOLDER_ADMIN_KEY)
    {
        errors.push(ValidationError::new(
            "admin.api_key",
            "must be set to a real secret when the admin API is enabled",
        ));
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }
    if !matches!(
        observability.log_level.to_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        errors.push(ValidationError::new(
            "observability.log_level",
            "must be one of trace, debug, info, warn, error",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
