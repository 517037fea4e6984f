//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::Dependency;
use crate::resilience::jitter::{JITTER_MAX_MS, JITTER_MIN_MS};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request hardening.
    pub security: SecurityConfig,

    /// Upstream NYT API settings.
    pub upstream: UpstreamConfig,

    /// Distributed cache and per-endpoint HTTP caching policies.
    pub cache: CacheConfig,

    /// Circuit breakers and jitter.
    pub resilience: ResilienceConfig,

    /// Per-route concurrency ceilings.
    pub bulkheads: Vec<BulkheadConfig>,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            timeouts: TimeoutConfig::default(),
            security: SecurityConfig::default(),
            upstream: UpstreamConfig::default(),
            cache: CacheConfig::default(),
            resilience: ResilienceConfig::default(),
            bulkheads: default_bulkheads(),
            admin: AdminConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Grace period for draining in-flight requests on shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            shutdown_grace_secs: 10,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 64 * 1024,
        }
    }
}

/// Upstream API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the NYT API (`/svc` root).
    pub base_url: String,

    /// API key sent as the `api-key` query parameter.
    pub api_key: String,

    /// Connect timeout in seconds. The per-call deadline is owned by the
    /// `external` circuit breaker.
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.nytimes.com/svc".to_string(),
            api_key: String::new(),
            connect_timeout_secs: 5,
        }
    }
}

/// Distributed cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable caching. When disabled every read is a miss.
    pub enabled: bool,

    /// Redis URL. `None` selects the in-process backend.
    pub redis_url: Option<String>,

    /// Deployment/build identifier prefixed to every key.
    pub build_id: String,

    /// Namespace segment for request keys.
    pub namespace: String,

    /// Expiry applied to tag sets on every attach.
    pub tag_ttl_secs: u64,

    /// HTTP caching policy per endpoint class.
    pub policies: CachePolicies,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redis_url: None,
            build_id: env!("CARGO_PKG_VERSION").to_string(),
            namespace: "nyt".to_string(),
            tag_ttl_secs: 24 * 60 * 60,
            policies: CachePolicies::default(),
        }
    }
}

/// Caching policies for every cacheable endpoint class.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CachePolicies {
    pub article_search: EndpointPolicy,
    pub top_stories: EndpointPolicy,
    pub archive: EndpointPolicy,
    pub books: EndpointPolicy,
    pub most_popular: EndpointPolicy,
    pub saved: EndpointPolicy,
}

impl Default for CachePolicies {
    fn default() -> Self {
        Self {
            article_search: EndpointPolicy::new(300, 60, 300, 600, false),
            top_stories: EndpointPolicy::new(300, 60, 300, 600, false),
            // Archive months are effectively immutable.
            archive: EndpointPolicy::new(24 * 3600, 3600, 24 * 3600, 24 * 3600, false),
            books: EndpointPolicy::new(3600, 600, 3600, 3600, false),
            most_popular: EndpointPolicy::new(900, 300, 900, 900, false),
            saved: EndpointPolicy::new(60, 0, 0, 0, true),
        }
    }
}

/// TTL and `Cache-Control` directives for one endpoint class.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EndpointPolicy {
    /// Time-to-live of the distributed cache entry.
    pub ttl_secs: u64,

    /// `max-age` directive (browser cache).
    pub max_age_secs: u64,

    /// `s-maxage` directive (shared caches).
    pub s_maxage_secs: u64,

    /// `stale-while-revalidate` directive.
    pub stale_while_revalidate_secs: u64,

    /// Emit `must-revalidate`.
    #[serde(default)]
    pub must_revalidate: bool,
}

impl EndpointPolicy {
    pub const fn new(
        ttl_secs: u64,
        max_age_secs: u64,
        s_maxage_secs: u64,
        stale_while_revalidate_secs: u64,
        must_revalidate: bool,
    ) -> Self {
        Self {
            ttl_secs,
            max_age_secs,
            s_maxage_secs,
            stale_while_revalidate_secs,
            must_revalidate,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Resilience configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Lower bound of the pre-dispatch jitter in milliseconds.
    pub jitter_min_ms: u64,

    /// Upper bound of the pre-dispatch jitter in milliseconds.
    pub jitter_max_ms: u64,

    /// Breaker settings per dependency.
    pub breakers: BTreeMap<Dependency, BreakerConfig>,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        let mut breakers = BTreeMap::new();
        // The upstream API is slow and flaky; tolerate more before tripping.
        breakers.insert(
            Dependency::External,
            BreakerConfig {
                timeout_ms: 10_000,
                error_threshold_percentage: 50,
                reset_timeout_ms: 30_000,
                rolling_window_ms: 10_000,
                rolling_buckets: 10,
                volume_threshold: 5,
                half_open_max_probes: 1,
            },
        );
        breakers.insert(
            Dependency::Database,
            BreakerConfig {
                timeout_ms: 5_000,
                error_threshold_percentage: 50,
                reset_timeout_ms: 15_000,
                rolling_window_ms: 10_000,
                rolling_buckets: 10,
                volume_threshold: 5,
                half_open_max_probes: 1,
            },
        );
        breakers.insert(
            Dependency::Cache,
            BreakerConfig {
                timeout_ms: 1_000,
                error_threshold_percentage: 25,
                reset_timeout_ms: 10_000,
                rolling_window_ms: 10_000,
                rolling_buckets: 10,
                volume_threshold: 10,
                half_open_max_probes: 1,
            },
        );

        Self {
            jitter_min_ms: JITTER_MIN_MS,
            jitter_max_ms: JITTER_MAX_MS,
            breakers,
        }
    }
}

/// Settings for one circuit breaker.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Invocation timeout; a slower call counts as a failure.
    pub timeout_ms: u64,

    /// Failure percentage over the rolling window that trips the breaker.
    pub error_threshold_percentage: u8,

    /// Time spent Open before probing in Half-Open.
    pub reset_timeout_ms: u64,

    /// Length of the rolling statistics window.
    pub rolling_window_ms: u64,

    /// Number of buckets the window is divided into.
    pub rolling_buckets: u32,

    /// Minimum calls in the window before the error rate is evaluated.
    pub volume_threshold: u32,

    /// Concurrent probe calls allowed while Half-Open.
    pub half_open_max_probes: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 3_000,
            error_threshold_percentage: 50,
            reset_timeout_ms: 30_000,
            rolling_window_ms: 10_000,
            rolling_buckets: 10,
            volume_threshold: 0,
            half_open_max_probes: 1,
        }
    }
}

impl BreakerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn bucket_duration(&self) -> Duration {
        let buckets = u64::from(self.rolling_buckets.max(1));
        Duration::from_millis((self.rolling_window_ms / buckets).max(1))
    }
}

/// Concurrency ceiling for one route prefix.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BulkheadConfig {
    /// Path prefix the ceiling applies to (e.g., "/api/archive").
    pub route_prefix: String,

    /// Maximum in-flight requests.
    pub max_concurrent: usize,

    /// Informational per-route timeout; enforced by breakers, not here.
    #[serde(default = "default_bulkhead_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_bulkhead_timeout_ms() -> u64 {
    10_000
}

impl BulkheadConfig {
    pub fn new(route_prefix: impl Into<String>, max_concurrent: usize) -> Self {
        Self {
            route_prefix: route_prefix.into(),
            max_concurrent,
            timeout_ms: default_bulkhead_timeout_ms(),
        }
    }
}

/// Default ceilings for the public routes.
pub fn default_bulkheads() -> Vec<BulkheadConfig> {
    vec![
        BulkheadConfig::new("/api/articles", 50),
        BulkheadConfig::new("/api/top-stories", 50),
        BulkheadConfig::new("/api/archive", 10),
        BulkheadConfig::new("/api/books", 25),
        BulkheadConfig::new("/api/most-popular", 25),
        BulkheadConfig::new("/api/saved", 25),
    ]
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API under `/admin`.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

/// Placeholder key rejected by validation when the admin API is enabled.
pub const PLACEHOLDER_ADMIN_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: PLACEHOLDER_ADMIN_KEY.to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.resilience.breakers.len(), 3);
        assert!(config.cache.enabled);
        assert_eq!(config.bulkheads.len(), default_bulkheads().len());
    }

    #[test]
    fn test_breakers_keyed_by_dependency() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [resilience.breakers.external]
            timeout_ms = 2000
            error_threshold_percentage = 60

            [[bulkheads]]
            route_prefix = "/api/archive"
            max_concurrent = 2
            "#,
        )
        .unwrap();

        let external = &config.resilience.breakers[&Dependency::External];
        assert_eq!(external.timeout_ms, 2000);
        assert_eq!(external.error_threshold_percentage, 60);
        // Unspecified fields fall back to BreakerConfig defaults.
        assert_eq!(external.rolling_buckets, 10);
        assert_eq!(config.resilience.breakers.len(), 1);
        assert_eq!(config.bulkheads[0].timeout_ms, 10_000);
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let parsed: Result<GatewayConfig, _> =
            toml::from_str("[resilience.breakers.mainframe]\ntimeout_ms = 1\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_bucket_duration() {
        let cfg = BreakerConfig {
            rolling_window_ms: 10_000,
            rolling_buckets: 4,
            ..BreakerConfig::default()
        };
        assert_eq!(cfg.bucket_duration(), Duration::from_millis(2_500));
    }
}
