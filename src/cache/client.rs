//! Fail-open cache client.
//!
//! # Responsibilities
//! - Read and write JSON payloads under build-scoped keys
//! - Maintain tag → key sets for group invalidation
//! - Absorb every backend failure (a broken cache is a slow cache, never
//!   a failed request)
//!
//! # Design Decisions
//! - Every backend call runs under the `cache` circuit breaker when one
//!   is attached; a short-circuited call is a miss or a failed write
//! - Tag purge is read-members, delete-members, delete-set. Not atomic:
//!   a key attached between the read and the set deletion survives until
//!   its own TTL

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::backend::{CacheBackend, CacheError};
use crate::cache::key::KeyBuilder;
use crate::config::schema::CacheConfig;
use crate::observability::metrics;
use crate::resilience::{BreakerError, CircuitBreaker};

/// Cache client shared by all handlers.
#[derive(Clone)]
pub struct CacheClient {
    backend: Arc<dyn CacheBackend>,
    keys: KeyBuilder,
    breaker: Option<Arc<CircuitBreaker>>,
    tag_ttl: Duration,
    enabled: bool,
}

impl std::fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheClient")
            .field("backend", &self.backend.name())
            .field("keys", &self.keys)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl CacheClient {
    pub fn new(backend: Arc<dyn CacheBackend>, config: &CacheConfig) -> Self {
        Self {
            backend,
            keys: KeyBuilder::new(&config.build_id, &config.namespace),
            breaker: None,
            tag_ttl: Duration::from_secs(config.tag_ttl_secs),
            enabled: config.enabled,
        }
    }

    /// Guard backend calls with `breaker`.
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn keys(&self) -> &KeyBuilder {
        &self.keys
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn guarded<T, F, Fut>(&self, op: F) -> Result<T, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CacheError>>,
    {
        let Some(breaker) = &self.breaker else {
            return op().await;
        };
        breaker.call(op).await.map_err(|e| match e {
            BreakerError::Open { .. } => CacheError::Unavailable,
            BreakerError::Timeout(d) => CacheError::Timeout(d),
            BreakerError::Failed(inner) => inner,
        })
    }

    /// Raw string value for `key`; any failure is a miss.
    pub async fn get_raw(&self, key: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }
        match self.guarded(|| self.backend.get(key)).await {
            Ok(Some(value)) => {
                metrics::record_cache("get", "hit");
                Some(value)
            }
            Ok(None) => {
                metrics::record_cache("get", "miss");
                None
            }
            Err(e) => {
                metrics::record_cache("get", "error");
                tracing::warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Store a raw string with `ttl`. Returns `false` on any failure.
    pub async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> bool {
        if !self.enabled {
            return false;
        }
        match self.guarded(|| self.backend.set_ex(key, value, ttl)).await {
            Ok(()) => {
                metrics::record_cache("set", "stored");
                tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "Cache entry stored");
                true
            }
            Err(e) => {
                metrics::record_cache("set", "error");
                tracing::warn!(key = %key, error = %e, "Cache write failed");
                false
            }
        }
    }

    /// Delete one key. Returns `true` when the backend acknowledged.
    pub async fn delete(&self, key: &str) -> bool {
        let keys = [key.to_string()];
        match self.guarded(|| self.backend.del(&keys)).await {
            Ok(_) => {
                metrics::record_cache("delete", "deleted");
                true
            }
            Err(e) => {
                metrics::record_cache("delete", "error");
                tracing::warn!(key = %key, error = %e, "Cache delete failed");
                false
            }
        }
    }

    /// Add `keys` to the set for `tag` and refresh the set's expiry.
    pub async fn tag_attach(&self, tag: &str, keys: &[String]) -> bool {
        if !self.enabled || keys.is_empty() {
            return false;
        }
        let set = self.keys.tag_key(tag);
        let result = self
            .guarded(|| async {
                self.backend.sadd(&set, keys).await?;
                self.backend.expire(&set, self.tag_ttl).await
            })
            .await;
        match result {
            Ok(()) => true,
            Err(e) => {
                metrics::record_cache("tag", "error");
                tracing::warn!(tag = %tag, error = %e, "Cache tag attach failed");
                false
            }
        }
    }

    /// Delete every key attached to `tag`, then the tag set itself.
    /// Returns the number of member keys removed.
    pub async fn purge_by_tag(&self, tag: &str) -> usize {
        let set = self.keys.tag_key(tag);
        let result = self
            .guarded(|| async {
                let members = self.backend.smembers(&set).await?;
                let removed = self.backend.del(&members).await?;
                self.backend.del(std::slice::from_ref(&set)).await?;
                Ok(removed)
            })
            .await;
        match result {
            Ok(removed) => {
                metrics::record_cache("purge", "purged");
                tracing::info!(tag = %tag, removed, "Cache tag purged");
                removed
            }
            Err(e) => {
                metrics::record_cache("purge", "error");
                tracing::warn!(tag = %tag, error = %e, "Cache tag purge failed");
                0
            }
        }
    }

    /// Delete every key of this build matching `pattern` (`*` wildcard).
    /// The build id is always prepended so other deployments are never
    /// touched.
    pub async fn purge_pattern(&self, pattern: &str) -> usize {
        let scoped = self.keys.scoped_pattern(pattern);
        let result = self
            .guarded(|| async {
                let keys = self.backend.keys(&scoped).await?;
                self.backend.del(&keys).await
            })
            .await;
        match result {
            Ok(removed) => {
                metrics::record_cache("purge", "purged");
                tracing::info!(pattern = %scoped, removed, "Cache pattern purged");
                removed
            }
            Err(e) => {
                metrics::record_cache("purge", "error");
                tracing::warn!(pattern = %scoped, error = %e, "Cache pattern purge failed");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::cache::memory::MemoryBackend;
    use crate::config::schema::BreakerConfig;
    use crate::resilience::{CircuitState, Dependency};

    fn config() -> CacheConfig {
        CacheConfig {
            build_id: "b1".to_string(),
            ..CacheConfig::default()
        }
    }

    fn client() -> (CacheClient, MemoryBackend) {
        let backend = MemoryBackend::new();
        (CacheClient::new(Arc::new(backend.clone()), &config()), backend)
    }

    /// Backend whose every call fails.
    #[derive(Default)]
    struct FailingBackend {
        calls: AtomicUsize,
    }

    impl FailingBackend {
        fn fail<T>(&self) -> Result<T, CacheError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CacheError::Backend("connection refused".into()))
        }
    }

    #[async_trait]
    impl CacheBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }
        async fn get(&self, _: &str) -> Result<Option<String>, CacheError> {
            self.fail()
        }
        async fn set_ex(&self, _: &str, _: String, _: Duration) -> Result<(), CacheError> {
            self.fail()
        }
        async fn del(&self, _: &[String]) -> Result<usize, CacheError> {
            self.fail()
        }
        async fn sadd(&self, _: &str, _: &[String]) -> Result<(), CacheError> {
            self.fail()
        }
        async fn smembers(&self, _: &str) -> Result<Vec<String>, CacheError> {
            self.fail()
        }
        async fn expire(&self, _: &str, _: Duration) -> Result<(), CacheError> {
            self.fail()
        }
        async fn keys(&self, _: &str) -> Result<Vec<String>, CacheError> {
            self.fail()
        }
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (cache, _) = client();
        let key = cache.keys().request_key("search", &json!({"q": "rust"}));
        let body = json!({"docs": [1, 2]}).to_string();
        assert!(cache.set_raw(&key, body.clone(), Duration::from_secs(60)).await);

        assert_eq!(cache.get_raw(&key).await, Some(body));
        assert!(cache.delete(&key).await);
        assert!(cache.get_raw(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_purge_by_tag_removes_members_and_set() {
        let (cache, backend) = client();
        let ttl = Duration::from_secs(60);
        let k1 = cache.keys().ckey(&["nyt", "top-stories", "a"]);
        let k2 = cache.keys().ckey(&["nyt", "top-stories", "b"]);
        let other = cache.keys().ckey(&["nyt", "books", "c"]);
        for k in [&k1, &k2, &other] {
            assert!(cache.set_raw(k, "{}".into(), ttl).await);
        }
        assert!(cache.tag_attach("top-stories", &[k1.clone(), k2.clone()]).await);

        assert_eq!(cache.purge_by_tag("top-stories").await, 2);
        assert!(cache.get_raw(&k1).await.is_none());
        assert!(cache.get_raw(&k2).await.is_none());
        assert!(cache.get_raw(&other).await.is_some());
        assert!(backend.smembers("b1:tag:top-stories").await.unwrap().is_empty());

        // Purging an unknown tag is a no-op.
        assert_eq!(cache.purge_by_tag("top-stories").await, 0);
    }

    #[tokio::test]
    async fn test_tag_membership_accumulates_across_attaches() {
        let (cache, _) = client();
        let ttl = Duration::from_secs(60);
        let k1 = cache.keys().request_key("articles", &json!({"q": "mars"}));
        let k2 = cache.keys().request_key("articles", &json!({"q": "venus"}));
        cache.set_raw(&k1, "{}".into(), ttl).await;
        cache.set_raw(&k2, "{}".into(), ttl).await;

        assert!(cache.tag_attach("articles", std::slice::from_ref(&k1)).await);
        assert!(cache.tag_attach("articles", std::slice::from_ref(&k2)).await);

        assert_eq!(cache.purge_by_tag("articles").await, 2);
        assert!(cache.get_raw(&k1).await.is_none());
        assert!(cache.get_raw(&k2).await.is_none());
    }

    #[tokio::test]
    async fn test_purge_pattern_is_build_scoped() {
        let (cache, backend) = client();
        let ttl = Duration::from_secs(60);
        backend.set_ex("b0:nyt:archive:x", "{}".into(), ttl).await.unwrap();
        let ours = cache.keys().ckey(&["nyt", "archive", "y"]);
        cache.set_raw(&ours, "{}".into(), ttl).await;

        assert_eq!(cache.purge_pattern("nyt:archive:*").await, 1);
        assert!(backend.get("b0:nyt:archive:x").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_backend_failures_are_absorbed() {
        let cache = CacheClient::new(Arc::new(FailingBackend::default()), &config());
        assert!(cache.get_raw("k").await.is_none());
        assert!(!cache.set_raw("k", "v".into(), Duration::from_secs(1)).await);
        assert!(!cache.delete("k").await);
        assert!(!cache.tag_attach("t", &["k".into()]).await);
        assert_eq!(cache.purge_by_tag("t").await, 0);
        assert_eq!(cache.purge_pattern("*").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_skips_backend() {
        let backend = Arc::new(FailingBackend::default());
        let breaker = Arc::new(CircuitBreaker::new(
            Dependency::Cache,
            BreakerConfig {
                volume_threshold: 2,
                ..BreakerConfig::default()
            },
        ));
        let cache = CacheClient::new(backend.clone(), &config()).with_breaker(breaker.clone());

        cache.get_raw("k").await;
        cache.get_raw("k").await;
        assert_eq!(breaker.state(), CircuitState::Open);

        assert!(cache.get_raw("k").await.is_none());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_cache_never_touches_backend() {
        let backend = Arc::new(FailingBackend::default());
        let cfg = CacheConfig {
            enabled: false,
            ..config()
        };
        let cache = CacheClient::new(backend.clone(), &cfg);
        assert!(cache.get_raw("k").await.is_none());
        assert!(!cache.set_raw("k", "v".into(), Duration::from_secs(1)).await);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }
}
