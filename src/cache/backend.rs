//! Key-value backend abstraction.
//!
//! The gateway only needs a small slice of a Redis-like protocol: string
//! get / set-with-expiry / delete plus set-membership add / read. Keeping
//! it behind a trait lets the same client run against Redis in
//! production and an in-process map in tests or single-node setups.

use std::time::Duration;

use async_trait::async_trait;

/// Error type for cache backend operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("cache unavailable (circuit open)")]
    Unavailable,
}

impl From<::redis::RedisError> for CacheError {
    fn from(err: ::redis::RedisError) -> Self {
        CacheError::Backend(err.to_string())
    }
}

/// Operations the cache client needs from a remote key-value service.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short name for logs (`redis`, `memory`).
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Delete keys, returning how many existed.
    async fn del(&self, keys: &[String]) -> Result<usize, CacheError>;

    async fn sadd(&self, set: &str, members: &[String]) -> Result<(), CacheError>;

    async fn smembers(&self, set: &str) -> Result<Vec<String>, CacheError>;

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Keys matching a glob pattern (`*` wildcard only).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError>;
}
