//! Distributed cache subsystem.
//!
//! # Data Flow
//! ```text
//! Cacheable read:
//!     → key.rs (build-scoped key from route + normalized params)
//!     → client.rs get (cache breaker guarded, fail-open)
//!         → backend.rs trait → redis.rs | memory.rs
//!     HIT  → etag.rs (derive tag from stored bytes)
//!     MISS → upstream → client.rs set + tag_attach
//!
//! Invalidation:
//!     → client.rs purge_by_tag | purge_pattern
//! ```
//!
//! # Design Decisions
//! - Values are stored as serialized JSON strings; ETags are derived from
//!   those exact bytes and never stored
//! - Cache failures degrade to misses, they never fail a request
//! - Redis when `cache.redis_url` is set, in-process map otherwise

pub mod backend;
pub mod client;
pub mod etag;
pub mod key;
pub mod memory;
pub mod redis;

use std::sync::Arc;

pub use backend::{CacheBackend, CacheError};
pub use client::CacheClient;
pub use key::{stable_hash, KeyBuilder};
pub use memory::MemoryBackend;
pub use self::redis::RedisBackend;

use crate::config::schema::CacheConfig;

/// Connect the backend selected by `config`.
pub async fn connect_backend(config: &CacheConfig) -> Result<Arc<dyn CacheBackend>, CacheError> {
    match &config.redis_url {
        Some(url) => Ok(Arc::new(RedisBackend::connect(url).await?)),
        None => {
            tracing::info!("No Redis URL configured, using in-process cache backend");
            Ok(Arc::new(MemoryBackend::new()))
        }
    }
}
