//! In-process cache backend.
//!
//! Mirrors the subset of Redis semantics the gateway relies on: values and
//! sets share one keyspace, expiry is per key and evaluated lazily on
//! access.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::cache::backend::{CacheBackend, CacheError};

#[derive(Debug, Clone)]
enum Stored {
    Value(String),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Slot {
    stored: Stored,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A thread-safe in-memory key-value store.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<DashMap<String, Slot>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn live(&self, key: &str) -> Option<Slot> {
        let now = Instant::now();
        let slot = self.inner.get(key).map(|r| r.value().clone())?;
        if slot.is_expired(now) {
            self.inner.remove_if(key, |_, s| s.is_expired(now));
            return None;
        }
        Some(slot)
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self.live(key) {
            Some(Slot { stored: Stored::Value(v), .. }) => Ok(Some(v)),
            Some(_) => Err(CacheError::Backend(format!("key {key} holds a set"))),
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.inner.insert(
            key.to_string(),
            Slot {
                stored: Stored::Value(value),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<usize, CacheError> {
        let now = Instant::now();
        let removed = keys
            .iter()
            .filter_map(|k| self.inner.remove(k))
            .filter(|(_, slot)| !slot.is_expired(now))
            .count();
        Ok(removed)
    }

    async fn sadd(&self, set: &str, members: &[String]) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entry = self.inner.entry(set.to_string()).or_insert_with(|| Slot {
            stored: Stored::Set(HashSet::new()),
            expires_at: None,
        });
        if entry.is_expired(now) {
            *entry = Slot {
                stored: Stored::Set(HashSet::new()),
                expires_at: None,
            };
        }
        match &mut entry.stored {
            Stored::Set(existing) => {
                existing.extend(members.iter().cloned());
                Ok(())
            }
            Stored::Value(_) => Err(CacheError::Backend(format!("key {set} holds a value"))),
        }
    }

    async fn smembers(&self, set: &str) -> Result<Vec<String>, CacheError> {
        match self.live(set) {
            Some(Slot { stored: Stored::Set(members), .. }) => Ok(members.into_iter().collect()),
            Some(_) => Err(CacheError::Backend(format!("key {set} holds a value"))),
            None => Ok(Vec::new()),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        if let Some(mut slot) = self.inner.get_mut(key) {
            slot.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let now = Instant::now();
        Ok(self
            .inner
            .iter()
            .filter(|r| !r.value().is_expired(now) && glob_match(pattern, r.key()))
            .map(|r| r.key().clone())
            .collect())
    }
}

/// Match `text` against a pattern where `*` matches any run of characters.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let mut rest = text;
    let last = parts.len() - 1;
    for (i, part) in parts.iter().enumerate() {
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == last {
            return rest.ends_with(part);
        } else if let Some(pos) = rest.find(part) {
            rest = &rest[pos + part.len()..];
        } else {
            return false;
        }
    }
    true
}
