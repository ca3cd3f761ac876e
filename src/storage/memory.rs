//! In-memory store implementation.
//!
//! Used by tests and by degraded/local operation when no shared store
//! is reachable. Entries expire lazily on access.

use crate::error::TokenError;
use crate::storage::CacheStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Instant::now())
    }
}

/// Process-local [`CacheStore`] backed by a `HashMap`.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, including expired ones not yet
    /// swept.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// True when the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TokenError> {
        let map = self.inner.read().await;
        match map.get(key) {
            Some(entry) if !entry.is_expired() => Ok(Some(entry.value.clone())),
            _ => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), TokenError> {
        let mut map = self.inner.write().await;
        map.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), TokenError> {
        let mut map = self.inner.write().await;
        map.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, TokenError> {
        let map = self.inner.read().await;
        Ok(map.get(key).is_some_and(|entry| !entry.is_expired()))
    }

    async fn get_many(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, Vec<u8>>, TokenError> {
        let map = self.inner.read().await;
        let mut found = HashMap::new();
        for key in keys {
            if let Some(entry) = map.get(key) {
                if !entry.is_expired() {
                    found.insert(key.clone(), entry.value.clone());
                }
            }
        }
        Ok(found)
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64, TokenError> {
        let mut map = self.inner.write().await;
        let current = match map.get(key) {
            Some(entry) if !entry.is_expired() => std::str::from_utf8(&entry.value)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| {
                    TokenError::store(format!("value at {} is not an integer", key))
                })?,
            _ => 0,
        };
        let next = current + by;
        let expires_at = map.get(key).and_then(|e| e.expires_at);
        map.insert(
            key.to_string(),
            Entry {
                value: next.to_string().into_bytes(),
                expires_at,
            },
        );
        Ok(next)
    }
}
