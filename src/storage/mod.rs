//! Shared key-value store access.
//!
//! Every stateful component coordinates through the [`CacheStore`]
//! capability set: get, set-with-TTL, delete, exists, batched get, and
//! atomic increment. The store's own replication, persistence, and
//! eviction are out of scope; the only assumption is that a value
//! survives for at least the requested TTL, best-effort.

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

use crate::error::TokenError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Minimal capability set consumed from the shared store.
///
/// All operations are bounded by the implementation's configured
/// timeout; a timed-out call surfaces as `TokenError::Timeout` so the
/// caller can apply its fail-secure or fail-open policy.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a value by key.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TokenError>;

    /// Store a value, optionally expiring after `ttl`.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>)
        -> Result<(), TokenError>;

    /// Remove a key. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), TokenError>;

    /// Check whether a key is present and unexpired.
    async fn exists(&self, key: &str) -> Result<bool, TokenError>;

    /// Fetch several keys at once; absent keys are omitted from the map.
    async fn get_many(&self, keys: &[String])
        -> Result<HashMap<String, Vec<u8>>, TokenError>;

    /// Atomically add `by` to the integer stored at `key`, creating it
    /// at zero when absent, and return the new value.
    async fn increment(&self, key: &str, by: i64) -> Result<i64, TokenError>;
}
