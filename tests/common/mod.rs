//! Shared test fixtures.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use token_guard::error::TokenError;
use token_guard::storage::{CacheStore, MemoryStore};

/// A store that can be taken offline to simulate an outage.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    offline: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn restore(&self) {
        self.offline.store(false, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), TokenError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(TokenError::store("simulated outage"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TokenError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), TokenError> {
        self.check()?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), TokenError> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, TokenError> {
        self.check()?;
        self.inner.exists(key).await
    }

    async fn get_many(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, Vec<u8>>, TokenError> {
        self.check()?;
        self.inner.get_many(keys).await
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64, TokenError> {
        self.check()?;
        self.inner.increment(key, by).await
    }
}

/// Install a test subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_test_writer()
        .try_init();
}
