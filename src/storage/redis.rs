use crate::error::TokenError;
use crate::metrics;
use crate::storage::CacheStore;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;

/// Redis-backed [`CacheStore`] with per-call timeouts.
pub struct RedisStore {
    conn: Arc<RwLock<ConnectionManager>>,
    timeout: Duration,
}

impl RedisStore {
    /// Connect to Redis at `redis_url`. Every subsequent call is bounded
    /// by `call_timeout`.
    ///
    /// # Errors
    ///
    /// Returns a store error if the connection cannot be established.
    pub async fn connect(redis_url: &str, call_timeout: Duration) -> Result<Self, TokenError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| TokenError::store(e.to_string()))?;

        let conn = timeout(call_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| TokenError::timeout("redis connect".to_string()))?
            .map_err(|e| TokenError::store(e.to_string()))?;

        Ok(RedisStore {
            conn: Arc::new(RwLock::new(conn)),
            timeout: call_timeout,
        })
    }

    fn record<T>(operation: &str, result: &Result<T, TokenError>) {
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::record_store_operation(operation, status);
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TokenError> {
        let mut conn = self.conn.write().await;
        let result = match timeout(self.timeout, conn.get::<_, Option<Vec<u8>>>(key)).await {
            Ok(inner) => inner.map_err(TokenError::from),
            Err(_) => Err(TokenError::timeout(format!("get {}", key))),
        };
        Self::record("get", &result);
        result
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), TokenError> {
        let mut conn = self.conn.write().await;
        let result = match ttl {
            Some(ttl) => {
                let secs = ttl.as_secs().max(1);
                match timeout(self.timeout, conn.set_ex::<_, _, ()>(key, value, secs)).await {
                    Ok(inner) => inner.map_err(TokenError::from),
                    Err(_) => Err(TokenError::timeout(format!("set {}", key))),
                }
            }
            None => match timeout(self.timeout, conn.set::<_, _, ()>(key, value)).await {
                Ok(inner) => inner.map_err(TokenError::from),
                Err(_) => Err(TokenError::timeout(format!("set {}", key))),
            },
        };
        Self::record("set", &result);
        result
    }

    async fn delete(&self, key: &str) -> Result<(), TokenError> {
        let mut conn = self.conn.write().await;
        let result = match timeout(self.timeout, conn.del::<_, ()>(key)).await {
            Ok(inner) => inner.map_err(TokenError::from),
            Err(_) => Err(TokenError::timeout(format!("del {}", key))),
        };
        Self::record("delete", &result);
        result
    }

    async fn exists(&self, key: &str) -> Result<bool, TokenError> {
        let mut conn = self.conn.write().await;
        let result = match timeout(self.timeout, conn.exists::<_, bool>(key)).await {
            Ok(inner) => inner.map_err(TokenError::from),
            Err(_) => Err(TokenError::timeout(format!("exists {}", key))),
        };
        Self::record("exists", &result);
        result
    }

    async fn get_many(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, Vec<u8>>, TokenError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let mut conn = self.conn.write().await;
        let result = match timeout(
            self.timeout,
            conn.mget::<_, Vec<Option<Vec<u8>>>>(keys),
        )
        .await
        {
            Ok(inner) => inner.map_err(TokenError::from).map(|values| {
                keys.iter()
                    .cloned()
                    .zip(values)
                    .filter_map(|(key, value)| value.map(|v| (key, v)))
                    .collect()
            }),
            Err(_) => Err(TokenError::timeout("mget".to_string())),
        };
        Self::record("get_many", &result);
        result
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64, TokenError> {
        let mut conn = self.conn.write().await;
        let result = match timeout(self.timeout, conn.incr::<_, _, i64>(key, by)).await {
            Ok(inner) => inner.map_err(TokenError::from),
            Err(_) => Err(TokenError::timeout(format!("incr {}", key))),
        };
        Self::record("increment", &result);
        result
    }
}
