//! Sliding-window rate limiting over the shared store.
//!
//! Each `(identifier, action)` key holds the timestamps of requests
//! inside the trailing window, pruned lazily on every check. The
//! boundary rule is conservative: a timestamp exactly at the cutoff
//! still counts as inside the window, favoring denial over admission.
//!
//! Checks fail open: when the store cannot be reached the request is
//! admitted with a degraded marker, so an infrastructure outage does
//! not become a full authentication outage. This is the deliberate
//! inverse of the revocation ledger's fail-secure policy.

use crate::error::TokenError;
use crate::metrics;
use crate::storage::CacheStore;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::error;

const WINDOW_PREFIX: &str = "ratelimit:";
const DENIALS_COUNTER: &str = "ratelimit:denials_total";

// Bound on the per-key lock map before idle locks are swept.
const MAX_TRACKED_LOCKS: usize = 4096;

/// Limits for one class of action.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Requests admitted per window.
    pub max_requests: u32,
    /// Trailing window length.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
        }
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    /// Whether the request is admitted.
    pub allowed: bool,
    /// The configured limit.
    pub limit: u32,
    /// Requests left in the current window after this decision.
    pub remaining: u32,
    /// How long a denied caller should wait before retrying.
    pub retry_after: Option<Duration>,
    /// Time until the oldest recorded request leaves the window.
    pub reset_after: Duration,
    /// True when the store was unreachable and the request was admitted
    /// by the fail-open policy rather than by count.
    pub degraded: bool,
}

impl RateLimitDecision {
    fn fail_open(limit: u32) -> Self {
        Self {
            allowed: true,
            limit,
            remaining: limit,
            retry_after: None,
            reset_after: Duration::ZERO,
            degraded: true,
        }
    }
}

/// Rate limiter statistics for the administrative surface.
#[derive(Debug, Clone)]
pub struct RateLimitStats {
    /// Denials recorded across all instances, cumulative.
    pub denials_total: i64,
}

/// Sliding-window admission control keyed by `(identifier, action)`.
pub struct RateLimiter {
    store: Arc<dyn CacheStore>,
    // Serializes window updates per key within this instance; the
    // window itself lives in a single store value.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RateLimiter {
    /// Create a limiter over the shared cache.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Check and record a request for `(identifier, action)`.
    pub async fn check(
        &self,
        identifier: &str,
        action: &str,
        config: &RateLimitConfig,
    ) -> RateLimitDecision {
        let key = Self::window_key(identifier, action);
        let key_lock = self.key_lock(&key).await;
        let _guard = key_lock.lock().await;

        let now_ms = Utc::now().timestamp_millis();
        let window_ms = config.window.as_millis() as i64;
        let cutoff = now_ms - window_ms;

        let mut window: Vec<i64> = match self.store.get(&key).await {
            Ok(Some(data)) => serde_json::from_slice(&data).unwrap_or_default(),
            Ok(None) => Vec::new(),
            Err(e) => {
                error!(
                    action = %action,
                    error = %e,
                    fail_open = true,
                    "Rate limit window read failed; admitting request"
                );
                metrics::record_rate_limit_check("degraded");
                return RateLimitDecision::fail_open(config.max_requests);
            }
        };

        // Strictly-older timestamps leave the window; one equal to the
        // cutoff is still inside.
        window.retain(|&ts| ts >= cutoff);

        if (window.len() as u32) < config.max_requests {
            window.push(now_ms);
            let document = match serde_json::to_vec(&window) {
                Ok(doc) => doc,
                Err(e) => {
                    error!(action = %action, error = %e, fail_open = true, "Window serialization failed");
                    metrics::record_rate_limit_check("degraded");
                    return RateLimitDecision::fail_open(config.max_requests);
                }
            };
            if let Err(e) = self.store.set(&key, &document, Some(config.window)).await {
                error!(
                    action = %action,
                    error = %e,
                    fail_open = true,
                    "Rate limit window write failed; admitting request"
                );
                metrics::record_rate_limit_check("degraded");
                return RateLimitDecision::fail_open(config.max_requests);
            }

            metrics::record_rate_limit_check("allowed");
            let oldest = window.first().copied().unwrap_or(now_ms);
            RateLimitDecision {
                allowed: true,
                limit: config.max_requests,
                remaining: config.max_requests - window.len() as u32,
                retry_after: None,
                reset_after: Self::until_exit(oldest, window_ms, now_ms),
                degraded: false,
            }
        } else {
            if let Err(e) = self.store.increment(DENIALS_COUNTER, 1).await {
                error!(action = %action, error = %e, "Failed to bump denial counter");
            }
            metrics::record_rate_limit_check("denied");

            let oldest = window.first().copied().unwrap_or(now_ms);
            let wait = Self::until_exit(oldest, window_ms, now_ms);
            RateLimitDecision {
                allowed: false,
                limit: config.max_requests,
                remaining: 0,
                retry_after: Some(wait),
                reset_after: wait,
                degraded: false,
            }
        }
    }

    /// Administrative clear for one `(identifier, action)` window, used
    /// for unblocking a legitimate user.
    ///
    /// # Errors
    ///
    /// Returns a store error when the window could not be deleted.
    pub async fn reset(&self, identifier: &str, action: &str) -> Result<(), TokenError> {
        self.store
            .delete(&Self::window_key(identifier, action))
            .await
    }

    /// Limiter statistics.
    ///
    /// # Errors
    ///
    /// Returns a store error when the counter could not be read.
    pub async fn stats(&self) -> Result<RateLimitStats, TokenError> {
        let denials_total = self.store.increment(DENIALS_COUNTER, 0).await?;
        Ok(RateLimitStats { denials_total })
    }

    /// Time until the oldest timestamp falls out of the window, floored
    /// at one second so callers always get a usable backoff.
    fn until_exit(oldest_ms: i64, window_ms: i64, now_ms: i64) -> Duration {
        let ms = (oldest_ms + window_ms - now_ms).max(1000);
        Duration::from_millis(ms as u64)
    }

    // Identifiers may be emails or IP addresses; store keys carry a
    // digest instead of the raw value.
    fn window_key(identifier: &str, action: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(identifier.as_bytes());
        format!("{}{:x}:{}", WINDOW_PREFIX, hasher.finalize(), action)
    }

    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        if locks.len() > MAX_TRACKED_LOCKS {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryStore::new()))
    }

    fn config(max: u32, window_secs: u64) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: max,
            window: Duration::from_secs(window_secs),
        }
    }

    #[tokio::test]
    async fn test_exactly_limit_requests_admitted() {
        let limiter = limiter();
        let cfg = config(3, 60);

        for i in 0..3 {
            let decision = limiter.check("ip1", "login", &cfg).await;
            assert!(decision.allowed, "request {} should be admitted", i);
            assert_eq!(decision.remaining, 2 - i);
            assert!(!decision.degraded);
        }

        let fourth = limiter.check("ip1", "login", &cfg).await;
        assert!(!fourth.allowed);
        assert_eq!(fourth.remaining, 0);
        let retry = fourth.retry_after.unwrap();
        assert!(retry <= Duration::from_secs(60));
        assert!(retry >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = limiter();
        let cfg = config(1, 60);

        assert!(limiter.check("ip1", "login", &cfg).await.allowed);
        assert!(!limiter.check("ip1", "login", &cfg).await.allowed);

        // Different identifier and different action both get their own
        // windows.
        assert!(limiter.check("ip2", "login", &cfg).await.allowed);
        assert!(limiter.check("ip1", "reset", &cfg).await.allowed);
    }

    #[tokio::test]
    async fn test_window_slides() {
        let limiter = limiter();
        let cfg = RateLimitConfig {
            max_requests: 1,
            window: Duration::from_millis(100),
        };

        assert!(limiter.check("ip1", "login", &cfg).await.allowed);
        assert!(!limiter.check("ip1", "login", &cfg).await.allowed);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(limiter.check("ip1", "login", &cfg).await.allowed);
    }

    #[tokio::test]
    async fn test_reset_clears_window() {
        let limiter = limiter();
        let cfg = config(1, 60);

        assert!(limiter.check("ip1", "login", &cfg).await.allowed);
        assert!(!limiter.check("ip1", "login", &cfg).await.allowed);

        limiter.reset("ip1", "login").await.unwrap();
        assert!(limiter.check("ip1", "login", &cfg).await.allowed);
    }

    #[tokio::test]
    async fn test_denials_counted_in_stats() {
        let limiter = limiter();
        let cfg = config(1, 60);

        limiter.check("ip1", "login", &cfg).await;
        limiter.check("ip1", "login", &cfg).await;
        limiter.check("ip1", "login", &cfg).await;

        let stats = limiter.stats().await.unwrap();
        assert_eq!(stats.denials_total, 2);
    }

    #[tokio::test]
    async fn test_concurrent_checks_never_exceed_limit() {
        let limiter = Arc::new(limiter());
        let cfg = config(5, 60);

        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.check("ip1", "login", &cfg).await.allowed
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
    }
}
