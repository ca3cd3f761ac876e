//! Revocation ledger for token identifiers.
//!
//! Entries carry a TTL bounded by the revoked token's own remaining
//! lifetime plus a safety buffer, so the ledger is self-bounding: the
//! store expires entries no later than the tokens would have expired
//! naturally.
//!
//! Lookups fail secure: when the store cannot be reached, a token is
//! reported revoked. An authorization system must prefer rejecting a
//! valid token over accepting a revoked one when it cannot determine
//! the truth.

use crate::error::TokenError;
use crate::metrics;
use crate::storage::CacheStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

const ENTRY_PREFIX: &str = "revoked:";
const REVOCATIONS_COUNTER: &str = "blacklist:revocations_total";

/// A recorded revocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlacklistEntry {
    /// Revoked token identifier.
    pub jti: String,
    /// When the revocation was recorded.
    pub blacklisted_at: DateTime<Utc>,
    /// TTL the entry was stored with, in seconds.
    pub ttl_seconds: u64,
    /// Why the token was revoked.
    pub reason: String,
}

/// Result of a revocation lookup.
#[derive(Debug, Clone)]
pub struct RevocationCheck {
    /// Whether the token must be treated as revoked.
    pub revoked: bool,
    /// The ledger record, when one was readable.
    pub entry: Option<BlacklistEntry>,
    /// True when the store was unreachable and the answer is the
    /// fail-secure default rather than ledger state.
    pub degraded: bool,
}

/// A batch revocation request.
#[derive(Debug, Clone)]
pub struct RevocationRequest {
    /// Token identifier to revoke.
    pub jti: String,
    /// Entry TTL; callers derive it from the token's remaining lifetime
    /// plus the safety buffer.
    pub ttl: Duration,
    /// Revocation reason.
    pub reason: String,
}

/// Ledger statistics for the administrative surface.
#[derive(Debug, Clone)]
pub struct BlacklistStats {
    /// Revocations recorded across all instances, cumulative.
    pub revocations_total: i64,
}

/// Records and answers revocation queries against the shared store.
#[derive(Clone)]
pub struct BlacklistLedger {
    store: Arc<dyn CacheStore>,
}

impl BlacklistLedger {
    /// Create a ledger over the shared cache.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Record `jti` as revoked for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns a store error when the entry could not be written; the
    /// token is then still considered live, so callers should surface
    /// the failure.
    pub async fn revoke(
        &self,
        jti: &str,
        ttl: Duration,
        reason: &str,
    ) -> Result<(), TokenError> {
        let entry = BlacklistEntry {
            jti: jti.to_string(),
            blacklisted_at: Utc::now(),
            ttl_seconds: ttl.as_secs(),
            reason: reason.to_string(),
        };
        let value = serde_json::to_vec(&entry)?;

        self.store
            .set(&Self::entry_key(jti), &value, Some(ttl))
            .await?;

        // The cumulative counter is best-effort; losing an increment
        // must not fail the revocation itself.
        if let Err(e) = self.store.increment(REVOCATIONS_COUNTER, 1).await {
            warn!(error = %e, "Failed to bump revocation counter");
        }

        metrics::record_token_revoked(reason);
        Ok(())
    }

    /// Answer whether `jti` is revoked. Fails secure: a store outage
    /// reports the token as revoked.
    pub async fn is_revoked(&self, jti: &str) -> RevocationCheck {
        match self.store.get(&Self::entry_key(jti)).await {
            Ok(Some(data)) => {
                let entry = serde_json::from_slice(&data).ok();
                RevocationCheck {
                    revoked: true,
                    entry,
                    degraded: false,
                }
            }
            Ok(None) => RevocationCheck {
                revoked: false,
                entry: None,
                degraded: false,
            },
            Err(e) => {
                error!(
                    jti = %jti,
                    error = %e,
                    fail_secure = true,
                    "Revocation lookup failed; treating token as revoked"
                );
                RevocationCheck {
                    revoked: true,
                    entry: None,
                    degraded: true,
                }
            }
        }
    }

    /// Revoke a batch of tokens. Failures are reported per entry, not
    /// as an all-or-nothing transaction.
    pub async fn bulk_revoke(
        &self,
        requests: &[RevocationRequest],
    ) -> Vec<Result<(), TokenError>> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(
                self.revoke(&request.jti, request.ttl, &request.reason)
                    .await,
            );
        }
        results
    }

    /// Bulk revocation lookup. Absent entries are reported not-revoked;
    /// a store outage fails secure for every queried identifier.
    pub async fn bulk_status(&self, jtis: &[String]) -> HashMap<String, bool> {
        let keys: Vec<String> = jtis.iter().map(|jti| Self::entry_key(jti)).collect();
        match self.store.get_many(&keys).await {
            Ok(found) => jtis
                .iter()
                .map(|jti| (jti.clone(), found.contains_key(&Self::entry_key(jti))))
                .collect(),
            Err(e) => {
                error!(error = %e, fail_secure = true, "Bulk revocation lookup failed");
                jtis.iter().map(|jti| (jti.clone(), true)).collect()
            }
        }
    }

    /// Administrative unrevoke: remove a ledger entry before the store
    /// would have expired it.
    ///
    /// # Errors
    ///
    /// Returns a store error when the delete could not be performed.
    pub async fn remove(&self, jti: &str) -> Result<(), TokenError> {
        self.store.delete(&Self::entry_key(jti)).await
    }

    /// Ledger statistics.
    ///
    /// # Errors
    ///
    /// Returns a store error when the counter could not be read.
    pub async fn stats(&self) -> Result<BlacklistStats, TokenError> {
        let revocations_total = self.store.increment(REVOCATIONS_COUNTER, 0).await?;
        Ok(BlacklistStats { revocations_total })
    }

    fn entry_key(jti: &str) -> String {
        format!("{}{}", ENTRY_PREFIX, jti)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn ledger() -> BlacklistLedger {
        BlacklistLedger::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_revoke_and_lookup() {
        let ledger = ledger();

        let before = ledger.is_revoked("jti-1").await;
        assert!(!before.revoked);
        assert!(!before.degraded);

        ledger
            .revoke("jti-1", Duration::from_secs(600), "logout")
            .await
            .unwrap();

        let after = ledger.is_revoked("jti-1").await;
        assert!(after.revoked);
        assert!(!after.degraded);
        let entry = after.entry.unwrap();
        assert_eq!(entry.jti, "jti-1");
        assert_eq!(entry.reason, "logout");
        assert_eq!(entry.ttl_seconds, 600);
    }

    #[tokio::test]
    async fn test_entry_expires_with_ttl() {
        let ledger = ledger();
        ledger
            .revoke("jti-short", Duration::from_millis(1), "test")
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!ledger.is_revoked("jti-short").await.revoked);
    }

    #[tokio::test]
    async fn test_administrative_remove() {
        let ledger = ledger();
        ledger
            .revoke("jti-2", Duration::from_secs(600), "mistake")
            .await
            .unwrap();
        assert!(ledger.is_revoked("jti-2").await.revoked);

        ledger.remove("jti-2").await.unwrap();
        assert!(!ledger.is_revoked("jti-2").await.revoked);
    }

    #[tokio::test]
    async fn test_bulk_revoke_reports_per_entry() {
        let ledger = ledger();
        let requests = vec![
            RevocationRequest {
                jti: "a".to_string(),
                ttl: Duration::from_secs(60),
                reason: "compromise".to_string(),
            },
            RevocationRequest {
                jti: "b".to_string(),
                ttl: Duration::from_secs(60),
                reason: "compromise".to_string(),
            },
        ];

        let results = ledger.bulk_revoke(&requests).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(Result::is_ok));
        assert!(ledger.is_revoked("a").await.revoked);
        assert!(ledger.is_revoked("b").await.revoked);
    }

    #[tokio::test]
    async fn test_bulk_status() {
        let ledger = ledger();
        ledger
            .revoke("x", Duration::from_secs(60), "test")
            .await
            .unwrap();

        let status = ledger
            .bulk_status(&["x".to_string(), "y".to_string()])
            .await;
        assert_eq!(status.get("x"), Some(&true));
        assert_eq!(status.get("y"), Some(&false));
    }

    #[tokio::test]
    async fn test_stats_counts_revocations() {
        let ledger = ledger();
        ledger
            .revoke("s1", Duration::from_secs(60), "test")
            .await
            .unwrap();
        ledger
            .revoke("s2", Duration::from_secs(60), "test")
            .await
            .unwrap();

        let stats = ledger.stats().await.unwrap();
        assert_eq!(stats.revocations_total, 2);
    }
}
