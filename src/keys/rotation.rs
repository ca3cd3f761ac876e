//! Signing key lifecycle.
//!
//! Owns generation, activation, demotion, and pruning of signing keys.
//! Rotation is atomic from a verifier's perspective: the full key set
//! is persisted as one document before the in-memory view is swapped
//! under a single write lock.

use crate::error::TokenError;
use crate::jwks::Jwks;
use crate::keys::material::{KeyPair, KeyStatus, PersistedKey};
use crate::keys::store::KeyStore;
use crate::metrics;
use crate::storage::CacheStore;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Rotation statistics for the administrative surface.
#[derive(Debug, Clone)]
pub struct KeyRotationStats {
    /// Identifier of the current active key, if initialized.
    pub active_key_id: Option<String>,
    /// Total keys held (active + previous).
    pub total_keys: usize,
    /// Rotations performed by this instance.
    pub rotations: u64,
    /// True when the instance started without reaching the store and
    /// holds in-memory-only keys.
    pub degraded: bool,
}

/// Manages the signing key set.
///
/// The in-memory view is an ordered list: the active key first, then
/// previous keys newest-first. Readers clone the list under a read
/// lock, so a rotation in flight is invisible until its single swap.
pub struct KeyRotationManager {
    store: KeyStore,
    keys: RwLock<Vec<Arc<KeyPair>>>,
    retention: usize,
    key_bits: usize,
    rotations: AtomicU64,
    degraded: AtomicBool,
}

impl KeyRotationManager {
    /// Create an uninitialized manager. Call [`initialize`] before use.
    ///
    /// [`initialize`]: KeyRotationManager::initialize
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, retention: usize, key_bits: usize) -> Self {
        Self {
            store: KeyStore::new(store),
            keys: RwLock::new(Vec::new()),
            retention: retention.max(1),
            key_bits,
            rotations: AtomicU64::new(0),
            degraded: AtomicBool::new(false),
        }
    }

    /// Load persisted keys, generating a fresh active pair when none
    /// exist. Idempotent: repeated calls after the first success are
    /// no-ops.
    ///
    /// If the store is unreachable the manager still installs an
    /// in-memory pair so the service can start degraded; tokens issued
    /// during the outage are unverifiable by other instances.
    ///
    /// # Errors
    ///
    /// Returns an error only when key generation itself fails.
    pub async fn initialize(&self) -> Result<(), TokenError> {
        let mut guard = self.keys.write().await;
        if !guard.is_empty() {
            return Ok(());
        }

        match self.store.load().await {
            Ok(Some(persisted)) if !persisted.is_empty() => {
                *guard = Self::materialize(persisted)?;
                info!(
                    active_key_id = %guard[0].key_id,
                    total_keys = guard.len(),
                    "Loaded signing key set"
                );
            }
            Ok(_) => {
                let pair = Arc::new(KeyPair::generate(self.key_bits)?);
                if let Err(e) = self.store.save(&[pair.to_persisted()]).await {
                    error!(
                        error = %e,
                        degraded = true,
                        "Failed to persist initial signing key; continuing with in-memory key"
                    );
                    self.degraded.store(true, Ordering::Relaxed);
                }
                info!(key_id = %pair.key_id, "Generated initial signing key");
                *guard = vec![pair];
            }
            Err(e) if e.is_store_unavailable() => {
                error!(
                    error = %e,
                    degraded = true,
                    "Store unreachable during key initialization; starting with in-memory key"
                );
                let pair = Arc::new(KeyPair::generate(self.key_bits)?);
                self.degraded.store(true, Ordering::Relaxed);
                *guard = vec![pair];
            }
            Err(e) => {
                // Corrupt key-set document. Previous keys are lost, so
                // tokens signed before the corruption stop verifying.
                error!(error = %e, "Corrupt key-set document; regenerating signing key set");
                let pair = Arc::new(KeyPair::generate(self.key_bits)?);
                if let Err(save_err) = self.store.save(&[pair.to_persisted()]).await {
                    error!(error = %save_err, degraded = true, "Failed to persist regenerated key");
                    self.degraded.store(true, Ordering::Relaxed);
                }
                *guard = vec![pair];
            }
        }
        Ok(())
    }

    /// Generate a new active key, demote the current one, persist the
    /// full set, and prune past the retention count. Returns the new
    /// key id.
    ///
    /// # Errors
    ///
    /// Returns an error if generation fails or the set cannot be
    /// persisted; in both cases the previous key set stays in effect.
    pub async fn rotate(&self) -> Result<String, TokenError> {
        // Generated outside the lock; readers keep verifying meanwhile.
        let new_pair = Arc::new(KeyPair::generate(self.key_bits)?);

        let mut guard = self.keys.write().await;
        let mut next: Vec<Arc<KeyPair>> = Vec::with_capacity(guard.len() + 1);
        next.push(Arc::clone(&new_pair));
        for old in guard.iter() {
            next.push(Arc::new(old.demoted()));
        }
        next.truncate(self.retention);

        let persisted: Vec<PersistedKey> = next.iter().map(|k| k.to_persisted()).collect();
        self.store.save(&persisted).await?;

        let new_key_id = new_pair.key_id.clone();
        let retained = next.len();
        *guard = next;
        drop(guard);

        self.rotations.fetch_add(1, Ordering::Relaxed);
        metrics::record_key_rotation();
        info!(
            new_key_id = %new_key_id,
            retained_keys = retained,
            "Rotated signing key"
        );
        Ok(new_key_id)
    }

    /// The current active signing key, or `None` before initialization.
    pub async fn active_key(&self) -> Option<Arc<KeyPair>> {
        self.keys.read().await.first().cloned()
    }

    /// All keys usable for verification: active first, then previous
    /// keys newest-first. The list length is bounded by retention.
    pub async fn verification_keys(&self) -> Vec<Arc<KeyPair>> {
        self.keys.read().await.clone()
    }

    /// Render the public halves of all known keys.
    pub async fn jwks(&self) -> Jwks {
        let mut jwks = Jwks::new();
        for key in self.keys.read().await.iter() {
            jwks.add_key(key.to_jwk());
        }
        jwks
    }

    /// True when running on in-memory-only keys after a store outage.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Rotation statistics.
    pub async fn stats(&self) -> KeyRotationStats {
        let guard = self.keys.read().await;
        KeyRotationStats {
            active_key_id: guard.first().map(|k| k.key_id.clone()),
            total_keys: guard.len(),
            rotations: self.rotations.load(Ordering::Relaxed),
            degraded: self.is_degraded(),
        }
    }

    /// Rebuild the in-memory view from persisted keys: active first,
    /// previous keys newest-first. Repairs a set that lost its active
    /// marker by promoting the newest key.
    fn materialize(persisted: Vec<PersistedKey>) -> Result<Vec<Arc<KeyPair>>, TokenError> {
        let mut pairs = persisted
            .into_iter()
            .map(KeyPair::from_persisted)
            .collect::<Result<Vec<_>, _>>()?;

        pairs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        if let Some(active_pos) = pairs.iter().position(|k| k.status == KeyStatus::Active) {
            let active = pairs.remove(active_pos);
            let mut ordered = vec![Arc::new(active)];
            ordered.extend(pairs.into_iter().map(|k| Arc::new(k.demoted())));
            Ok(ordered)
        } else {
            warn!("Persisted key set has no active key; promoting the newest");
            let mut iter = pairs.into_iter();
            let newest = iter
                .next()
                .ok_or_else(|| TokenError::internal("empty key set"))?;
            let mut promoted = newest;
            promoted.status = KeyStatus::Active;
            let mut ordered = vec![Arc::new(promoted)];
            ordered.extend(iter.map(Arc::new));
            Ok(ordered)
        }
    }
}
