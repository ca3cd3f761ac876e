//! Persistence of the signing key set.
//!
//! The whole key collection is written as one document so concurrent
//! verifiers observe either the full pre-rotation or the full
//! post-rotation set, never a partial one.

use crate::error::TokenError;
use crate::keys::material::PersistedKey;
use crate::storage::CacheStore;
use std::sync::Arc;

const KEY_SET_KEY: &str = "keys:signing";

/// Data access for signing key material. No lifecycle policy lives
/// here; that is the rotation manager's job.
#[derive(Clone)]
pub struct KeyStore {
    store: Arc<dyn CacheStore>,
}

impl KeyStore {
    /// Create a key store over the shared cache.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Load the persisted key set, if any.
    ///
    /// # Errors
    ///
    /// Returns a store error when the shared store is unreachable, or a
    /// serialization error when the document is corrupt.
    pub async fn load(&self) -> Result<Option<Vec<PersistedKey>>, TokenError> {
        match self.store.get(KEY_SET_KEY).await? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// Persist the full key set as one document. Key material never
    /// expires on its own; pruning is an explicit rewrite.
    ///
    /// # Errors
    ///
    /// Returns a store error when the shared store is unreachable.
    pub async fn save(&self, keys: &[PersistedKey]) -> Result<(), TokenError> {
        let document = serde_json::to_vec(keys)?;
        self.store.set(KEY_SET_KEY, &document, None).await
    }
}
