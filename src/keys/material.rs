//! Signing key material.
//!
//! Generates and reconstructs RSA signing key pairs. The private key
//! PEM is held zeroized in memory and never logged; the public half is
//! exportable as a JWK.

use crate::config::MIN_RSA_KEY_BITS;
use crate::error::TokenError;
use crate::jwks::Jwk;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Signing algorithm name, fixed for the whole key set.
pub const SIGNING_ALGORITHM: &str = "RS256";

/// Lifecycle status of a signing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    /// The key used to sign newly issued tokens. Exactly one at a time.
    Active,
    /// A retired key kept only to verify tokens signed before the last
    /// rotation.
    Previous,
}

/// Persisted form of a signing key, stored as part of the single
/// key-set document in the shared store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedKey {
    /// Key identifier.
    pub key_id: String,
    /// Lifecycle status.
    pub status: KeyStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// PKCS#8 PEM private key.
    pub private_key_pem: String,
    /// SPKI PEM public key.
    pub public_key_pem: String,
}

/// An RSA signing key pair with derived JWT keys.
#[derive(Clone)]
pub struct KeyPair {
    /// Key identifier, carried in the `kid` JWT header.
    pub key_id: String,
    /// Lifecycle status.
    pub status: KeyStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    private_key_pem: Zeroizing<String>,
    public_key_pem: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    modulus: Vec<u8>,
    exponent: Vec<u8>,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("key_id", &self.key_id)
            .field("status", &self.status)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generate a fresh Active key pair with a `bits`-sized modulus.
    ///
    /// # Errors
    ///
    /// Returns an error if `bits` is below the security threshold or
    /// generation fails.
    pub fn generate(bits: usize) -> Result<Self, TokenError> {
        if bits < MIN_RSA_KEY_BITS {
            return Err(TokenError::invalid_key(format!(
                "requested {} bit key, minimum is {}",
                bits, MIN_RSA_KEY_BITS
            )));
        }

        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| TokenError::key_generation(e.to_string()))?;
        let public_key = private_key.to_public_key();

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| TokenError::key_generation(e.to_string()))?;
        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| TokenError::key_generation(e.to_string()))?;

        Self::assemble(
            uuid::Uuid::new_v4().to_string(),
            KeyStatus::Active,
            Utc::now(),
            Zeroizing::new(private_pem.to_string()),
            public_pem,
            &public_key,
        )
    }

    /// Reconstruct a key pair from its persisted form.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM material is malformed or the modulus
    /// is below the security threshold.
    pub fn from_persisted(persisted: PersistedKey) -> Result<Self, TokenError> {
        let public_key = RsaPublicKey::from_public_key_pem(&persisted.public_key_pem)
            .map_err(|e| TokenError::invalid_key(e.to_string()))?;

        if public_key.size() * 8 < MIN_RSA_KEY_BITS {
            return Err(TokenError::invalid_key(format!(
                "persisted key {} has a {} bit modulus, minimum is {}",
                persisted.key_id,
                public_key.size() * 8,
                MIN_RSA_KEY_BITS
            )));
        }

        Self::assemble(
            persisted.key_id,
            persisted.status,
            persisted.created_at,
            Zeroizing::new(persisted.private_key_pem),
            persisted.public_key_pem,
            &public_key,
        )
    }

    fn assemble(
        key_id: String,
        status: KeyStatus,
        created_at: DateTime<Utc>,
        private_key_pem: Zeroizing<String>,
        public_key_pem: String,
        public_key: &RsaPublicKey,
    ) -> Result<Self, TokenError> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| TokenError::invalid_key(e.to_string()))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| TokenError::invalid_key(e.to_string()))?;

        Ok(Self {
            key_id,
            status,
            created_at,
            private_key_pem,
            public_key_pem,
            encoding_key,
            decoding_key,
            modulus: public_key.n().to_bytes_be(),
            exponent: public_key.e().to_bytes_be(),
        })
    }

    /// Encoding key for signing.
    #[must_use]
    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// Decoding key for verification.
    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// A copy of this key demoted to Previous status.
    #[must_use]
    pub fn demoted(&self) -> Self {
        let mut copy = self.clone();
        copy.status = KeyStatus::Previous;
        copy
    }

    /// Persisted form for the key-set document.
    #[must_use]
    pub fn to_persisted(&self) -> PersistedKey {
        PersistedKey {
            key_id: self.key_id.clone(),
            status: self.status,
            created_at: self.created_at,
            private_key_pem: self.private_key_pem.to_string(),
            public_key_pem: self.public_key_pem.clone(),
        }
    }

    /// Export the public half as a JWK.
    #[must_use]
    pub fn to_jwk(&self) -> Jwk {
        Jwk {
            kty: "RSA".to_string(),
            kid: self.key_id.clone(),
            key_use: "sig".to_string(),
            alg: SIGNING_ALGORITHM.to_string(),
            n: URL_SAFE_NO_PAD.encode(&self.modulus),
            e: URL_SAFE_NO_PAD.encode(&self.exponent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_key_pair() {
        let pair = KeyPair::generate(2048).unwrap();
        assert_eq!(pair.status, KeyStatus::Active);
        assert!(!pair.key_id.is_empty());
    }

    #[test]
    fn test_undersized_key_rejected() {
        let result = KeyPair::generate(1024);
        assert!(matches!(result, Err(TokenError::InvalidKey(_))));
    }

    #[test]
    fn test_persisted_round_trip() {
        let pair = KeyPair::generate(2048).unwrap();
        let persisted = pair.to_persisted();
        let restored = KeyPair::from_persisted(persisted).unwrap();

        assert_eq!(restored.key_id, pair.key_id);
        assert_eq!(restored.status, pair.status);
        assert_eq!(restored.to_jwk(), pair.to_jwk());
    }

    #[test]
    fn test_demoted_copy() {
        let pair = KeyPair::generate(2048).unwrap();
        let demoted = pair.demoted();

        assert_eq!(demoted.status, KeyStatus::Previous);
        assert_eq!(pair.status, KeyStatus::Active);
        assert_eq!(demoted.key_id, pair.key_id);
    }

    #[test]
    fn test_jwk_export() {
        let pair = KeyPair::generate(2048).unwrap();
        let jwk = pair.to_jwk();

        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.key_use, "sig");
        assert_eq!(jwk.alg, "RS256");
        assert_eq!(jwk.kid, pair.key_id);
        assert!(!jwk.n.is_empty());
        assert!(!jwk.e.is_empty());
    }

    #[test]
    fn test_debug_redacts_private_material() {
        let pair = KeyPair::generate(2048).unwrap();
        let rendered = format!("{:?}", pair);
        assert!(!rendered.contains("PRIVATE KEY"));
        assert!(rendered.contains(&pair.key_id));
    }
}
