//! JSON Web Key Set publication types.
//!
//! External verifiers consume the JWKS to validate token signatures
//! without calling this service. The algorithm family is fixed to RSA
//! signing keys, so only the RSA members are carried.

use serde::{Deserialize, Serialize};

/// A single published public key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    /// Key type, always `"RSA"`.
    pub kty: String,
    /// Key identifier matching the `kid` JWT header of tokens it signed.
    pub kid: String,
    /// Key use, always `"sig"`.
    #[serde(rename = "use")]
    pub key_use: String,
    /// Signing algorithm, always `"RS256"`.
    pub alg: String,
    /// RSA modulus, base64url without padding.
    pub n: String,
    /// RSA public exponent, base64url without padding.
    pub e: String,
}

/// The full key set: active key plus retained previous keys.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Jwks {
    /// Published keys, newest first.
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Jwks { keys: Vec::new() }
    }

    /// Append a key to the set.
    pub fn add_key(&mut self, key: Jwk) {
        self.keys.push(key);
    }

    /// Render the set as JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
