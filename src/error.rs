//! Centralized error types for the token security service.
//!
//! Expected verification and rate-limit outcomes are modeled as values
//! (`Verification`, `RateLimitDecision`), never as errors. `TokenError`
//! covers infrastructure failures and programmer/configuration mistakes.

use thiserror::Error;

/// Error type for token service operations.
#[derive(Error, Debug)]
pub enum TokenError {
    /// Invalid or missing configuration, detected at construction time.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Signing key generation failed.
    #[error("Key generation error: {0}")]
    KeyGeneration(String),

    /// Key material is malformed or below the security threshold.
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    /// Token could not be encoded (incomplete claims, signing failure).
    #[error("Token encoding error: {0}")]
    Encoding(String),

    /// Token could not be decoded at the structural level.
    #[error("Token decoding error: {0}")]
    Decoding(String),

    /// Shared store operation failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Shared store operation exceeded its timeout.
    #[error("Store operation timed out: {0}")]
    Timeout(String),

    /// Serialization of a persisted document failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal invariant violation.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TokenError {
    /// Create a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a key generation error.
    #[must_use]
    pub fn key_generation(message: impl Into<String>) -> Self {
        Self::KeyGeneration(message.into())
    }

    /// Create an invalid-key error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey(message.into())
    }

    /// Create an encoding error.
    #[must_use]
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding(message.into())
    }

    /// Create a decoding error.
    #[must_use]
    pub fn decoding(message: impl Into<String>) -> Self {
        Self::Decoding(message.into())
    }

    /// Create a store error.
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Create a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// True when the error means the shared store could not be reached.
    ///
    /// Callers use this to apply their fail-secure or fail-open policy
    /// instead of treating the condition as a token-invalid result.
    #[must_use]
    pub const fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Timeout(_))
    }
}

impl From<redis::RedisError> for TokenError {
    fn from(err: redis::RedisError) -> Self {
        TokenError::Store(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        TokenError::Encoding(err.to_string())
    }
}
