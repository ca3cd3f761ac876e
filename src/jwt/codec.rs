//! Stateless token encoding and verification.
//!
//! Expected verification failures are values (`Verification::Invalid`),
//! not errors: an invalid token is a normal, frequent outcome.

use crate::error::TokenError;
use crate::jwt::claims::{TokenClaims, TokenKind};
use crate::keys::KeyPair;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{decode, encode, Algorithm, Header, Validation};
use std::fmt;

/// Why a token failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Signature does not match the key. The only reason worth retrying
    /// against previous keys.
    SignatureInvalid,
    /// Past its expiration time.
    Expired,
    /// Issuer claim does not match this service.
    IssuerMismatch,
    /// Audience claim does not include this service's audience.
    AudienceMismatch,
    /// Token kind differs from the caller's expectation.
    KindMismatch,
    /// A claim required for authorization is missing or empty.
    MissingClaims,
    /// Declared lifetime exceeds the sanity ceiling.
    LifetimeExceeded,
    /// The token's `jti` is on the revocation ledger (or the ledger was
    /// unreachable and the check failed secure).
    Revoked,
    /// Not a parseable token at all.
    Malformed,
}

impl RejectReason {
    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SignatureInvalid => "signature_invalid",
            Self::Expired => "expired",
            Self::IssuerMismatch => "issuer_mismatch",
            Self::AudienceMismatch => "audience_mismatch",
            Self::KindMismatch => "kind_mismatch",
            Self::MissingClaims => "missing_claims",
            Self::LifetimeExceeded => "lifetime_exceeded",
            Self::Revoked => "revoked",
            Self::Malformed => "malformed",
        }
    }

    /// True when trying an older signing key could change the outcome.
    #[must_use]
    pub const fn is_signature_failure(&self) -> bool {
        matches!(self, Self::SignatureInvalid)
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of verifying a token.
#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    /// Signature and claims check out.
    Valid(TokenClaims),
    /// The token must not be honored.
    Invalid(RejectReason),
}

impl Verification {
    /// True for `Valid`.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// The verified claims, if valid.
    #[must_use]
    pub const fn claims(&self) -> Option<&TokenClaims> {
        match self {
            Self::Valid(claims) => Some(claims),
            Self::Invalid(_) => None,
        }
    }

    /// Consume into the verified claims, if valid.
    #[must_use]
    pub fn into_claims(self) -> Option<TokenClaims> {
        match self {
            Self::Valid(claims) => Some(claims),
            Self::Invalid(_) => None,
        }
    }

    /// The rejection reason, if invalid.
    #[must_use]
    pub const fn reason(&self) -> Option<RejectReason> {
        match self {
            Self::Valid(_) => None,
            Self::Invalid(reason) => Some(*reason),
        }
    }
}

/// Creates and verifies signed tokens for one issuer/audience
/// configuration. Holds no key state; callers supply the key pair.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    issuer: String,
    audience: Vec<String>,
}

impl TokenCodec {
    /// Create a codec for the given issuer and audience.
    #[must_use]
    pub fn new(issuer: impl Into<String>, audience: Vec<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience,
        }
    }

    /// Sign `claims` with the supplied key pair into a compact JWT
    /// whose header names the key.
    ///
    /// # Errors
    ///
    /// Returns an encoding error when claims are incomplete or signing
    /// fails.
    pub fn create(&self, claims: &TokenClaims, key: &KeyPair) -> Result<String, TokenError> {
        if claims.sub.is_empty() || claims.jti.is_empty() {
            return Err(TokenError::encoding("claims are missing subject or jti"));
        }

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(key.key_id.clone());

        encode(&header, claims, key.encoding_key())
            .map_err(|e| TokenError::encoding(e.to_string()))
    }

    /// Verify `token` against one public key: signature, issuer,
    /// audience, expiration, and, when given, the expected kind.
    #[must_use]
    pub fn verify(
        &self,
        token: &str,
        key: &KeyPair,
        expected_kind: Option<TokenKind>,
    ) -> Verification {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&self.audience);
        validation.validate_exp = true;

        match decode::<TokenClaims>(token, key.decoding_key(), &validation) {
            Ok(data) => {
                if let Some(kind) = expected_kind {
                    if data.claims.kind != kind {
                        return Verification::Invalid(RejectReason::KindMismatch);
                    }
                }
                Verification::Valid(data.claims)
            }
            Err(e) => {
                use jsonwebtoken::errors::ErrorKind;
                let reason = match e.kind() {
                    ErrorKind::InvalidSignature => RejectReason::SignatureInvalid,
                    ErrorKind::ExpiredSignature => RejectReason::Expired,
                    ErrorKind::InvalidIssuer => RejectReason::IssuerMismatch,
                    ErrorKind::InvalidAudience => RejectReason::AudienceMismatch,
                    ErrorKind::MissingRequiredClaim(_) => RejectReason::MissingClaims,
                    _ => RejectReason::Malformed,
                };
                Verification::Invalid(reason)
            }
        }
    }

    /// Decode claims without checking the signature. For extracting
    /// `jti` and metadata for revocation or logging only; never an
    /// authorization decision.
    ///
    /// # Errors
    ///
    /// Returns a decoding error when the token is not structurally a
    /// JWT.
    pub fn peek_unverified(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(TokenError::decoding("token is not a three-part JWT"));
        }

        let payload = URL_SAFE_NO_PAD
            .decode(parts[1])
            .map_err(|e| TokenError::decoding(e.to_string()))?;

        serde_json::from_slice(&payload).map_err(|e| TokenError::decoding(e.to_string()))
    }
}
