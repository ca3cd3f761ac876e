use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The purpose a token was issued for. Verification requires the kind
/// to match when the caller states an expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Short-lived API access token.
    Access,
    /// Long-lived token exchanged for fresh pairs.
    Refresh,
    /// Password-reset token.
    Reset,
    /// Email-verification token.
    EmailVerify,
}

impl TokenKind {
    /// Kind name as carried in the claim.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
            Self::Reset => "reset",
            Self::EmailVerify => "email_verify",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Claims carried by every issued token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    // Standard JWT claims
    /// Issuer.
    pub iss: String,
    /// Subject (user identifier).
    pub sub: String,
    /// Audience set.
    pub aud: Vec<String>,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Unique token identifier, the revocation lookup key.
    pub jti: String,

    // Domain claims
    /// Subject's email address.
    pub email: String,
    /// What the token was issued for.
    pub kind: TokenKind,
    /// Granted roles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    /// Granted permissions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    /// Session the token belongs to; shared across a token pair.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl TokenClaims {
    /// Create claims for a token issued now, expiring after `ttl`, with
    /// a fresh unique `jti`.
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        audience: Vec<String>,
        subject: impl Into<String>,
        email: impl Into<String>,
        kind: TokenKind,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now().timestamp();
        TokenClaims {
            iss: issuer.into(),
            sub: subject.into(),
            aud: audience,
            exp: now + ttl.as_secs() as i64,
            iat: now,
            jti: uuid::Uuid::new_v4().to_string(),
            email: email.into(),
            kind,
            roles: None,
            permissions: None,
            session_id: None,
        }
    }

    /// Attach roles.
    #[must_use]
    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = Some(roles);
        self
    }

    /// Attach permissions.
    #[must_use]
    pub fn with_permissions(mut self, permissions: Vec<String>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Attach a session identifier.
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// True when the expiration time has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.exp < Utc::now().timestamp()
    }

    /// Declared lifetime in seconds.
    #[must_use]
    pub const fn lifetime_seconds(&self) -> i64 {
        self.exp - self.iat
    }

    /// Seconds until expiry, zero if already expired.
    #[must_use]
    pub fn remaining_seconds(&self) -> i64 {
        (self.exp - Utc::now().timestamp()).max(0)
    }

    /// True when every field required for an authorization decision is
    /// present.
    #[must_use]
    pub fn has_required_fields(&self) -> bool {
        !self.sub.is_empty() && !self.jti.is_empty() && !self.iss.is_empty() && !self.aud.is_empty()
    }
}
