//! Token service orchestration.
//!
//! Issues token pairs, verifies tokens against the active key with
//! fallback to previous keys, consults the revocation ledger, drives
//! key rotation, and exposes public key material. Constructed once at
//! process startup and shared by handle; there is no global state.

use crate::blacklist::{BlacklistLedger, BlacklistStats};
use crate::config::Config;
use crate::error::TokenError;
use crate::jwks::Jwks;
use crate::jwt::{RejectReason, TokenClaims, TokenCodec, TokenKind, Verification};
use crate::keys::{KeyRotationManager, KeyRotationStats};
use crate::metrics;
use crate::storage::CacheStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// What to issue a token (or pair) for.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    /// Subject (user identifier).
    pub subject: String,
    /// Subject's email address.
    pub email: String,
    /// Roles to embed.
    pub roles: Option<Vec<String>>,
    /// Permissions to embed.
    pub permissions: Option<Vec<String>>,
    /// Session to attach to; generated when absent.
    pub session_id: Option<String>,
    /// Requested lifetime override, clamped to the configured ceiling.
    pub ttl_override: Option<Duration>,
}

impl IssueRequest {
    /// Create a request for `subject`/`email` with defaults otherwise.
    #[must_use]
    pub fn new(subject: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            email: email.into(),
            roles: None,
            permissions: None,
            session_id: None,
            ttl_override: None,
        }
    }

    /// Embed roles.
    #[must_use]
    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = Some(roles);
        self
    }

    /// Embed permissions.
    #[must_use]
    pub fn with_permissions(mut self, permissions: Vec<String>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Attach to an existing session.
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Request a specific lifetime; issuance clamps it to the ceiling.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_override = Some(ttl);
        self
    }
}

/// An issued access/refresh token pair sharing one session.
#[derive(Debug, Clone)]
pub struct IssuedPair {
    /// Signed access token.
    pub access_token: String,
    /// Signed refresh token.
    pub refresh_token: String,
    /// Session shared by both tokens.
    pub session_id: String,
    /// Access token expiry.
    pub access_expires_at: DateTime<Utc>,
    /// Refresh token expiry.
    pub refresh_expires_at: DateTime<Utc>,
    /// Identifier of the signing key used.
    pub key_id: String,
    /// Token type for HTTP Authorization headers.
    pub token_type: String,
}

/// A single issued token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Signed token.
    pub token: String,
    /// Its unique identifier.
    pub jti: String,
    /// What it was issued for.
    pub kind: TokenKind,
    /// Expiry.
    pub expires_at: DateTime<Utc>,
    /// Identifier of the signing key used.
    pub key_id: String,
}

/// Outcome of a refresh attempt.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// The presented token was valid; it is now revoked and replaced.
    Rotated(IssuedPair),
    /// The presented token was not honored.
    Rejected(RejectReason),
}

/// Combined statistics for the administrative surface.
#[derive(Debug, Clone)]
pub struct ServiceStats {
    /// Key lifecycle statistics.
    pub keys: KeyRotationStats,
    /// Revocation ledger statistics.
    pub blacklist: BlacklistStats,
}

/// Public-facing token security service.
///
/// Cheap to share: wrap in an [`Arc`] and hand a clone of the handle to
/// every request handler.
pub struct TokenService {
    config: Config,
    rotation: Arc<KeyRotationManager>,
    blacklist: BlacklistLedger,
    codec: TokenCodec,
}

impl TokenService {
    /// Assemble a service from its parts. Fails loudly on invalid
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `config` is invalid.
    pub fn new(
        config: Config,
        rotation: Arc<KeyRotationManager>,
        blacklist: BlacklistLedger,
    ) -> Result<Self, TokenError> {
        config.validate()?;
        let codec = TokenCodec::new(config.issuer.clone(), config.audience.clone());
        Ok(Self {
            config,
            rotation,
            blacklist,
            codec,
        })
    }

    /// Build and initialize a service over one shared store: constructs
    /// the rotation manager and ledger, then loads or generates keys.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid configuration or failed key
    /// generation.
    pub async fn bootstrap(
        config: Config,
        store: Arc<dyn CacheStore>,
    ) -> Result<Self, TokenError> {
        let rotation = Arc::new(KeyRotationManager::new(
            Arc::clone(&store),
            config.key_retention,
            config.rsa_key_bits,
        ));
        rotation.initialize().await?;
        let blacklist = BlacklistLedger::new(store);
        Self::new(config, rotation, blacklist)
    }

    /// Issue an access/refresh pair from the current active key. Both
    /// tokens share a session id; each carries its own `jti`.
    ///
    /// # Errors
    ///
    /// Returns an error when no active key exists or signing fails.
    pub async fn issue_pair(&self, request: IssueRequest) -> Result<IssuedPair, TokenError> {
        let key = self.active_key().await?;
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let access_ttl = self.clamp_ttl(
            request
                .ttl_override
                .unwrap_or(self.config.access_token_ttl),
        );
        let refresh_ttl = self.clamp_ttl(self.config.refresh_token_ttl);

        let access_claims =
            self.build_claims(&request, TokenKind::Access, access_ttl, &session_id);
        let refresh_claims =
            self.build_claims(&request, TokenKind::Refresh, refresh_ttl, &session_id);

        let access_token = self.codec.create(&access_claims, &key)?;
        let refresh_token = self.codec.create(&refresh_claims, &key)?;

        metrics::record_token_issued(TokenKind::Access.as_str());
        metrics::record_token_issued(TokenKind::Refresh.as_str());
        info!(
            subject = %request.subject,
            session_id = %session_id,
            key_id = %key.key_id,
            "Issued token pair"
        );

        Ok(IssuedPair {
            access_token,
            refresh_token,
            session_id,
            access_expires_at: timestamp(access_claims.exp)?,
            refresh_expires_at: timestamp(refresh_claims.exp)?,
            key_id: key.key_id.clone(),
            token_type: "Bearer".to_string(),
        })
    }

    /// Issue one token of the given kind (reset links, email
    /// verification, or a lone access token).
    ///
    /// # Errors
    ///
    /// Returns an error when no active key exists or signing fails.
    pub async fn issue_single(
        &self,
        kind: TokenKind,
        request: IssueRequest,
    ) -> Result<IssuedToken, TokenError> {
        let key = self.active_key().await?;
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let ttl = self.clamp_ttl(request.ttl_override.unwrap_or(self.config.ttl_for(kind)));

        let claims = self.build_claims(&request, kind, ttl, &session_id);
        let token = self.codec.create(&claims, &key)?;

        metrics::record_token_issued(kind.as_str());
        info!(subject = %request.subject, kind = %kind, key_id = %key.key_id, "Issued token");

        Ok(IssuedToken {
            token,
            jti: claims.jti,
            kind,
            expires_at: timestamp(claims.exp)?,
            key_id: key.key_id.clone(),
        })
    }

    /// Verify a token: active key first, then previous keys newest-first
    /// when the failure is signature-related, then the revocation
    /// ledger, then claim sanity. A normal invalid token is a value,
    /// never an error.
    ///
    /// # Errors
    ///
    /// Returns an error only for missing configuration (no signing keys
    /// loaded).
    pub async fn verify(
        &self,
        token: &str,
        expected_kind: Option<TokenKind>,
    ) -> Result<Verification, TokenError> {
        let keys = self.rotation.verification_keys().await;
        if keys.is_empty() {
            return Err(TokenError::internal(
                "no signing keys loaded; initialize the rotation manager first",
            ));
        }

        let mut outcome = Verification::Invalid(RejectReason::SignatureInvalid);
        for key in &keys {
            match self.codec.verify(token, key, expected_kind) {
                Verification::Valid(claims) => {
                    outcome = Verification::Valid(claims);
                    break;
                }
                Verification::Invalid(reason) => {
                    outcome = Verification::Invalid(reason);
                    // Only a signature mismatch can be rescued by an
                    // older key; every other failure is terminal.
                    if !reason.is_signature_failure() {
                        break;
                    }
                }
            }
        }

        let claims = match outcome {
            Verification::Valid(claims) => claims,
            Verification::Invalid(reason) => {
                metrics::record_verification(reason.as_str());
                return Ok(Verification::Invalid(reason));
            }
        };

        let check = self.blacklist.is_revoked(&claims.jti).await;
        if check.revoked {
            if !check.degraded {
                warn!(jti = %claims.jti, "Rejected revoked token");
            }
            metrics::record_verification(RejectReason::Revoked.as_str());
            return Ok(Verification::Invalid(RejectReason::Revoked));
        }

        if !claims.has_required_fields() {
            metrics::record_verification(RejectReason::MissingClaims.as_str());
            return Ok(Verification::Invalid(RejectReason::MissingClaims));
        }

        let ceiling = self.config.max_token_lifetime.as_secs() as i64;
        if claims.lifetime_seconds() > ceiling {
            metrics::record_verification(RejectReason::LifetimeExceeded.as_str());
            return Ok(Verification::Invalid(RejectReason::LifetimeExceeded));
        }

        metrics::record_verification("valid");
        Ok(Verification::Valid(claims))
    }

    /// Revoke a token by recording its `jti` for the remainder of its
    /// own lifetime plus the safety buffer. The token's signature is
    /// not checked: revocation of a forged token is harmless, and the
    /// caller may be holding an already-expired copy.
    ///
    /// # Errors
    ///
    /// Returns an error when the token is not structurally a JWT or the
    /// ledger write fails.
    pub async fn revoke(&self, token: &str, reason: &str) -> Result<String, TokenError> {
        let claims = self.codec.peek_unverified(token)?;
        let ttl = Duration::from_secs(claims.remaining_seconds() as u64)
            + self.config.blacklist_ttl_buffer;

        self.blacklist.revoke(&claims.jti, ttl, reason).await?;
        info!(jti = %claims.jti, reason = %reason, "Revoked token");
        Ok(claims.jti)
    }

    /// Administrative direct revocation by `jti` with an explicit TTL.
    ///
    /// # Errors
    ///
    /// Returns an error when the ledger write fails.
    pub async fn revoke_jti(
        &self,
        jti: &str,
        ttl: Duration,
        reason: &str,
    ) -> Result<(), TokenError> {
        self.blacklist.revoke(jti, ttl, reason).await
    }

    /// Exchange a valid refresh token for a fresh pair. The presented
    /// token is revoked first (single use); a replayed one is therefore
    /// already on the ledger and gets rejected.
    ///
    /// # Errors
    ///
    /// Returns an error when the ledger or signing fails; a merely
    /// invalid token is a `Rejected` value.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshOutcome, TokenError> {
        let claims = match self.verify(refresh_token, Some(TokenKind::Refresh)).await? {
            Verification::Valid(claims) => claims,
            Verification::Invalid(reason) => {
                if reason == RejectReason::Revoked {
                    warn!(security_event = "refresh_reuse", "Replayed refresh token rejected");
                }
                return Ok(RefreshOutcome::Rejected(reason));
            }
        };

        let ttl = Duration::from_secs(claims.remaining_seconds() as u64)
            + self.config.blacklist_ttl_buffer;
        self.blacklist
            .revoke(&claims.jti, ttl, "refresh_rotation")
            .await?;

        let mut request = IssueRequest::new(claims.sub, claims.email);
        request.roles = claims.roles;
        request.permissions = claims.permissions;
        request.session_id = claims.session_id;

        let pair = self.issue_pair(request).await?;
        Ok(RefreshOutcome::Rotated(pair))
    }

    /// Rotate the signing key. Tokens signed with the outgoing key stay
    /// verifiable until it leaves the retention set.
    ///
    /// # Errors
    ///
    /// Returns an error when generation or persistence fails; the old
    /// key set stays in effect.
    pub async fn rotate(&self) -> Result<String, TokenError> {
        self.rotation.rotate().await
    }

    /// Public keys for external verifiers.
    pub async fn public_jwks(&self) -> Jwks {
        self.rotation.jwks().await
    }

    /// Rotation and ledger statistics.
    ///
    /// # Errors
    ///
    /// Returns an error when the ledger counters cannot be read.
    pub async fn stats(&self) -> Result<ServiceStats, TokenError> {
        Ok(ServiceStats {
            keys: self.rotation.stats().await,
            blacklist: self.blacklist.stats().await?,
        })
    }

    async fn active_key(&self) -> Result<Arc<crate::keys::KeyPair>, TokenError> {
        self.rotation.active_key().await.ok_or_else(|| {
            TokenError::internal("no active signing key; initialize the rotation manager first")
        })
    }

    fn clamp_ttl(&self, requested: Duration) -> Duration {
        requested.min(self.config.max_token_lifetime)
    }

    fn build_claims(
        &self,
        request: &IssueRequest,
        kind: TokenKind,
        ttl: Duration,
        session_id: &str,
    ) -> TokenClaims {
        let mut claims = TokenClaims::new(
            self.config.issuer.clone(),
            self.config.audience.clone(),
            request.subject.clone(),
            request.email.clone(),
            kind,
            ttl,
        )
        .with_session_id(session_id);

        if let Some(roles) = &request.roles {
            claims = claims.with_roles(roles.clone());
        }
        if let Some(permissions) = &request.permissions {
            claims = claims.with_permissions(permissions.clone());
        }
        claims
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, TokenError> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| TokenError::internal("invalid expiry timestamp"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeyPair, KeyStore};
    use crate::storage::MemoryStore;
    use once_cell::sync::Lazy;

    // Key generation dominates test time; every test that does not
    // exercise generation itself loads this pre-built key through the
    // store instead.
    static SEED_KEY: Lazy<KeyPair> = Lazy::new(|| KeyPair::generate(2048).unwrap());

    async fn service() -> (TokenService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        KeyStore::new(store.clone() as Arc<dyn crate::storage::CacheStore>)
            .save(&[SEED_KEY.to_persisted()])
            .await
            .unwrap();
        let svc = TokenService::bootstrap(Config::default(), store.clone())
            .await
            .unwrap();
        (svc, store)
    }

    #[tokio::test]
    async fn test_issue_pair_shares_session_distinct_jti() {
        let (svc, _) = service().await;

        let pair = svc
            .issue_pair(IssueRequest::new("u1", "u1@example.com"))
            .await
            .unwrap();

        let access = svc.verify(&pair.access_token, Some(TokenKind::Access)).await.unwrap();
        let refresh = svc
            .verify(&pair.refresh_token, Some(TokenKind::Refresh))
            .await
            .unwrap();

        let access = access.into_claims().unwrap();
        let refresh = refresh.into_claims().unwrap();
        assert_eq!(access.session_id, refresh.session_id);
        assert_ne!(access.jti, refresh.jti);
        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.key_id, SEED_KEY.key_id);
    }

    #[tokio::test]
    async fn test_ttl_override_is_clamped() {
        let (svc, _) = service().await;

        let request = IssueRequest::new("u1", "u1@example.com")
            .with_ttl(Duration::from_secs(365 * 24 * 3600));
        let issued = svc.issue_single(TokenKind::Access, request).await.unwrap();

        let claims = svc
            .verify(&issued.token, Some(TokenKind::Access))
            .await
            .unwrap()
            .into_claims()
            .unwrap();
        assert_eq!(
            claims.lifetime_seconds(),
            Config::default().max_token_lifetime.as_secs() as i64
        );
    }

    #[tokio::test]
    async fn test_kind_expectation_enforced() {
        let (svc, _) = service().await;
        let pair = svc
            .issue_pair(IssueRequest::new("u1", "u1@example.com"))
            .await
            .unwrap();

        let outcome = svc
            .verify(&pair.refresh_token, Some(TokenKind::Access))
            .await
            .unwrap();
        assert_eq!(outcome.reason(), Some(RejectReason::KindMismatch));
    }

    #[tokio::test]
    async fn test_verify_without_keys_is_loud() {
        let store = Arc::new(MemoryStore::new());
        let rotation = Arc::new(KeyRotationManager::new(store.clone(), 2, 2048));
        let svc = TokenService::new(
            Config::default(),
            rotation,
            BlacklistLedger::new(store),
        )
        .unwrap();

        assert!(matches!(
            svc.verify("whatever", None).await,
            Err(TokenError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_roles_and_permissions_carried() {
        let (svc, _) = service().await;

        let request = IssueRequest::new("u1", "u1@example.com")
            .with_roles(vec!["admin".to_string()])
            .with_permissions(vec!["donations:write".to_string()]);
        let pair = svc.issue_pair(request).await.unwrap();

        let claims = svc
            .verify(&pair.access_token, None)
            .await
            .unwrap()
            .into_claims()
            .unwrap();
        assert_eq!(claims.roles, Some(vec!["admin".to_string()]));
        assert_eq!(claims.permissions, Some(vec!["donations:write".to_string()]));
    }

    #[tokio::test]
    async fn test_revoke_then_verify_fails() {
        let (svc, _) = service().await;
        let pair = svc
            .issue_pair(IssueRequest::new("u1", "u1@example.com"))
            .await
            .unwrap();

        let jti = svc.revoke(&pair.access_token, "logout").await.unwrap();
        assert!(!jti.is_empty());

        let outcome = svc.verify(&pair.access_token, None).await.unwrap();
        assert_eq!(outcome.reason(), Some(RejectReason::Revoked));

        // The refresh token has its own jti and still verifies.
        assert!(svc
            .verify(&pair.refresh_token, Some(TokenKind::Refresh))
            .await
            .unwrap()
            .is_valid());
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_rejects_replay() {
        let (svc, _) = service().await;
        let pair = svc
            .issue_pair(
                IssueRequest::new("u1", "u1@example.com").with_roles(vec!["member".to_string()]),
            )
            .await
            .unwrap();

        let outcome = svc.refresh(&pair.refresh_token).await.unwrap();
        let new_pair = match outcome {
            RefreshOutcome::Rotated(p) => p,
            RefreshOutcome::Rejected(r) => panic!("refresh rejected: {r}"),
        };

        // Session and grants survive rotation.
        let claims = svc
            .verify(&new_pair.access_token, None)
            .await
            .unwrap()
            .into_claims()
            .unwrap();
        assert_eq!(claims.session_id, Some(pair.session_id.clone()));
        assert_eq!(claims.roles, Some(vec!["member".to_string()]));

        // Replaying the consumed refresh token fails.
        let replay = svc.refresh(&pair.refresh_token).await.unwrap();
        assert!(matches!(
            replay,
            RefreshOutcome::Rejected(RejectReason::Revoked)
        ));
    }

    #[tokio::test]
    async fn test_stats_combine_components() {
        let (svc, _) = service().await;
        let pair = svc
            .issue_pair(IssueRequest::new("u1", "u1@example.com"))
            .await
            .unwrap();
        svc.revoke(&pair.access_token, "logout").await.unwrap();

        let stats = svc.stats().await.unwrap();
        assert_eq!(stats.keys.total_keys, 1);
        assert_eq!(stats.blacklist.revocations_total, 1);
    }
}
