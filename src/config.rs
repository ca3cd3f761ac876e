//! Centralized configuration for the token security service.
//!
//! All configuration is loaded from environment variables and validated
//! at startup. Invalid configuration fails loudly at construction time;
//! it never degrades silently.

use crate::error::TokenError;
use crate::ratelimit::RateLimitConfig;
use std::env;
use std::time::Duration;

/// Minimum RSA modulus size accepted for signing keys, in bits.
pub const MIN_RSA_KEY_BITS: usize = 2048;

/// Token service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis connection URL for the shared store.
    pub redis_url: String,

    // JWT settings
    /// Issuer claim stamped into and required from every token.
    pub issuer: String,
    /// Audience set stamped into and required from every token.
    pub audience: Vec<String>,
    /// Access token TTL.
    pub access_token_ttl: Duration,
    /// Refresh token TTL.
    pub refresh_token_ttl: Duration,
    /// Password-reset token TTL.
    pub reset_token_ttl: Duration,
    /// Email-verification token TTL.
    pub email_verify_token_ttl: Duration,
    /// Sanity ceiling on any token lifetime. Issuance clamps to this,
    /// verification rejects tokens that exceed it.
    pub max_token_lifetime: Duration,

    // Key lifecycle
    /// Number of signing keys retained (active + previous).
    pub key_retention: usize,
    /// RSA modulus size for generated signing keys.
    pub rsa_key_bits: usize,

    // Revocation
    /// Safety buffer added to a revoked token's remaining lifetime when
    /// computing the ledger entry TTL.
    pub blacklist_ttl_buffer: Duration,

    // Store
    /// Upper bound on any single shared-store call.
    pub store_timeout: Duration,

    // Rate limiting
    /// Default sliding-window limits for authentication-sensitive actions.
    pub rate_limit: RateLimitConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            issuer: "token-guard".to_string(),
            audience: vec!["api".to_string()],
            access_token_ttl: Duration::from_secs(900),
            refresh_token_ttl: Duration::from_secs(604_800),
            reset_token_ttl: Duration::from_secs(3600),
            email_verify_token_ttl: Duration::from_secs(86_400),
            max_token_lifetime: Duration::from_secs(30 * 24 * 3600),
            key_retention: 2,
            rsa_key_bits: MIN_RSA_KEY_BITS,
            blacklist_ttl_buffer: Duration::from_secs(300),
            store_timeout: Duration::from_secs(5),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable fails to parse or the resulting
    /// configuration fails validation.
    pub fn from_env() -> Result<Self, TokenError> {
        dotenvy::dotenv().ok();

        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "token-guard".to_string());
        let audience = env::var("JWT_AUDIENCE")
            .unwrap_or_else(|_| "api".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let access_token_ttl = Duration::from_secs(parse_env("ACCESS_TOKEN_TTL", 900)?);
        let refresh_token_ttl = Duration::from_secs(parse_env("REFRESH_TOKEN_TTL", 604_800)?);
        let reset_token_ttl = Duration::from_secs(parse_env("RESET_TOKEN_TTL", 3600)?);
        let email_verify_token_ttl =
            Duration::from_secs(parse_env("EMAIL_VERIFY_TOKEN_TTL", 86_400)?);
        let max_token_lifetime =
            Duration::from_secs(parse_env("MAX_TOKEN_LIFETIME", 30 * 24 * 3600)?);

        let key_retention = parse_env("KEY_RETENTION", 2)?;
        let rsa_key_bits = parse_env("RSA_KEY_BITS", MIN_RSA_KEY_BITS)?;

        let blacklist_ttl_buffer = Duration::from_secs(parse_env("BLACKLIST_TTL_BUFFER", 300)?);
        let store_timeout = Duration::from_secs(parse_env("STORE_TIMEOUT", 5)?);

        let rate_limit = RateLimitConfig {
            max_requests: parse_env("RATE_LIMIT_MAX_REQUESTS", 10)?,
            window: Duration::from_secs(parse_env("RATE_LIMIT_WINDOW", 60)?),
        };

        let config = Self {
            redis_url,
            issuer,
            audience,
            access_token_ttl,
            refresh_token_ttl,
            reset_token_ttl,
            email_verify_token_ttl,
            max_token_lifetime,
            key_retention,
            rsa_key_bits,
            blacklist_ttl_buffer,
            store_timeout,
            rate_limit,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate invariants that must hold before any component is built.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first violated invariant.
    pub fn validate(&self) -> Result<(), TokenError> {
        if self.issuer.is_empty() {
            return Err(TokenError::config("JWT issuer must not be empty"));
        }
        if self.audience.is_empty() {
            return Err(TokenError::config("JWT audience must not be empty"));
        }
        if self.rsa_key_bits < MIN_RSA_KEY_BITS {
            return Err(TokenError::config(format!(
                "RSA key size {} is below the minimum of {} bits",
                self.rsa_key_bits, MIN_RSA_KEY_BITS
            )));
        }
        if self.key_retention < 1 {
            return Err(TokenError::config("key retention must be at least 1"));
        }
        if self.access_token_ttl.is_zero() || self.refresh_token_ttl.is_zero() {
            return Err(TokenError::config("token TTLs must be non-zero"));
        }
        if self.max_token_lifetime.is_zero() {
            return Err(TokenError::config("max token lifetime must be non-zero"));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(TokenError::config("rate limit max_requests must be at least 1"));
        }
        if self.rate_limit.window.is_zero() {
            return Err(TokenError::config("rate limit window must be non-zero"));
        }
        Ok(())
    }

    /// Default TTL for a token of the given kind.
    #[must_use]
    pub fn ttl_for(&self, kind: crate::jwt::TokenKind) -> Duration {
        use crate::jwt::TokenKind;
        match kind {
            TokenKind::Access => self.access_token_ttl,
            TokenKind::Refresh => self.refresh_token_ttl,
            TokenKind::Reset => self.reset_token_ttl,
            TokenKind::EmailVerify => self.email_verify_token_ttl,
        }
    }
}

/// Parse environment variable with default value.
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, TokenError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val
            .parse()
            .map_err(|e| TokenError::config(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.key_retention, 2);
        assert_eq!(config.rsa_key_bits, MIN_RSA_KEY_BITS);
    }

    #[test]
    fn test_undersized_key_rejected() {
        let config = Config {
            rsa_key_bits: 1024,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(TokenError::Config(_))));
    }

    #[test]
    fn test_empty_issuer_rejected() {
        let config = Config {
            issuer: String::new(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let mut config = Config::default();
        config.rate_limit.max_requests = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ttl_for_kind() {
        let config = Config::default();
        assert_eq!(
            config.ttl_for(crate::jwt::TokenKind::Access),
            Duration::from_secs(900)
        );
        assert_eq!(
            config.ttl_for(crate::jwt::TokenKind::Reset),
            Duration::from_secs(3600)
        );
    }
}
