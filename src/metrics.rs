//! Prometheus metrics for the token security service.
//!
//! Provides counters for issuance, verification, revocation, key
//! rotation, rate limiting, and store health.

use once_cell::sync::Lazy;
use prometheus::{register_counter, register_counter_vec, Counter, CounterVec};

/// Tokens issued counter.
pub static TOKENS_ISSUED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "token_guard_tokens_issued_total",
        "Total number of tokens issued",
        &["kind"]
    )
    .expect("Failed to register tokens_issued metric")
});

/// Verification outcomes counter.
pub static VERIFICATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "token_guard_verifications_total",
        "Total number of token verifications",
        &["outcome"]
    )
    .expect("Failed to register verifications metric")
});

/// Tokens revoked counter.
pub static TOKENS_REVOKED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "token_guard_tokens_revoked_total",
        "Total number of tokens revoked",
        &["reason"]
    )
    .expect("Failed to register tokens_revoked metric")
});

/// Signing key rotations counter.
pub static KEY_ROTATIONS: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "token_guard_key_rotations_total",
        "Total number of signing key rotations"
    )
    .expect("Failed to register key_rotations metric")
});

/// Rate limit check outcomes counter.
pub static RATE_LIMIT_CHECKS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "token_guard_rate_limit_checks_total",
        "Total number of rate limit checks",
        &["outcome"]
    )
    .expect("Failed to register rate_limit_checks metric")
});

/// Store operations counter.
pub static STORE_OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "token_guard_store_operations_total",
        "Total number of shared store operations",
        &["operation", "status"]
    )
    .expect("Failed to register store_operations metric")
});

/// Record a token issuance.
pub fn record_token_issued(kind: &str) {
    TOKENS_ISSUED.with_label_values(&[kind]).inc();
}

/// Record a verification outcome.
pub fn record_verification(outcome: &str) {
    VERIFICATIONS.with_label_values(&[outcome]).inc();
}

/// Record a token revocation.
pub fn record_token_revoked(reason: &str) {
    TOKENS_REVOKED.with_label_values(&[reason]).inc();
}

/// Record a signing key rotation.
pub fn record_key_rotation() {
    KEY_ROTATIONS.inc();
}

/// Record a rate limit check outcome.
pub fn record_rate_limit_check(outcome: &str) {
    RATE_LIMIT_CHECKS.with_label_values(&[outcome]).inc();
}

/// Record a store operation.
pub fn record_store_operation(operation: &str, status: &str) {
    STORE_OPERATIONS
        .with_label_values(&[operation, status])
        .inc();
}
