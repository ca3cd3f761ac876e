//! Property-based tests for the sliding-window rate limiter.
//!
//! Property: Window admission boundary. Exactly the first
//! `max_requests` checks are admitted, and every one after that is
//! denied with zero remaining.

use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use token_guard::ratelimit::{RateLimitConfig, RateLimiter};
use token_guard::storage::MemoryStore;

/// Generate arbitrary limits.
fn arb_limit() -> impl Strategy<Value = u32> {
    1u32..12u32
}

/// Generate arbitrary overshoot (extra requests past the limit).
fn arb_overshoot() -> impl Strategy<Value = u32> {
    1u32..6u32
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// For any limit N and a fresh window, exactly the first N checks
    /// are admitted; checks N+1.. are denied with remaining = 0 and a
    /// retry hint bounded by the window.
    #[test]
    fn prop_admission_boundary(limit in arb_limit(), overshoot in arb_overshoot()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let limiter = RateLimiter::new(Arc::new(MemoryStore::new()));
            let cfg = RateLimitConfig {
                max_requests: limit,
                window: Duration::from_secs(60),
            };

            for i in 0..limit {
                let decision = limiter.check("subject", "login", &cfg).await;
                prop_assert!(decision.allowed, "check {} of {} must be admitted", i + 1, limit);
                prop_assert_eq!(decision.limit, limit);
                prop_assert_eq!(decision.remaining, limit - i - 1);
            }

            for _ in 0..overshoot {
                let decision = limiter.check("subject", "login", &cfg).await;
                prop_assert!(!decision.allowed);
                prop_assert_eq!(decision.remaining, 0);
                let retry = decision.retry_after.unwrap();
                prop_assert!(retry <= Duration::from_secs(60));
            }

            Ok(())
        })?;
    }

    /// Denied checks never consume window slots: after any number of
    /// denials, a reset frees exactly `limit` slots again.
    #[test]
    fn prop_reset_restores_full_window(limit in arb_limit(), overshoot in arb_overshoot()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let limiter = RateLimiter::new(Arc::new(MemoryStore::new()));
            let cfg = RateLimitConfig {
                max_requests: limit,
                window: Duration::from_secs(60),
            };

            for _ in 0..(limit + overshoot) {
                limiter.check("subject", "login", &cfg).await;
            }
            limiter.reset("subject", "login").await.unwrap();

            for i in 0..limit {
                let decision = limiter.check("subject", "login", &cfg).await;
                prop_assert!(decision.allowed, "post-reset check {} must be admitted", i + 1);
            }
            prop_assert!(!limiter.check("subject", "login", &cfg).await.allowed);

            Ok(())
        })?;
    }
}
