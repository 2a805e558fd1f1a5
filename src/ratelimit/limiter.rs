//! Core rate limit decision engine.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::policy::RateLimitPolicy;
use super::store::{Bucket, BucketStore, DEFAULT_CAPACITY, DEFAULT_ENTRY_TTL_MS};

/// The outcome of a single rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request is admitted.
    pub allowed: bool,
    /// The policy limit the decision was made against.
    pub limit: u32,
    /// Requests left in the current window. Never negative; zero on denial.
    pub remaining: u32,
    /// Absolute timestamp (unix milliseconds) at which the window ends.
    pub reset_at_ms: u64,
}

impl Decision {
    /// Window end expressed as whole epoch seconds, rounded up.
    ///
    /// This is the representation used for human-facing response headers.
    pub fn reset_secs(&self) -> u64 {
        self.reset_at_ms.div_ceil(1000)
    }

    /// Whole seconds until the window ends, rounded up. Zero once past.
    pub fn retry_after_secs(&self, now_ms: u64) -> u64 {
        self.reset_at_ms.saturating_sub(now_ms).div_ceil(1000)
    }
}

/// The rate limit decision engine.
///
/// Holds the shared bucket store behind a single mutex so the read,
/// recompute, and write of a bucket happen under one lock acquisition.
/// Tasks on a multi-threaded executor genuinely run in parallel, so two
/// checks racing on the same key could otherwise both observe a count
/// below the limit and both admit.
///
/// The engine is constructed per process (or per test) and shared via
/// `Arc`; it is deliberately not module-level global state.
pub struct RateLimiter {
    store: Mutex<BucketStore>,
}

impl RateLimiter {
    /// Create a rate limiter with the default store bounds.
    pub fn new() -> Self {
        Self::with_store(DEFAULT_CAPACITY, DEFAULT_ENTRY_TTL_MS)
    }

    /// Create a rate limiter with explicit store capacity and entry TTL.
    pub fn with_store(capacity: usize, entry_ttl_ms: u64) -> Self {
        Self {
            store: Mutex::new(BucketStore::new(capacity, entry_ttl_ms)),
        }
    }

    /// Check the rate limit for a key against a policy at the current time.
    pub fn check(&self, key: &str, policy: &RateLimitPolicy) -> Decision {
        self.check_at(key, policy, unix_now_ms())
    }

    /// Check the rate limit for a key against a policy at an explicit time.
    ///
    /// A request that would exceed the limit is rejected without touching
    /// the stored bucket, so the persisted count never drifts above the
    /// limit and `remaining` is exact at the moment of computation.
    pub fn check_at(&self, key: &str, policy: &RateLimitPolicy, now_ms: u64) -> Decision {
        trace!(key = %key, limit = policy.limit, "Checking rate limit");

        let mut store = self.store.lock();

        match store.get(key, now_ms) {
            // Active window: reset_at is strictly in the future. A request
            // arriving exactly at reset_at starts a fresh window instead.
            Some(bucket) if now_ms < bucket.reset_at_ms => {
                let new_count = bucket.count + 1;
                if new_count > policy.limit {
                    debug!(
                        key = %key,
                        limit = policy.limit,
                        reset_at_ms = bucket.reset_at_ms,
                        "Rate limit exceeded"
                    );
                    return Decision {
                        allowed: false,
                        limit: policy.limit,
                        remaining: 0,
                        reset_at_ms: bucket.reset_at_ms,
                    };
                }

                store.set(
                    key,
                    Bucket {
                        count: new_count,
                        reset_at_ms: bucket.reset_at_ms,
                    },
                    now_ms,
                );

                Decision {
                    allowed: true,
                    limit: policy.limit,
                    remaining: policy.limit - new_count,
                    reset_at_ms: bucket.reset_at_ms,
                }
            }
            // No bucket, or the previous window has ended.
            _ => {
                let reset_at_ms = now_ms + policy.window_ms;
                debug!(
                    key = %key,
                    limit = policy.limit,
                    window_ms = policy.window_ms,
                    "Starting new rate limit window"
                );

                store.set(
                    key,
                    Bucket {
                        count: 1,
                        reset_at_ms,
                    },
                    now_ms,
                );

                Decision {
                    allowed: true,
                    limit: policy.limit,
                    remaining: policy.limit.saturating_sub(1),
                    reset_at_ms,
                }
            }
        }
    }

    /// Get the stored count for a key.
    ///
    /// Returns `None` if no bucket exists for the key.
    pub fn current_count(&self, key: &str, now_ms: u64) -> Option<u32> {
        self.store.lock().get(key, now_ms).map(|b| b.count)
    }

    /// Get the number of buckets currently held.
    pub fn bucket_count(&self) -> usize {
        self.store.lock().len()
    }

    /// Clear all buckets.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.store.lock().clear();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Current wall-clock time as unix milliseconds.
pub fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: RateLimitPolicy = RateLimitPolicy::new(3, 60_000);

    #[test]
    fn test_first_request_starts_window() {
        let limiter = RateLimiter::new();

        let decision = limiter.check_at("k", &POLICY, 1_000);

        assert!(decision.allowed);
        assert_eq!(decision.limit, 3);
        assert_eq!(decision.remaining, 2);
        assert_eq!(decision.reset_at_ms, 61_000);
    }

    #[test]
    fn test_remaining_counts_down_per_admission() {
        let limiter = RateLimiter::new();

        let remaining: Vec<u32> = (0..3)
            .map(|i| limiter.check_at("k", &POLICY, i).remaining)
            .collect();

        assert_eq!(remaining, vec![2, 1, 0]);
    }

    #[test]
    fn test_exactly_limit_requests_admitted() {
        let limiter = RateLimiter::new();

        for _ in 0..3 {
            assert!(limiter.check_at("k", &POLICY, 0).allowed);
        }
        let fourth = limiter.check_at("k", &POLICY, 0);

        assert!(!fourth.allowed);
        assert_eq!(fourth.remaining, 0);
    }

    #[test]
    fn test_denied_requests_do_not_inflate_count() {
        let limiter = RateLimiter::new();

        for _ in 0..3 {
            limiter.check_at("k", &POLICY, 0);
        }
        for _ in 0..10 {
            assert!(!limiter.check_at("k", &POLICY, 1).allowed);
        }

        // A burst of denials leaves the stored count at the limit.
        assert_eq!(limiter.current_count("k", 1), Some(3));
    }

    #[test]
    fn test_reset_time_stable_within_window() {
        let limiter = RateLimiter::new();

        let first = limiter.check_at("k", &POLICY, 5_000);
        let second = limiter.check_at("k", &POLICY, 20_000);
        let denied = {
            limiter.check_at("k", &POLICY, 30_000);
            limiter.check_at("k", &POLICY, 40_000)
        };

        assert_eq!(first.reset_at_ms, 65_000);
        assert_eq!(second.reset_at_ms, 65_000);
        assert_eq!(denied.reset_at_ms, 65_000);
    }

    #[test]
    fn test_window_expiry_admits_after_denial() {
        let limiter = RateLimiter::new();

        for _ in 0..4 {
            limiter.check_at("k", &POLICY, 0);
        }
        assert!(!limiter.check_at("k", &POLICY, 59_999).allowed);

        let fresh = limiter.check_at("k", &POLICY, 61_000);
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 2);
        assert_eq!(fresh.reset_at_ms, 121_000);
    }

    #[test]
    fn test_request_at_exact_reset_time_starts_new_window() {
        let limiter = RateLimiter::new();

        limiter.check_at("k", &POLICY, 0);

        // Inclusive boundary: arriving exactly at reset_at is a new window.
        let at_boundary = limiter.check_at("k", &POLICY, 60_000);
        assert!(at_boundary.allowed);
        assert_eq!(at_boundary.remaining, 2);
        assert_eq!(at_boundary.reset_at_ms, 120_000);
    }

    #[test]
    fn test_distinct_keys_are_independent() {
        let limiter = RateLimiter::new();
        let single = RateLimitPolicy::new(1, 60_000);

        assert!(limiter.check_at("a:ep", &single, 0).allowed);
        assert!(!limiter.check_at("a:ep", &single, 0).allowed);

        assert!(limiter.check_at("b:ep", &single, 0).allowed);
        assert_eq!(limiter.current_count("a:ep", 0), Some(1));
        assert_eq!(limiter.current_count("b:ep", 0), Some(1));
    }

    #[test]
    fn test_same_identity_different_endpoints_independent() {
        let limiter = RateLimiter::new();
        let single = RateLimitPolicy::new(1, 60_000);

        assert!(limiter.check_at("a:ep1", &single, 0).allowed);
        assert!(!limiter.check_at("a:ep1", &single, 0).allowed);
        assert!(limiter.check_at("a:ep2", &single, 0).allowed);
    }

    #[test]
    fn test_virtual_clock_advance_resets_quota() {
        let limiter = RateLimiter::new();
        let policy = RateLimitPolicy::new(2, 60_000);

        assert!(limiter.check_at("10.0.0.1:ep", &policy, 0).allowed);
        assert!(limiter.check_at("10.0.0.1:ep", &policy, 0).allowed);

        let later = limiter.check_at("10.0.0.1:ep", &policy, 61_000);
        assert!(later.allowed);
        assert_eq!(later.remaining, 1);
    }

    #[test]
    fn test_decision_second_rounding() {
        let decision = Decision {
            allowed: false,
            limit: 1,
            remaining: 0,
            reset_at_ms: 60_500,
        };

        assert_eq!(decision.reset_secs(), 61);
        assert_eq!(decision.retry_after_secs(500), 60);
        assert_eq!(decision.retry_after_secs(60_500), 0);
        assert_eq!(decision.retry_after_secs(70_000), 0);
    }

    #[test]
    fn test_clear_buckets() {
        let limiter = RateLimiter::new();
        limiter.check_at("k", &POLICY, 0);
        assert_eq!(limiter.bucket_count(), 1);

        limiter.clear();
        assert_eq!(limiter.bucket_count(), 0);
    }

    #[test]
    fn test_concurrent_checks_never_exceed_limit() {
        use std::sync::Arc;
        use std::thread;

        let limiter = Arc::new(RateLimiter::new());
        let policy = RateLimitPolicy::new(50, 60_000);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                thread::spawn(move || {
                    (0..25)
                        .filter(|_| limiter.check_at("k", &policy, 0).allowed)
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(admitted, 50);
        assert_eq!(limiter.current_count("k", 0), Some(50));
    }
}
