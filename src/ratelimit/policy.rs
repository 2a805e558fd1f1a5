//! Rate limit policies and named presets.

use serde::{Deserialize, Serialize};

/// A rate limit policy: the maximum number of requests admitted within a
/// fixed time window.
///
/// Policies are immutable value objects. They are either taken from the
/// [`presets`] table or supplied by the caller with arbitrary values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Maximum requests allowed per window.
    pub limit: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl RateLimitPolicy {
    /// Create a new policy.
    pub const fn new(limit: u32, window_ms: u64) -> Self {
        Self { limit, window_ms }
    }
}

/// Named policy presets for common endpoint sensitivity classes.
///
/// All presets share a one-minute window and differ only in how many
/// requests they admit per window.
pub mod presets {
    use super::RateLimitPolicy;

    /// Login, signup, and password-reset style endpoints.
    pub const AUTH: RateLimitPolicy = RateLimitPolicy::new(10, 60_000);
    /// General mutating API endpoints.
    pub const API: RateLimitPolicy = RateLimitPolicy::new(30, 60_000);
    /// Read-only endpoints.
    pub const READONLY: RateLimitPolicy = RateLimitPolicy::new(60, 60_000);
    /// Endpoints backed by expensive computation (report generation, exports).
    pub const EXPENSIVE: RateLimitPolicy = RateLimitPolicy::new(5, 60_000);
}
