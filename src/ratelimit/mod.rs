//! Rate limiting logic and state management.

mod identity;
mod limiter;
mod policy;
mod store;

pub use identity::{client_identity, UNKNOWN_IDENTITY};
pub use limiter::{unix_now_ms, Decision, RateLimiter};
pub use policy::{presets, RateLimitPolicy};
pub use store::{Bucket, BucketStore, DEFAULT_CAPACITY, DEFAULT_ENTRY_TTL_MS};
