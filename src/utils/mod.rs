//! Process-level helpers shared by the engine and the binary.

pub mod bootstrap;
pub mod rate_limit;
pub mod retry;

pub use rate_limit::{NoopRateLimiter, RateLimitedOp, RateLimiter, Throttled, TokenBucketLimiter};
