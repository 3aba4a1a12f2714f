//! Request-rate limits.
//!
//! Burst control only. These buckets live in process memory, are lost on
//! restart and are not shared between instances; correctness never depends
//! on them.
//!
//! | Operation | Default burst | Window |
//! |-----------|---------------|--------|
//! | wake      | 5             | 60 s   |
//! | mission   | 10            | 60 s   |
//! | item      | 10            | 60 s   |
//! | payment   | 10            | 60 s   |

use std::time::Duration;

use serde::Deserialize;

/// One token bucket: `capacity` requests, fully refilled over `window_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    pub capacity: u32,
    pub window_ms: u64,
}

impl BucketConfig {
    pub const fn new(capacity: u32, window_ms: u64) -> Self {
        Self {
            capacity,
            window_ms,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self::new(10, 60_000)
    }
}

/// Per-operation buckets, keyed by caller.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Disable to skip burst control entirely.
    pub enabled: bool,
    pub wake: BucketConfig,
    pub mission: BucketConfig,
    pub item: BucketConfig,
    pub payment: BucketConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            wake: BucketConfig::new(5, 60_000),
            mission: BucketConfig::new(10, 60_000),
            item: BucketConfig::new(10, 60_000),
            payment: BucketConfig::new(10, 60_000),
        }
    }
}
