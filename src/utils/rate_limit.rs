//! Per-caller request throttling.
//!
//! Buckets live in process memory only. A restart or a second instance
//! starts with full buckets.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::config::{BucketConfig, RateLimitConfig};

/// Operation classes with their own bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitedOp {
    Wake,
    Mission,
    Item,
    Payment,
}

impl RateLimitedOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitedOp::Wake => "wake",
            RateLimitedOp::Mission => "mission",
            RateLimitedOp::Item => "item",
            RateLimitedOp::Payment => "payment",
        }
    }
}

/// Rejection with the time until a token is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttled {
    pub retry_after_ms: u64,
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Take one token for `caller` from the `op` bucket.
    async fn check(&self, op: RateLimitedOp, caller: &str) -> Result<(), Throttled>;
}

/// Limiter that admits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRateLimiter;

#[async_trait]
impl RateLimiter for NoopRateLimiter {
    async fn check(&self, _op: RateLimitedOp, _caller: &str) -> Result<(), Throttled> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Bucket count above which idle buckets are swept on the next check.
const PRUNE_ABOVE: usize = 10_000;

/// Token bucket per `"{operation}:{caller}"`.
#[derive(Debug)]
pub struct TokenBucketLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<String, Bucket>>,
    prune_above: usize,
}

impl TokenBucketLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
            prune_above: PRUNE_ABOVE,
        }
    }

    /// Longest refill window across operations. A bucket idle for that long
    /// is full again, so forgetting it changes nothing.
    fn full_after(&self) -> Duration {
        let longest = [
            self.config.wake,
            self.config.mission,
            self.config.item,
            self.config.payment,
        ]
        .iter()
        .map(|cfg| cfg.window_ms)
        .max()
        .unwrap_or(0);
        Duration::from_millis(longest)
    }

    fn bucket_config(&self, op: RateLimitedOp) -> BucketConfig {
        match op {
            RateLimitedOp::Wake => self.config.wake,
            RateLimitedOp::Mission => self.config.mission,
            RateLimitedOp::Item => self.config.item,
            RateLimitedOp::Payment => self.config.payment,
        }
    }

    async fn check_at(
        &self,
        op: RateLimitedOp,
        caller: &str,
        now: Instant,
    ) -> Result<(), Throttled> {
        if !self.config.enabled {
            return Ok(());
        }
        let cfg = self.bucket_config(op);
        if cfg.capacity == 0 {
            return Err(Throttled {
                retry_after_ms: cfg.window_ms,
            });
        }

        let capacity = f64::from(cfg.capacity);
        let window_ms = cfg.window_ms.max(1) as f64;

        let mut buckets = self.buckets.lock().await;
        if buckets.len() >= self.prune_above {
            let full_after = self.full_after();
            buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) < full_after);
        }
        let bucket = buckets
            .entry(format!("{}:{}", op.as_str(), caller))
            .or_insert(Bucket {
                tokens: capacity,
                last_refill: now,
            });

        let elapsed_ms = now.saturating_duration_since(bucket.last_refill).as_secs_f64() * 1000.0;
        bucket.tokens = (bucket.tokens + elapsed_ms * capacity / window_ms).min(capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(());
        }

        let missing = 1.0 - bucket.tokens;
        Err(Throttled {
            retry_after_ms: (missing * window_ms / capacity).ceil() as u64,
        })
    }

}

#[async_trait]
impl RateLimiter for TokenBucketLimiter {
    async fn check(&self, op: RateLimitedOp, caller: &str) -> Result<(), Throttled> {
        self.check_at(op, caller, Instant::now()).await
    }
}
