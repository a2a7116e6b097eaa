//! Token-bucket rate limiting for outbound provider calls.
//!
//! One [`TokenBucket`] exists per external provider (GitHub, OpenAI,
//! Anthropic) and is shared by every in-flight review. The refill-then-
//! decrement sequence runs under a single async mutex so concurrent tasks
//! can never observe a partially refilled bucket; buckets for different
//! providers are independent instances and never serialize against each
//! other.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Bucket state guarded by the mutex.
struct BucketState {
    /// Tokens currently available, always within `[0, capacity]`.
    tokens: u32,
    /// Last time a refill actually added tokens.
    last_refill: Instant,
}

/// Token bucket allowing `capacity` operations per `period`.
pub struct TokenBucket {
    capacity: u32,
    period: Duration,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket allowing `capacity` operations per
    /// `period_secs` seconds. A zero capacity is clamped to one.
    pub fn new(capacity: u32, period_secs: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            period: Duration::from_secs(period_secs.max(1)),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Bucket allowing `per_minute` operations per 60-second window.
    pub fn per_minute(per_minute: u32) -> Self {
        Self::new(per_minute, 60)
    }

    /// Try to take one token, refilling first. Returns `false` without
    /// blocking when the bucket is empty.
    ///
    /// Refill adds `elapsed_secs * capacity / period_secs` whole tokens;
    /// `last_refill` only advances when at least one token was added, so
    /// fractional progress between calls is never lost.
    pub async fn acquire(&self) -> bool {
        let mut state = self.state.lock().await;

        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        let to_add = (elapsed * f64::from(self.capacity) / self.period.as_secs_f64()) as u32;
        if to_add > 0 {
            state.tokens = (state.tokens + to_add).min(self.capacity);
            state.last_refill = now;
        }

        if state.tokens > 0 {
            state.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Wait until a token is available, then take it.
    ///
    /// Sleeps `period / capacity` between attempts; only the calling task
    /// is suspended.
    pub async fn wait(&self) {
        while !self.acquire().await {
            let retry_after = self.period.as_secs_f64() / f64::from(self.capacity);
            tokio::time::sleep(Duration::from_secs_f64(retry_after)).await;
        }
    }

    /// Tokens currently available (after a refill pass).
    pub async fn available(&self) -> u32 {
        let mut state = self.state.lock().await;

        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        let to_add = (elapsed * f64::from(self.capacity) / self.period.as_secs_f64()) as u32;
        if to_add > 0 {
            state.tokens = (state.tokens + to_add).min(self.capacity);
            state.last_refill = now;
        }

        state.tokens
    }
}
