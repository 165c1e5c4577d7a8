//! Retry policy with exponential backoff
//!
//! Delay before retry `n` (1-based) is `2^(n-1)` seconds: 1s, 2s, 4s, ...
//! Sleeping goes through the `Sleeper` trait so tests can observe delays
//! without waiting for them.

use async_trait::async_trait;
use std::time::Duration;

/// Longest exponent applied, keeps the shift well inside u64
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Suspends the caller for a backoff delay
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

/// Production sleeper backed by the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// How many times a retryable failure is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Backoff before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        Duration::from_secs(1u64 << exponent)
    }
}
