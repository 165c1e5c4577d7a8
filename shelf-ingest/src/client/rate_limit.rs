//! Token-bucket request limiter
//!
//! Wraps a `governor` direct limiter configured as `requests_per_second` with
//! a burst of one token. Waiting is cancellable: the caller's token aborts
//! the wait instead of letting it run to completion.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::ClientError;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Shared limiter for every outbound request of one client
pub struct RequestLimiter {
    limiter: DirectLimiter,
    period: Duration,
}

impl RequestLimiter {
    /// Create a limiter allowing `rps` requests per second (fractions allowed)
    pub fn per_second(rps: f64) -> Result<Self, ClientError> {
        if !rps.is_finite() || rps <= 0.0 {
            return Err(ClientError::InvalidConfig(format!(
                "requests_per_second must be positive, got {}",
                rps
            )));
        }

        let period = Duration::try_from_secs_f64(1.0 / rps).map_err(|_| {
            ClientError::InvalidConfig(format!("requests_per_second {} is too small", rps))
        })?;
        let quota = Quota::with_period(period)
            .ok_or_else(|| {
                ClientError::InvalidConfig(format!("requests_per_second {} is too large", rps))
            })?
            .allow_burst(NonZeroU32::MIN);

        Ok(Self {
            limiter: RateLimiter::direct(quota),
            period,
        })
    }

    /// Minimum spacing between two requests
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait for a token, or return `Cancelled` as soon as `cancel` fires
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), ClientError> {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        if self.limiter.check().is_ok() {
            return Ok(());
        }

        tracing::debug!(period_ms = self.period.as_millis() as u64, "Rate limiting: waiting for token");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            _ = self.limiter.until_ready() => Ok(()),
        }
    }
}
