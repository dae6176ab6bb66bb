//! # Retry Policy
//!
//! Exponential backoff between delivery attempts.
//!
//! The delay after a failed attempt is `base × 2^n`, clamped to `cap`, where
//! `n` is the message's `retry_count` at the time of that attempt. The first
//! retry therefore waits `base`.

use std::time::Duration;

/// Backoff policy for failed deliveries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base: Duration,
    /// Maximum delay.
    pub cap: Duration,
}

impl RetryPolicy {
    /// Create a policy.
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Delay after the attempt made with `retry_count` retries behind it.
    pub fn delay(&self, retry_count: u32) -> Duration {
        let factor = 2u32.checked_pow(retry_count).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.cap, |d| d.min(self.cap))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}
