//! # Rate Limiter
//!
//! Token bucket limiter for cross-division request budgets.
//!
//! Divisions publish `max_requests_per_minute`; the federation gate keeps one
//! bucket per (source, target) pair. Time is passed in explicitly so the
//! limiter follows whatever [`crate::time::TimeSource`] the caller uses.

use crate::time::Timestamp;
use parking_lot::Mutex;

/// Token bucket rate limiter.
///
/// # Algorithm
///
/// - Tokens are added continuously at `refill_per_minute / 60_000` per ms
/// - Each request consumes one token
/// - Requests are rejected when no whole token is available
#[derive(Debug)]
pub struct RateLimiter {
    capacity: u64,
    refill_per_minute: u64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    /// Tokens scaled by 60_000 so per-ms refill stays integral.
    scaled_tokens: u128,
    last_refill: Timestamp,
}

const SCALE: u128 = 60_000;

impl RateLimiter {
    /// Create a full bucket.
    ///
    /// - `capacity`: maximum burst size
    /// - `refill_per_minute`: tokens added per minute
    pub fn new(capacity: u64, refill_per_minute: u64, now: Timestamp) -> Self {
        Self {
            capacity,
            refill_per_minute,
            state: Mutex::new(BucketState {
                scaled_tokens: u128::from(capacity) * SCALE,
                last_refill: now,
            }),
        }
    }

    /// Bucket allowing `per_minute` requests per minute with an equal burst.
    pub fn per_minute(per_minute: u64, now: Timestamp) -> Self {
        Self::new(per_minute, per_minute, now)
    }

    /// Try to take one token.
    ///
    /// Returns `true` if the request is allowed, `false` if rate limited.
    pub fn try_acquire(&self, now: Timestamp) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state, now);

        if state.scaled_tokens < SCALE {
            return false;
        }
        state.scaled_tokens -= SCALE;
        true
    }

    /// Whole tokens currently available.
    pub fn available(&self, now: Timestamp) -> u64 {
        let mut state = self.state.lock();
        self.refill(&mut state, now);
        u64::try_from(state.scaled_tokens / SCALE).unwrap_or(u64::MAX)
    }

    /// Configured burst size.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    fn refill(&self, state: &mut BucketState, now: Timestamp) {
        if now <= state.last_refill {
            return;
        }
        let elapsed_ms = u128::from(now - state.last_refill);
        let added = elapsed_ms * u128::from(self.refill_per_minute);
        let max = u128::from(self.capacity) * SCALE;

        state.scaled_tokens = (state.scaled_tokens + added).min(max);
        state.last_refill = now;
    }
}
