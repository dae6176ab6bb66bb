//! # Router Configuration
//!
//! Every tunable of the router, worker pool, queue and sweeper. Passed
//! explicitly at construction; nothing is read from globals.

use crate::domain::{RouterError, RouterResult};
use shared_types::message::{DEFAULT_MAX_RETRIES, DEFAULT_TTL_SECS};
use shared_types::{MessageBuilder, MessageType};
use std::time::Duration;

/// Router configuration.
#[derive(Clone, Debug)]
pub struct RouterConfig {
    /// TTL applied by [`RouterConfig::message`] (seconds).
    pub default_ttl_secs: u64,
    /// Retry bound applied by [`RouterConfig::message`].
    pub default_max_retries: u32,
    /// Concurrent delivery workers per division queue.
    pub workers_per_division: usize,
    /// Longest a worker blocks on an empty queue.
    pub long_poll_wait: Duration,
    /// Per-attempt handler deadline.
    pub handler_timeout: Duration,
    /// First retry delay.
    pub backoff_base: Duration,
    /// Retry delay cap.
    pub backoff_cap: Duration,
    /// Lease length granted on dequeue.
    pub visibility_timeout: Duration,
    /// Receives after which an abandoned lease is dead-lettered by the queue.
    pub max_receive_count: u32,
    /// Interval of the TTL sweep.
    pub sweep_interval: Duration,
    /// How long dead letters are kept.
    pub dead_letter_retention: Duration,
    /// Waiting time worth one priority level.
    pub aging_step: Duration,
    /// How long terminal messages stay queryable.
    pub ledger_retention: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: DEFAULT_TTL_SECS,
            default_max_retries: DEFAULT_MAX_RETRIES,
            workers_per_division: 4,
            long_poll_wait: Duration::from_secs(20),
            handler_timeout: Duration::from_secs(30),
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(60),
            visibility_timeout: Duration::from_secs(300),
            max_receive_count: 3,
            sweep_interval: Duration::from_secs(30),
            dead_letter_retention: Duration::from_secs(14 * 24 * 3600),
            aging_step: Duration::from_secs(30),
            ledger_retention: Duration::from_secs(24 * 3600),
        }
    }
}

impl RouterConfig {
    /// Check value ranges.
    pub fn validate(&self) -> RouterResult<()> {
        let invalid = |reason: &str| Err(RouterError::InvalidConfig(reason.to_string()));

        if self.default_ttl_secs == 0 {
            return invalid("default_ttl_secs must be positive");
        }
        if self.workers_per_division == 0 {
            return invalid("workers_per_division must be positive");
        }
        if self.handler_timeout.is_zero() {
            return invalid("handler_timeout must be positive");
        }
        if self.backoff_base > self.backoff_cap {
            return invalid("backoff_base must not exceed backoff_cap");
        }
        if self.visibility_timeout < self.handler_timeout {
            return invalid("visibility_timeout must cover handler_timeout");
        }
        if self.max_receive_count == 0 {
            return invalid("max_receive_count must be positive");
        }
        if self.sweep_interval.is_zero() || self.aging_step.is_zero() {
            return invalid("sweep_interval and aging_step must be positive");
        }
        Ok(())
    }

    /// Start a message carrying the configured TTL and retry bound.
    pub fn message(
        &self,
        source_agent_id: impl Into<String>,
        source_division_id: impl Into<String>,
        target_agent_id: impl Into<String>,
        target_division_id: impl Into<String>,
        message_type: MessageType,
    ) -> MessageBuilder {
        MessageBuilder::new(
            source_agent_id,
            source_division_id,
            target_agent_id,
            target_division_id,
            message_type,
        )
        .ttl_secs(self.default_ttl_secs)
        .max_retries(self.default_max_retries)
    }
}
