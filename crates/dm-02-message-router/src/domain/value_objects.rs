//! # Domain Value Objects
//!
//! Routing outcomes, queue records and the per-attempt delivery context.

use serde::{Deserialize, Serialize};
use shared_types::{AgentMessage, Timestamp};
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Error text recorded when a message is cancelled.
pub const CANCELLED: &str = "cancelled";

/// Error text recorded when no handler accepts a message.
pub const NO_HANDLER: &str = "no_handler";

/// Error text recorded when the TTL elapses before delivery.
pub const TTL_EXPIRED: &str = "ttl_expired";

/// Rejection reason when the registry does not know the target agent.
pub const UNKNOWN_AGENT: &str = "unknown_agent";

/// Metadata key linking a replayed message to its dead-lettered original.
pub const REPLAYED_FROM_METADATA_KEY: &str = "replayed_from";

/// Result of routing one message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteOutcome {
    /// Placed on the target division queue.
    Enqueued,
    /// Refused; the reason is also the receipt's error message.
    Rejected(String),
    /// TTL elapsed before routing.
    Expired,
}

impl RouteOutcome {
    /// Rejection reason, if rejected.
    pub fn rejection(&self) -> Option<&str> {
        match self {
            Self::Rejected(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Identifier of a registered message handler.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(String);

impl HandlerId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle of one receive of a queued message.
///
/// A new handle is issued on every receive, so a worker holding an expired
/// lease cannot settle a message another worker has since received.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LeaseId {
    /// Division queue the message was received from.
    pub division: String,
    /// Receipt handle.
    pub handle: u64,
}

/// A message received under a lease.
#[derive(Clone, Debug)]
pub struct LeasedMessage {
    /// Lease to settle with acknowledge / dead_letter.
    pub lease: LeaseId,
    /// Copy of the message as enqueued.
    pub message: AgentMessage,
    /// Times this entry has been received, including this one.
    pub receive_count: u32,
}

/// A message held in a division's dead-letter destination.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Message in its final state.
    pub message: AgentMessage,
    /// Why it was dead-lettered.
    pub reason: String,
    /// When it was dead-lettered (unix millis).
    pub dead_lettered_at: Timestamp,
    /// Receives before dead-lettering.
    pub receive_count: u32,
}

/// Approximate counters of one division queue.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueAttributes {
    /// Division the counters belong to.
    pub division: String,
    /// Messages available for receive.
    pub visible: usize,
    /// Messages currently leased.
    pub in_flight: usize,
    /// Messages waiting for their delay to elapse.
    pub delayed: usize,
    /// Messages in the dead-letter destination.
    pub dead_letters: usize,
}

/// Context handed to a handler for one delivery attempt.
#[derive(Clone, Debug)]
pub struct DeliveryContext {
    /// Division whose worker runs the attempt.
    pub division: String,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Deadline of this attempt.
    pub deadline: Duration,
    /// Cancelled when the producer cancels the message.
    pub cancellation: CancellationToken,
}

impl DeliveryContext {
    /// Check whether the delivery was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// What a worker did with one dequeued message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Handler succeeded.
    Delivered,
    /// Attempt failed; requeued after `delay`.
    Retrying {
        /// Backoff before the next attempt.
        delay: Duration,
    },
    /// Retries exhausted; moved to the dead-letter destination.
    DeadLettered,
    /// TTL elapsed before the attempt.
    Expired,
    /// Cancelled by the producer.
    Cancelled,
    /// No handler accepted the message.
    NoHandler,
    /// Already terminal when dequeued; dropped without a receipt.
    Skipped,
}
