//! # Delivery Receipt
//!
//! Immutable record of one delivery attempt's outcome.

use crate::message::{AgentMessage, MessageStatus};
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};

/// Outcome of one delivery attempt (or of a terminal routing decision).
///
/// Fields are read-only once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    message_id: String,
    status: MessageStatus,
    delivered_at: Timestamp,
    error_message: Option<String>,
    retry_count: u32,
}

impl DeliveryReceipt {
    /// Create a receipt.
    pub fn new(
        message_id: impl Into<String>,
        status: MessageStatus,
        delivered_at: Timestamp,
        error_message: Option<String>,
        retry_count: u32,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            status,
            delivered_at,
            error_message,
            retry_count,
        }
    }

    /// Receipt describing `message` in its current state.
    pub fn for_message(message: &AgentMessage, at: Timestamp, error: Option<String>) -> Self {
        Self::new(
            message.message_id(),
            message.status(),
            at,
            error,
            message.retry_count(),
        )
    }

    /// Message this receipt belongs to.
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Status recorded by the attempt.
    pub fn status(&self) -> MessageStatus {
        self.status
    }

    /// When the attempt finished (unix millis).
    pub fn delivered_at(&self) -> Timestamp {
        self.delivered_at
    }

    /// Failure reason, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// `retry_count` at the time of the attempt.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Whether the receipt records a terminal outcome.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
