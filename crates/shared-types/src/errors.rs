//! # Error Types
//!
//! Errors raised by the message model itself.

use crate::message::MessageStatus;
use thiserror::Error;

/// Errors related to message construction and lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    /// A required field is missing or out of range.
    #[error("Malformed message: {field} {reason}")]
    Malformed {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// Status change outside the message lifecycle.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: MessageStatus,
        /// Attempted status.
        to: MessageStatus,
    },

    /// `retry_count` already reached `max_retries`.
    #[error("Retries exhausted (max_retries={max_retries})")]
    RetriesExhausted {
        /// Configured bound.
        max_retries: u32,
    },

    /// Payload could not be (de)serialized.
    #[error("Payload encoding error: {0}")]
    Encoding(String),
}

impl From<serde_json::Error> for MessageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}
