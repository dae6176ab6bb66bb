//! # Domain Errors
//!
//! Error types for the Message Router.
//!
//! Routing *decisions* (rejected, expired) are not errors; they come back as
//! [`RouteOutcome`](super::RouteOutcome) values with a recorded receipt.
//! Errors here reach the caller directly and leave nothing enqueued.

use dm_01_federation::FederationError;
use shared_types::MessageError;
use std::time::Duration;
use thiserror::Error;

/// Router error types.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Malformed message or illegal status change.
    #[error("Message error: {0}")]
    Message(#[from] MessageError),

    /// The message id was already routed.
    #[error("Duplicate message id: {0}")]
    DuplicateMessage(String),

    /// No dead letter with this id in the division.
    #[error("Dead letter not found: {division}/{message_id}")]
    DeadLetterNotFound {
        /// Division searched.
        division: String,
        /// Requested message id.
        message_id: String,
    },

    /// Queue backend failure.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Federation gate could not decide.
    #[error("Federation error: {0}")]
    Federation(#[from] FederationError),

    /// Agent Registry collaborator failed.
    #[error("Agent registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// Configuration out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result alias for router operations.
pub type RouterResult<T> = Result<T, RouterError>;

/// Queue backend errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The lease expired or was already settled.
    #[error("Lease {handle} not found in division {division}")]
    LeaseNotFound {
        /// Division of the lease.
        division: String,
        /// Receipt handle.
        handle: u64,
    },

    /// Backend unreachable.
    #[error("Queue unavailable: {0}")]
    Unavailable(String),
}

/// Failure reported by a message handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// The handler could not process the message; it may be retried.
    #[error("{0}")]
    Failed(String),

    /// The handler stopped because the delivery was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// The attempt exceeded its deadline.
    #[error("handler_timeout after {0:?}")]
    Timeout(Duration),
}

impl HandlerError {
    /// Shorthand for [`HandlerError::Failed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}
