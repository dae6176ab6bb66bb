//! # Domain Errors
//!
//! Error types for the Federation Authorizer.
//!
//! A denial is not an error: it is an [`AuthorizationDecision`] value. Errors
//! here mean the gate could not reach a decision or a management call was
//! malformed.
//!
//! [`AuthorizationDecision`]: super::AuthorizationDecision

use thiserror::Error;

/// Federation error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FederationError {
    /// The division permissions collaborator failed.
    #[error("Permissions unavailable for division {division}: {reason}")]
    PermissionsUnavailable {
        /// Division whose policy was requested.
        division: String,
        /// Collaborator failure.
        reason: String,
    },

    /// A trust registration was rejected.
    #[error("Invalid trust relationship {source_division} -> {target_division}: {reason}")]
    InvalidTrust {
        /// Source division.
        source_division: String,
        /// Target division.
        target_division: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Result alias for federation operations.
pub type FederationResult<T> = Result<T, FederationError>;
