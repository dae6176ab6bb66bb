//! # Domain Value Objects
//!
//! Authorization outcomes produced by the gate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a cross-division message was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// No trust entry for the (source, target) pair.
    UntrustedDivision,
    /// The trust entry does not list the action.
    ActionNotPermitted,
    /// The target division keeps the agent to itself.
    AgentRestricted,
    /// The target division refuses all cross-division invocation.
    InvocationDisabled,
    /// The source division exhausted its request budget.
    RateLimited,
}

impl DenyReason {
    /// Wire name, as surfaced in `authorization_denied: <reason>`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UntrustedDivision => "untrusted_division",
            Self::ActionNotPermitted => "action_not_permitted",
            Self::AgentRestricted => "agent_restricted",
            Self::InvocationDisabled => "invocation_disabled",
            Self::RateLimited => "rate_limited",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one authorization check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationDecision {
    /// The message may cross.
    Allow,
    /// The message is refused.
    Deny(DenyReason),
}

impl AuthorizationDecision {
    /// Check if allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Denial reason, if denied.
    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Self::Allow => None,
            Self::Deny(reason) => Some(*reason),
        }
    }
}
