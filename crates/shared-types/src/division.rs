//! # Division Records
//!
//! Types exchanged with the Agent Registry and Division Permissions
//! collaborators, plus the federation trust entry.

use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Per-division access policy for traffic coming from other divisions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivisionPermissions {
    /// Division the policy belongs to.
    pub division_id: String,
    /// Divisions allowed to access this division's agents.
    #[serde(default)]
    pub allowed_divisions: Vec<String>,
    /// Agents shared with other divisions.
    #[serde(default)]
    pub shared_agents: Vec<String>,
    /// Agents reachable only from inside this division.
    #[serde(default)]
    pub restricted_agents: Vec<String>,
    /// Allow other divisions to discover this division's agents.
    pub allow_cross_division_discovery: bool,
    /// Allow other divisions to invoke this division's agents.
    pub allow_cross_division_invocation: bool,
    /// Request budget per source division.
    pub max_requests_per_minute: u64,
    /// Concurrent request budget per source division.
    pub max_concurrent_requests: u64,
    /// Emit an audit log line for every cross-division decision.
    pub audit_cross_division_access: bool,
}

impl DivisionPermissions {
    /// Permissive defaults for `division_id`.
    pub fn new(division_id: impl Into<String>) -> Self {
        Self {
            division_id: division_id.into(),
            allowed_divisions: Vec::new(),
            shared_agents: Vec::new(),
            restricted_agents: Vec::new(),
            allow_cross_division_discovery: true,
            allow_cross_division_invocation: true,
            max_requests_per_minute: 1000,
            max_concurrent_requests: 100,
            audit_cross_division_access: true,
        }
    }

    /// Mark `agent_id` as restricted to this division.
    pub fn with_restricted_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.restricted_agents.push(agent_id.into());
        self
    }

    /// Check whether outsiders are barred from `agent_id`.
    pub fn is_restricted(&self, agent_id: &str) -> bool {
        self.restricted_agents.iter().any(|a| a == agent_id)
    }
}

/// Trust granted by a target division to a source division.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustEntry {
    /// Gateway endpoint of the trusted division.
    pub endpoint: String,
    /// Actions the source division may perform.
    pub permissions: BTreeSet<String>,
    /// When the trust was registered (unix millis).
    pub granted_at: Timestamp,
}

impl TrustEntry {
    /// Create a trust entry.
    pub fn new<I, S>(endpoint: impl Into<String>, permissions: I, granted_at: Timestamp) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoint: endpoint.into(),
            permissions: permissions.into_iter().map(Into::into).collect(),
            granted_at,
        }
    }

    /// Check whether `action` is permitted.
    pub fn permits(&self, action: &str) -> bool {
        self.permissions.contains(action)
    }
}

/// Registry view of an agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Agent id.
    pub agent_id: String,
    /// Owning division.
    pub division_id: String,
    /// Invocation endpoint.
    pub endpoint: String,
    /// Permissions held by the agent.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Whether other divisions may use the agent.
    pub is_shareable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permissions_defaults() {
        let perms = DivisionPermissions::new("div-b");
        assert!(perms.allow_cross_division_invocation);
        assert_eq!(perms.max_requests_per_minute, 1000);
        assert!(!perms.is_restricted("agent-x"));
    }

    #[test]
    fn test_restricted_agent() {
        let perms = DivisionPermissions::new("div-b").with_restricted_agent("agent-x");
        assert!(perms.is_restricted("agent-x"));
        assert!(!perms.is_restricted("agent-y"));
    }

    #[test]
    fn test_trust_entry_permits() {
        let entry = TrustEntry::new("https://b.example", ["request", "invoke_agent"], 7);
        assert!(entry.permits("request"));
        assert!(!entry.permits("event"));
        assert_eq!(entry.granted_at, 7);
    }
}
