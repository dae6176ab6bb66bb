//! # Inbound Ports
//!
//! API trait defining what the Federation Authorizer can do.

use crate::domain::{AuthorizationDecision, FederationResult};
use async_trait::async_trait;
use shared_types::TrustEntry;

/// Federation API - inbound port.
///
/// Decisions are evaluated per message; a revoked trust entry affects the
/// next call, never a decision already returned.
#[async_trait]
pub trait FederationApi: Send + Sync {
    /// Decide whether `source_division` may perform `action` on
    /// `target_agent_id` in `target_division`.
    async fn authorize(
        &self,
        source_division: &str,
        target_division: &str,
        target_agent_id: &str,
        action: &str,
    ) -> FederationResult<AuthorizationDecision>;

    /// Trust `source_division` to perform `permissions` in `target_division`.
    ///
    /// Replaces an existing entry and resets `granted_at`.
    fn register_trusted_division(
        &self,
        source_division: &str,
        target_division: &str,
        endpoint: &str,
        permissions: Vec<String>,
    ) -> FederationResult<TrustEntry>;

    /// Revoke trust. Returns `false` if there was none.
    fn unregister_trusted_division(&self, source_division: &str, target_division: &str) -> bool;

    /// Get the trust entry for a pair.
    fn trust_entry(&self, source_division: &str, target_division: &str) -> Option<TrustEntry>;

    /// Every division trusted by `target_division`, sorted by source.
    fn trusted_divisions(&self, target_division: &str) -> Vec<(String, TrustEntry)>;
}
