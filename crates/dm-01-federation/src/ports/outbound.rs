//! # Outbound Ports
//!
//! Traits for external dependencies of the authorizer.

use crate::domain::FederationResult;
use async_trait::async_trait;
use shared_types::DivisionPermissions;

/// Division Permissions collaborator - outbound port.
#[async_trait]
pub trait PermissionsProvider: Send + Sync {
    /// Get the policy of `division_id`.
    ///
    /// `Ok(None)` means the division publishes no policy; the gate then
    /// applies only the trust table.
    async fn get_permissions(&self, division_id: &str)
        -> FederationResult<Option<DivisionPermissions>>;
}
