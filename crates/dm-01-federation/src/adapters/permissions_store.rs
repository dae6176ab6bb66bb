//! In-memory Division Permissions store.

use crate::domain::FederationResult;
use crate::ports::PermissionsProvider;
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::DivisionPermissions;
use std::collections::HashMap;

/// Policies kept in process memory, keyed by division id.
#[derive(Debug, Default)]
pub struct InMemoryPermissionsStore {
    policies: RwLock<HashMap<String, DivisionPermissions>>,
}

impl InMemoryPermissionsStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the policy of `permissions.division_id`.
    pub fn put(&self, permissions: DivisionPermissions) {
        self.policies
            .write()
            .insert(permissions.division_id.clone(), permissions);
    }

    /// Remove a policy. Returns `false` if there was none.
    pub fn remove(&self, division_id: &str) -> bool {
        self.policies.write().remove(division_id).is_some()
    }
}

#[async_trait]
impl PermissionsProvider for InMemoryPermissionsStore {
    async fn get_permissions(
        &self,
        division_id: &str,
    ) -> FederationResult<Option<DivisionPermissions>> {
        Ok(self.policies.read().get(division_id).cloned())
    }
}
