//! # Service Container
//!
//! ## Initialization Order
//!
//! ```text
//! 1. Event bus
//! 2. Division permissions (optional budget per division)
//! 3. Federation authorizer + trust table
//! 4. Agent registry
//! 5. Message router (queue derived from RouterConfig)
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use dm_01_federation::{FederationApi, FederationAuthorizer, InMemoryPermissionsStore};
use dm_02_message_router::{InMemoryAgentRegistry, MessageRouterService};
use shared_bus::InMemoryEventBus;
use shared_types::DivisionPermissions;
use tracing::info;

use crate::container::config::MeshConfig;

/// Federation authorizer backed by the in-memory permissions store.
pub type MeshFederation = FederationAuthorizer<InMemoryPermissionsStore>;

/// Every service of one mesh runtime.
pub struct MeshContainer {
    /// Configuration the services were built from.
    pub config: MeshConfig,
    /// Shared event bus.
    pub bus: Arc<InMemoryEventBus>,
    /// Division policies consulted by the authorizer.
    pub permissions: Arc<InMemoryPermissionsStore>,
    /// Trust gate.
    pub federation: Arc<MeshFederation>,
    /// Known agents.
    pub registry: Arc<InMemoryAgentRegistry>,
    /// Router and delivery workers.
    pub router: Arc<MessageRouterService>,
}

impl MeshContainer {
    /// Build every service. `config` must already be validated.
    pub fn new(config: MeshConfig) -> Result<Self> {
        let bus = Arc::new(InMemoryEventBus::new());

        let permissions = Arc::new(InMemoryPermissionsStore::new());
        if let Some(budget) = config.max_requests_per_minute {
            for division in &config.divisions {
                let mut policy = DivisionPermissions::new(division.clone());
                policy.max_requests_per_minute = budget;
                permissions.put(policy);
            }
        }

        let federation = Arc::new(FederationAuthorizer::new(Arc::clone(&permissions)));
        for rule in &config.trust {
            federation
                .register_trusted_division(
                    &rule.source,
                    &rule.target,
                    &rule.endpoint,
                    rule.actions.clone(),
                )
                .with_context(|| format!("Failed to trust {} -> {}", rule.source, rule.target))?;
        }

        let registry = Arc::new(InMemoryAgentRegistry::new());

        let mut builder = MessageRouterService::builder(federation.clone())
            .config(config.router.clone())
            .event_bus(Arc::clone(&bus));
        if config.require_registered_agents {
            builder = builder.registry(registry.clone());
        }
        let router = builder.build().context("Failed to build message router")?;

        info!(
            divisions = config.divisions.len(),
            trust_rules = config.trust.len(),
            "Mesh services initialized"
        );

        Ok(Self {
            config,
            bus,
            permissions,
            federation,
            registry,
            router: Arc::new(router),
        })
    }
}
