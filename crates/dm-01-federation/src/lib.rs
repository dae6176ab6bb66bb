//! # DM-01 Federation Authorizer
//!
//! Decides whether a message may cross a division boundary.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! Every request, response and event addressed to another division passes
//! this gate before it is enqueued:
//! - Trust relationships `(source, target) -> {endpoint, actions}`
//! - Per-division policy from the Division Permissions collaborator
//! - Request budget per division pair
//!
//! ## Deny Reasons
//!
//! | Reason | Trigger |
//! |--------|---------|
//! | `untrusted_division` | no trust entry for the pair |
//! | `action_not_permitted` | action missing from the entry |
//! | `agent_restricted` | target keeps the agent in-division |
//! | `invocation_disabled` | target refuses cross-division invocation |
//! | `rate_limited` | pair exceeded `max_requests_per_minute` |
//!
//! ## Module Structure
//!
//! ```text
//! dm-01-federation/
//! ├── domain/          # AuthorizationDecision, DenyReason, errors
//! ├── ports/           # FederationApi, PermissionsProvider
//! ├── adapters/        # InMemoryPermissionsStore
//! └── service.rs       # FederationAuthorizer
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

// Re-exports
pub use adapters::InMemoryPermissionsStore;
pub use domain::{AuthorizationDecision, DenyReason, FederationError, FederationResult};
pub use ports::{FederationApi, PermissionsProvider};
pub use service::FederationAuthorizer;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
