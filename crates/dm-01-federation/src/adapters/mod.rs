//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implements outbound port traits for the authorizer.

mod permissions_store;

pub use permissions_store::InMemoryPermissionsStore;
