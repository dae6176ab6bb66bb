//! # Mesh Container
//!
//! Holds the shared bus, the federation authorizer and the router, built
//! once from a validated [`MeshConfig`].

pub mod config;
pub mod services;

pub use config::{ConfigError, MeshConfig, TrustRule};
pub use services::{MeshContainer, MeshFederation};
