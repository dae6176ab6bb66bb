//! # Mesh Runtime Library
//!
//! Exposes the runtime's modules for testing. The entry point is the
//! `mesh-runtime` binary.
//!
//! ## Modular Structure
//!
//! - `container/` - configuration and the service container
//! - `wiring/` - handlers the runtime installs on its own services
//! - `runtime` - startup and graceful shutdown

#![warn(missing_docs)]

pub mod container;
pub mod runtime;
pub mod wiring;

pub use container::{ConfigError, MeshConfig, MeshContainer, TrustRule};
pub use runtime::MeshRuntime;
