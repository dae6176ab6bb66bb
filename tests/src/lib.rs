//! # Division Mesh Test Suite
//!
//! End-to-end flows across the federation gate, the router, the delivery
//! workers and the event bus, driven through a running [`MeshRuntime`].
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/integration/
//! │   ├── federation_flows.rs   # trust, denial, same-division bypass
//! │   ├── delivery_flows.rs     # retries, dead letters, expiry, replay
//! │   └── dispatch_flows.rs     # bus subscriptions and alerts
//! └── benches/
//!     └── router_benchmarks.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p dm-tests
//! cargo test -p dm-tests integration::delivery_flows
//! cargo bench -p dm-tests
//! ```
//!
//! [`MeshRuntime`]: mesh_runtime::MeshRuntime

pub mod integration;
