//! Cross-crate flows against a running mesh.

pub mod fixtures;

mod delivery_flows;
mod dispatch_flows;
mod federation_flows;
