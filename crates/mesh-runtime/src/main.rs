//! # Division Mesh Runtime
//!
//! Hosts the federation gate, the message router and the delivery workers
//! of the divisions listed in `DM_DIVISIONS`.
//!
//! ```text
//! producer ──send──► Router ──authorize──► Federation
//!                      │
//!                      ├──publish──► Event Bus ──► subscribers
//!                      ▼
//!               division queue ──► Delivery Workers ──► handlers
//!                      │
//!                      └──► dead letters (14 days)
//! ```

use anyhow::{Context, Result};
use tracing::info;

use dm_telemetry::init_logging;
use mesh_runtime::{MeshConfig, MeshRuntime};

#[tokio::main]
async fn main() -> Result<()> {
    let config = MeshConfig::from_env().context("Failed to load configuration")?;

    init_logging(&config.telemetry).context("Failed to initialize logging")?;

    let mut runtime = MeshRuntime::new(config)?;
    runtime.start()?;

    info!("Mesh is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await;
    Ok(())
}
