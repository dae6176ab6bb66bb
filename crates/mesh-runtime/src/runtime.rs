//! # Mesh Runtime
//!
//! ## Startup Sequence
//!
//! 1. Validate configuration
//! 2. Build services (bus, federation, router)
//! 3. Install runtime handlers
//! 4. Spawn delivery workers and the TTL sweeper
//!
//! ## Shutdown Sequence
//!
//! 1. Signal every task through the shutdown channel
//! 2. Wait up to the grace period for workers to finish their attempt
//! 3. Abort whatever is still running

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::container::{MeshConfig, MeshContainer};
use crate::wiring::{self, Wiring};

/// The runtime hosting one set of divisions.
pub struct MeshRuntime {
    container: Arc<MeshContainer>,
    wiring: Wiring,
    tasks: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl MeshRuntime {
    /// Validate `config` and build every service.
    pub fn new(config: MeshConfig) -> Result<Self> {
        config.validate().context("Invalid mesh configuration")?;

        info!("Creating division mesh runtime");
        let container = Arc::new(MeshContainer::new(config)?);
        let wiring = wiring::wire(&container);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            container,
            wiring,
            tasks: Vec::new(),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Spawn the delivery workers and the sweeper.
    pub fn start(&mut self) -> Result<()> {
        if !self.tasks.is_empty() {
            anyhow::bail!("Mesh runtime already started");
        }

        let config = &self.container.config;
        info!("===========================================");
        info!("  Division Mesh Runtime v{}", env!("CARGO_PKG_VERSION"));
        info!("===========================================");

        self.tasks = self
            .container
            .router
            .start(&config.divisions, self.shutdown_rx.clone());

        info!(
            divisions = ?config.divisions,
            workers_per_division = config.router.workers_per_division,
            alert_subscription = %self.wiring.alerts.as_str(),
            "Mesh runtime running"
        );
        Ok(())
    }

    /// Services of this runtime.
    pub fn container(&self) -> Arc<MeshContainer> {
        Arc::clone(&self.container)
    }

    /// Stop every task, waiting up to the configured grace period.
    pub async fn shutdown(self) {
        info!("Initiating graceful shutdown...");

        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }

        let grace = self.container.config.shutdown_grace;
        let deadline = tokio::time::Instant::now() + grace;
        for mut task in self.tasks {
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Task ended abnormally"),
                Err(_) => {
                    warn!(grace_ms = grace.as_millis() as u64, "Task still running, aborting");
                    task.abort();
                }
            }
        }

        info!("Shutdown complete");
    }
}
