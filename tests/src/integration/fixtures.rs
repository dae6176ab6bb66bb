//! Shared fixtures: a started mesh with fast timings and scripted handlers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dm_02_message_router::{
    DeliveryContext, FnMessageHandler, HandlerError, MessageHandler, MessageRouterApi,
};
use mesh_runtime::{MeshConfig, MeshContainer, MeshRuntime};
use shared_types::{AgentMessage, MessageBuilder, MessageStatus, MessageType, SystemTimeSource, TimeSource};

/// Divisions every test mesh serves.
pub const DIVISIONS: [&str; 3] = ["division-a", "division-b", "division-c"];

/// Mesh configuration with millisecond timings.
pub fn fast_config(trust: &[&str]) -> MeshConfig {
    let mut config = MeshConfig {
        divisions: DIVISIONS.iter().map(|d| d.to_string()).collect(),
        trust: trust.iter().map(|t| t.parse().unwrap()).collect(),
        shutdown_grace: Duration::from_millis(500),
        ..MeshConfig::default()
    };
    config.router.workers_per_division = 2;
    config.router.long_poll_wait = Duration::from_millis(20);
    config.router.handler_timeout = Duration::from_millis(500);
    config.router.backoff_base = Duration::from_millis(5);
    config.router.backoff_cap = Duration::from_millis(40);
    config.router.visibility_timeout = Duration::from_secs(5);
    config
}

/// A started runtime.
pub struct TestMesh {
    runtime: MeshRuntime,
    /// Services of the runtime.
    pub services: Arc<MeshContainer>,
}

impl TestMesh {
    /// Start a mesh trusting `trust` rules.
    pub fn start(trust: &[&str]) -> Self {
        Self::start_with(fast_config(trust))
    }

    /// Start a mesh from `config`.
    pub fn start_with(config: MeshConfig) -> Self {
        let mut runtime = MeshRuntime::new(config).unwrap();
        runtime.start().unwrap();
        let services = runtime.container();
        Self { runtime, services }
    }

    /// Message from `agent-a` in `source` to `agent-x` in `target`.
    pub fn message(&self, source: &str, target: &str, message_type: MessageType) -> MessageBuilder {
        AgentMessage::builder("agent-a", source, "agent-x", target, message_type)
    }

    /// Wait until `message_id` reaches `status`, returning the last status seen.
    pub async fn wait_for(&self, message_id: &str, status: MessageStatus) -> Option<MessageStatus> {
        let mut seen = None;
        for _ in 0..300 {
            seen = self.services.router.get_status(message_id);
            if seen == Some(status) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        seen
    }

    /// Stop the runtime.
    pub async fn stop(self) {
        self.runtime.shutdown().await;
    }
}

/// Current wall-clock millis.
pub fn now() -> u64 {
    SystemTimeSource.now()
}

/// Handler failing its first `failures` calls, with a call counter.
pub fn failing_times(failures: usize) -> (Arc<AtomicUsize>, Arc<dyn MessageHandler>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let handler = FnMessageHandler::new(move |_msg: AgentMessage, _ctx: DeliveryContext| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < failures {
                Err(HandlerError::failed(format!("downstream unavailable ({n})")))
            } else {
                Ok(())
            }
        }
    });
    (calls, Arc::new(handler))
}

/// Register `handler` for requests on the mesh.
pub fn handle_requests(mesh: &TestMesh, handler: Arc<dyn MessageHandler>) {
    mesh.services
        .router
        .register_handler(MessageType::Request, handler);
}
