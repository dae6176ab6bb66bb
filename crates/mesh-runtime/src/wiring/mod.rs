//! # Runtime Wiring
//!
//! Handlers the runtime installs on its own services:
//!
//! - [`AlertLogger`]: `"System Event"` alerts (dead letters, missing
//!   handlers) go to the log with the message and division fields
//! - [`HeartbeatSink`]: heartbeats are consumed by the runtime so they
//!   never surface as `no_handler` failures

use std::sync::Arc;

use async_trait::async_trait;
use dm_02_message_router::{
    DeliveryContext, HandlerError, HandlerId, MessageHandler, MessageRouterApi,
};
use shared_bus::{BusEvent, EventHandler, EventHandlerError, SubscriptionId, SYSTEM_EVENT};
use serde_json::Value;
use shared_types::{AgentMessage, MessageType};
use tracing::{debug, error, warn};

use crate::container::MeshContainer;

/// Logs router alerts.
pub struct AlertLogger;

#[async_trait]
impl EventHandler for AlertLogger {
    async fn handle(&self, event: BusEvent) -> Result<(), EventHandlerError> {
        let alert = text(&event, "alert");
        let message_id = text(&event, "messageId");
        let division = text(&event, "targetDivisionId");
        let reason = text(&event, "reason");

        if alert == dm_02_message_router::DEAD_LETTER_ALERT {
            error!(alert, message_id, division, reason, "Message dead-lettered");
        } else {
            warn!(alert, message_id, division, reason, "Router alert");
        }
        Ok(())
    }
}

fn text<'a>(event: &'a BusEvent, key: &str) -> &'a str {
    event.payload.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Accepts every heartbeat.
pub struct HeartbeatSink;

#[async_trait]
impl MessageHandler for HeartbeatSink {
    async fn handle(&self, message: AgentMessage, ctx: DeliveryContext) -> Result<(), HandlerError> {
        debug!(
            message_id = %message.message_id(),
            source_agent = %message.source_agent_id,
            division = %ctx.division,
            "Heartbeat received"
        );
        Ok(())
    }
}

/// Ids of everything [`wire`] installed.
#[derive(Debug, Clone)]
pub struct Wiring {
    /// Alert subscription.
    pub alerts: SubscriptionId,
    /// Heartbeat handler.
    pub heartbeats: HandlerId,
}

/// Install the runtime's own handlers.
pub fn wire(container: &MeshContainer) -> Wiring {
    let alerts = container
        .router
        .subscribe(SYSTEM_EVENT, Arc::new(AlertLogger), None);
    let heartbeats = container
        .router
        .register_handler(MessageType::Heartbeat, Arc::new(HeartbeatSink));
    Wiring { alerts, heartbeats }
}
