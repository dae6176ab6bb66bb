//! # Inbound Ports
//!
//! API trait defining what the Message Router offers producers and
//! consumers.

use crate::domain::{DeadLetter, HandlerId, QueueAttributes, RouteOutcome, RouterResult};
use crate::ports::outbound::MessageHandler;
use async_trait::async_trait;
use shared_bus::{EventFilter, EventHandler, SubscriptionId};
use shared_types::{AgentMessage, DeliveryReceipt, MessageStatus, MessageType};
use std::sync::Arc;
use std::time::Duration;

/// Message Router API - inbound port.
#[async_trait]
pub trait MessageRouterApi: Send + Sync {
    /// Route a message and report the acceptance outcome as a receipt.
    ///
    /// Enqueued messages get an unrecorded `pending` receipt; the delivery
    /// outcome is polled with [`get_status`](Self::get_status) or
    /// [`receipts`](Self::receipts). Rejections and expiry return the
    /// recorded terminal receipt. Malformed or duplicate messages fail.
    async fn send(&self, message: AgentMessage) -> RouterResult<DeliveryReceipt>;

    /// Route a message: expiry check, registry check, authorization,
    /// enqueue, publish.
    async fn route(&self, message: AgentMessage) -> RouterResult<RouteOutcome>;

    /// Current status, `None` if the id is unknown.
    fn get_status(&self, message_id: &str) -> Option<MessageStatus>;

    /// Every receipt recorded for the message, oldest first.
    fn receipts(&self, message_id: &str) -> Vec<DeliveryReceipt>;

    /// Re-enqueue retryable failed messages younger than `max_age`.
    ///
    /// Returns how many were requeued.
    async fn retry_failed(&self, max_age: Duration) -> RouterResult<usize>;

    /// Request cooperative cancellation.
    ///
    /// Returns `false` if the message is unknown or already terminal.
    async fn cancel(&self, message_id: &str) -> bool;

    /// Register a handler for one message type.
    fn register_handler(
        &self,
        message_type: MessageType,
        handler: Arc<dyn MessageHandler>,
    ) -> HandlerId;

    /// Remove a handler. Returns `false` if it was not registered.
    fn unregister_handler(&self, handler_id: &HandlerId) -> bool;

    /// Subscribe to bus events of `event_type`, optionally filtered.
    fn subscribe(
        &self,
        event_type: &str,
        handler: Arc<dyn EventHandler>,
        filter: Option<EventFilter>,
    ) -> SubscriptionId;

    /// Remove a bus subscription. Returns `false` if it did not exist.
    fn unsubscribe(&self, subscription_id: &SubscriptionId) -> bool;

    /// Dead letters of a division, oldest first.
    async fn dead_letters(&self, division: &str) -> RouterResult<Vec<DeadLetter>>;

    /// Route a copy of a dead letter under a new id.
    ///
    /// The copy carries `metadata["replayed_from"]` with the original id;
    /// the original stays terminal. Returns the copy's acceptance receipt.
    async fn replay_dead_letter(
        &self,
        division: &str,
        message_id: &str,
    ) -> RouterResult<DeliveryReceipt>;

    /// Approximate queue counters of a division.
    async fn queue_attributes(&self, division: &str) -> RouterResult<QueueAttributes>;
}
