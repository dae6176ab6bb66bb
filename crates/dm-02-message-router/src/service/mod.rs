//! Message Router Service - routing, delivery and retry policy
//!
//! [`MessageRouterService`] is the producer/consumer facade. It owns a
//! shared routing core that the delivery workers and the expiry sweeper
//! also hold, so routing decisions and delivery outcomes go through the
//! same ledger.

mod handlers;
mod routing;
mod worker;


pub use handlers::HandlerRegistry;
pub use routing::SweepReport;
pub use worker::{DEAD_LETTER_ALERT, NO_HANDLER_ALERT};

use self::routing::RouterCore;
use self::worker::DeliveryWorker;
use crate::adapters::{InMemoryMessageQueue, QueueConfig};
use crate::config::RouterConfig;
use crate::domain::{
    DeadLetter, DeliveryOutcome, HandlerId, MessageLedger, QueueAttributes, RetryPolicy,
    RouteOutcome, RouterError, RouterResult, REPLAYED_FROM_METADATA_KEY, TTL_EXPIRED,
};
use crate::ports::{AgentRegistry, MessageHandler, MessageQueue, MessageRouterApi};
use async_trait::async_trait;
use dm_01_federation::FederationApi;
use serde_json::Value;
use shared_bus::{EventFilter, EventHandler, InMemoryEventBus, SubscriptionId};
use shared_types::{
    AgentMessage, DeliveryReceipt, MessageStatus, MessageType, SystemTimeSource, TimeSource,
    Timestamp,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Message Router implementation.
pub struct MessageRouterService {
    core: Arc<RouterCore>,
}

impl MessageRouterService {
    /// Start configuring a router that authorizes through `federation`.
    pub fn builder(federation: Arc<dyn FederationApi>) -> MessageRouterServiceBuilder {
        MessageRouterServiceBuilder {
            config: RouterConfig::default(),
            federation,
            queue: None,
            registry: None,
            bus: None,
            time: None,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &RouterConfig {
        &self.core.config
    }

    /// Event bus the router publishes on.
    pub fn event_bus(&self) -> Arc<InMemoryEventBus> {
        Arc::clone(&self.core.bus)
    }

    /// Spawn the delivery workers of `divisions` and the expiry sweeper.
    ///
    /// Every task stops once `shutdown` receives `true`.
    pub fn start(
        &self,
        divisions: &[String],
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = worker::spawn_workers(&self.core, divisions, &shutdown);
        handles.push(worker::spawn_sweeper(&self.core, shutdown));
        info!(
            divisions = divisions.len(),
            workers_per_division = self.core.config.workers_per_division,
            "Message router started"
        );
        handles
    }

    /// Receive and settle one message of `division` on the calling task.
    ///
    /// `None` when nothing became visible within the long-poll wait.
    pub async fn process_next(&self, division: &str) -> RouterResult<Option<DeliveryOutcome>> {
        DeliveryWorker::new(Arc::clone(&self.core), division)
            .process_next()
            .await
    }

    /// Run one expiry sweep now.
    pub async fn sweep(&self) -> RouterResult<SweepReport> {
        self.core.sweep().await
    }

    /// Number of registered message handlers.
    pub fn handler_count(&self) -> usize {
        self.core.handlers.len()
    }

    fn replay_of(original: &AgentMessage, now: Timestamp) -> RouterResult<AgentMessage> {
        let mut builder = AgentMessage::builder(
            original.source_agent_id.clone(),
            original.source_division_id.clone(),
            original.target_agent_id.clone(),
            original.target_division_id.clone(),
            original.message_type,
        )
        .payload(original.payload.clone())
        .ttl_secs(original.ttl_secs())
        .max_retries(original.max_retries())
        .priority(original.priority);

        if let Some(id) = &original.correlation_id {
            builder = builder.correlation_id(id.clone());
        }
        if let Some(id) = &original.trace_id {
            builder = builder.trace_id(id.clone());
        }
        if let Some(id) = &original.parent_message_id {
            builder = builder.parent_message_id(id.clone());
        }
        for (key, value) in &original.metadata {
            builder = builder.metadata(key.clone(), value.clone());
        }
        builder = builder.metadata(
            REPLAYED_FROM_METADATA_KEY,
            Value::String(original.message_id().to_string()),
        );
        Ok(builder.build(now)?)
    }
}

#[async_trait]
impl MessageRouterApi for MessageRouterService {
    async fn send(&self, message: AgentMessage) -> RouterResult<DeliveryReceipt> {
        let message_id = message.message_id().to_string();
        let retry_count = message.retry_count();

        let outcome = self.core.route(message).await?;
        let at = self.core.time.now();
        let receipt = match outcome {
            RouteOutcome::Enqueued => {
                DeliveryReceipt::new(message_id, MessageStatus::Pending, at, None, retry_count)
            }
            RouteOutcome::Rejected(reason) => {
                self.core.ledger.last_receipt(&message_id).unwrap_or_else(|| {
                    DeliveryReceipt::new(
                        message_id.clone(),
                        MessageStatus::Failed,
                        at,
                        Some(reason),
                        retry_count,
                    )
                })
            }
            RouteOutcome::Expired => {
                self.core.ledger.last_receipt(&message_id).unwrap_or_else(|| {
                    DeliveryReceipt::new(
                        message_id.clone(),
                        MessageStatus::Expired,
                        at,
                        Some(TTL_EXPIRED.to_string()),
                        retry_count,
                    )
                })
            }
        };
        Ok(receipt)
    }

    async fn route(&self, message: AgentMessage) -> RouterResult<RouteOutcome> {
        self.core.route(message).await
    }

    fn get_status(&self, message_id: &str) -> Option<MessageStatus> {
        self.core.ledger.status(message_id)
    }

    fn receipts(&self, message_id: &str) -> Vec<DeliveryReceipt> {
        self.core.ledger.receipts(message_id)
    }

    async fn retry_failed(&self, max_age: Duration) -> RouterResult<usize> {
        self.core.retry_failed(max_age).await
    }

    async fn cancel(&self, message_id: &str) -> bool {
        self.core.cancel(message_id)
    }

    fn register_handler(
        &self,
        message_type: MessageType,
        handler: Arc<dyn MessageHandler>,
    ) -> HandlerId {
        let id = self.core.handlers.register(message_type, handler);
        info!(handler_id = %id, message_type = %message_type, "Handler registered");
        id
    }

    fn unregister_handler(&self, handler_id: &HandlerId) -> bool {
        let removed = self.core.handlers.unregister(handler_id);
        if removed {
            info!(handler_id = %handler_id, "Handler unregistered");
        }
        removed
    }

    fn subscribe(
        &self,
        event_type: &str,
        handler: Arc<dyn EventHandler>,
        filter: Option<EventFilter>,
    ) -> SubscriptionId {
        self.core
            .bus
            .subscribe(event_type, filter.unwrap_or_default(), handler)
    }

    fn unsubscribe(&self, subscription_id: &SubscriptionId) -> bool {
        self.core.bus.unsubscribe(subscription_id)
    }

    async fn dead_letters(&self, division: &str) -> RouterResult<Vec<DeadLetter>> {
        self.core.queue.dead_letters(division).await
    }

    async fn replay_dead_letter(
        &self,
        division: &str,
        message_id: &str,
    ) -> RouterResult<DeliveryReceipt> {
        let not_found = || RouterError::DeadLetterNotFound {
            division: division.to_string(),
            message_id: message_id.to_string(),
        };

        let original = self
            .core
            .queue
            .dead_letters(division)
            .await?
            .into_iter()
            .find(|d| d.message.message_id() == message_id)
            .ok_or_else(not_found)?
            .message;
        let replay = Self::replay_of(&original, self.core.time.now())?;

        self.core
            .queue
            .take_dead_letter(division, message_id)
            .await?
            .ok_or_else(not_found)?;

        info!(
            message_id,
            replay_id = %replay.message_id(),
            division,
            "Replaying dead letter"
        );
        self.send(replay).await
    }

    async fn queue_attributes(&self, division: &str) -> RouterResult<QueueAttributes> {
        self.core.queue.attributes(division).await
    }
}

/// Builder for [`MessageRouterService`].
///
/// Defaults: in-memory queue derived from the config, a private event bus,
/// no Agent Registry, the system clock.
pub struct MessageRouterServiceBuilder {
    config: RouterConfig,
    federation: Arc<dyn FederationApi>,
    queue: Option<Arc<dyn MessageQueue>>,
    registry: Option<Arc<dyn AgentRegistry>>,
    bus: Option<Arc<InMemoryEventBus>>,
    time: Option<Arc<dyn TimeSource>>,
}

impl MessageRouterServiceBuilder {
    /// Use `config`.
    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom queue backend.
    pub fn queue(mut self, queue: Arc<dyn MessageQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Check target agents against `registry` before routing.
    pub fn registry(mut self, registry: Arc<dyn AgentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Publish on a shared bus.
    pub fn event_bus(mut self, bus: Arc<InMemoryEventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Use an explicit clock for timestamps and expiry.
    pub fn time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = Some(time);
        self
    }

    /// Validate the configuration and build the router.
    pub fn build(self) -> RouterResult<MessageRouterService> {
        self.config.validate()?;

        let time = self.time.unwrap_or_else(|| Arc::new(SystemTimeSource));
        let queue = self.queue.unwrap_or_else(|| {
            Arc::new(InMemoryMessageQueue::with_time_source(
                QueueConfig::from(&self.config),
                Arc::clone(&time),
            ))
        });
        let retry = RetryPolicy::new(self.config.backoff_base, self.config.backoff_cap);

        let core = RouterCore {
            config: self.config,
            queue,
            federation: self.federation,
            registry: self.registry,
            bus: self.bus.unwrap_or_default(),
            handlers: HandlerRegistry::new(),
            ledger: MessageLedger::new(),
            time,
            retry,
        };
        Ok(MessageRouterService {
            core: Arc::new(core),
        })
    }
}
