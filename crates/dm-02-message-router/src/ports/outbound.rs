//! # Outbound Ports
//!
//! Dependencies the router drives: the per-division queue, the Agent
//! Registry and the handlers that consume delivered messages.

use crate::domain::{
    DeadLetter, DeliveryContext, HandlerError, LeaseId, LeasedMessage, QueueAttributes,
    RouterResult,
};
use async_trait::async_trait;
use shared_types::{AgentMessage, AgentRecord, Timestamp};
use std::future::Future;
use std::time::Duration;

/// Durable point-to-point queue, one logical queue per division.
///
/// Delivery is at-least-once: a received message stays invisible for the
/// lease period and reappears if not settled. Each division owns a
/// dead-letter destination.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Append `message` to `division`'s queue, visible after `delay`.
    async fn enqueue(
        &self,
        division: &str,
        message: AgentMessage,
        delay: Duration,
    ) -> RouterResult<()>;

    /// Receive the next visible message, waiting up to `wait` for one.
    async fn dequeue(&self, division: &str, wait: Duration) -> RouterResult<Option<LeasedMessage>>;

    /// Remove a received message for good.
    async fn acknowledge(&self, lease: &LeaseId) -> RouterResult<()>;

    /// Push the lease deadline `extension` into the future.
    async fn extend_lease(&self, lease: &LeaseId, extension: Duration) -> RouterResult<()>;

    /// Move a received message to the division's dead-letter destination.
    ///
    /// `message` replaces the queued copy so the dead letter carries the
    /// final status and retry count.
    async fn dead_letter(
        &self,
        lease: &LeaseId,
        message: AgentMessage,
        reason: &str,
    ) -> RouterResult<()>;

    /// Dead letters of `division`, oldest first.
    async fn dead_letters(&self, division: &str) -> RouterResult<Vec<DeadLetter>>;

    /// Remove and return one dead letter.
    async fn take_dead_letter(
        &self,
        division: &str,
        message_id: &str,
    ) -> RouterResult<Option<DeadLetter>>;

    /// Dead letters the queue produced on its own (lapsed leases) since the
    /// last call. Each one is reported once.
    async fn reclaim_abandoned(&self) -> RouterResult<Vec<DeadLetter>>;

    /// Drop dead letters older than `cutoff`. Returns how many were dropped.
    async fn purge_dead_letters(&self, cutoff: Timestamp) -> RouterResult<usize>;

    /// Approximate counters for `division`.
    async fn attributes(&self, division: &str) -> RouterResult<QueueAttributes>;
}

/// Agent Registry collaborator.
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    /// Look up an agent. `Ok(None)` means the agent is unknown.
    async fn lookup_agent(&self, agent_id: &str) -> RouterResult<Option<AgentRecord>>;
}

/// Consumer of delivered messages.
///
/// The router picks the first registered handler, in registration order,
/// whose [`can_handle`](MessageHandler::can_handle) accepts the message.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Whether this handler wants `message`.
    fn can_handle(&self, _message: &AgentMessage) -> bool {
        true
    }

    /// Process one delivery attempt.
    ///
    /// Should return promptly with [`HandlerError::Cancelled`] once
    /// `ctx.cancellation` fires.
    async fn handle(&self, message: AgentMessage, ctx: DeliveryContext) -> Result<(), HandlerError>;
}

/// Closure-backed [`MessageHandler`] accepting every message.
pub struct FnMessageHandler<F> {
    f: F,
}

impl<F> FnMessageHandler<F> {
    /// Wrap `f`.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> MessageHandler for FnMessageHandler<F>
where
    F: Fn(AgentMessage, DeliveryContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, message: AgentMessage, ctx: DeliveryContext) -> Result<(), HandlerError> {
        (self.f)(message, ctx).await
    }
}
