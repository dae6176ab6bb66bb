//! Routing core shared by the service facade, the delivery workers and the
//! expiry sweeper.
//!
//! ## Route algorithm
//!
//! 1. Validate the envelope; malformed or duplicate ids fail immediately.
//! 2. TTL elapsed: status `expired`, outcome `Expired`.
//! 3. Registry configured and the target agent unknown: `unknown_agent`.
//! 4. Request/response/event to another division: federation check;
//!    denial sets `failed` with `authorization_denied: <reason>`.
//! 5. Enqueue on the target division queue.
//! 6. Publish on the event bus when a subscription listens for the type.
//!
//! Steps 2-4 record exactly one receipt and never enqueue.

use crate::config::RouterConfig;
use crate::domain::{
    DeadLetter, LedgerEntry, MessageLedger, RetryPolicy, RouteOutcome, RouterError, RouterResult, CANCELLED,
    TTL_EXPIRED, UNKNOWN_AGENT,
};
use crate::ports::{AgentRegistry, MessageQueue};
use crate::service::handlers::HandlerRegistry;
use crate::service::worker::DEAD_LETTER_ALERT;
use dm_01_federation::{AuthorizationDecision, FederationApi};
use serde_json::{json, Value};
use shared_bus::{
    BusEvent, EventPublisher, InMemoryEventBus, AGENT_HEARTBEAT, AGENT_MESSAGE,
    MESH_EVENT_SOURCE, SYSTEM_EVENT,
};
use shared_types::{AgentMessage, MessageError, MessageStatus, MessageType, TimeSource, Timestamp};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Counters of one sweep pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Messages expired because their TTL elapsed.
    pub expired: usize,
    /// Messages the queue dead-lettered after repeated lapsed leases.
    pub abandoned: usize,
    /// Dead letters dropped after the retention period.
    pub dead_letters_purged: usize,
    /// Terminal ledger entries forgotten.
    pub ledger_pruned: usize,
}

pub(crate) struct RouterCore {
    pub(crate) config: RouterConfig,
    pub(crate) queue: Arc<dyn MessageQueue>,
    pub(crate) federation: Arc<dyn FederationApi>,
    pub(crate) registry: Option<Arc<dyn AgentRegistry>>,
    pub(crate) bus: Arc<InMemoryEventBus>,
    pub(crate) handlers: HandlerRegistry,
    pub(crate) ledger: MessageLedger,
    pub(crate) time: Arc<dyn TimeSource>,
    pub(crate) retry: RetryPolicy,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl RouterCore {
    pub(crate) async fn route(&self, message: AgentMessage) -> RouterResult<RouteOutcome> {
        message.validate()?;
        if message.status() != MessageStatus::Pending {
            return Err(MessageError::Malformed {
                field: "status",
                reason: format!("must be pending when routed, was {}", message.status()),
            }
            .into());
        }
        if self.ledger.contains(message.message_id()) {
            return Err(RouterError::DuplicateMessage(
                message.message_id().to_string(),
            ));
        }

        let now = self.time.now();
        let message_id = message.message_id().to_string();

        if message.is_expired(now) {
            self.ledger.insert(LedgerEntry::new(message, now))?;
            self.ledger
                .update(&message_id, |e| {
                    e.finish(MessageStatus::Expired, now, Some(TTL_EXPIRED.to_string()))
                })
                .transpose()?;
            info!(message_id = %message_id, "Message expired before routing");
            return Ok(RouteOutcome::Expired);
        }

        if let Some(registry) = &self.registry {
            let known = registry
                .lookup_agent(&message.target_agent_id)
                .await?
                .is_some_and(|agent| agent.division_id == message.target_division_id);
            if !known {
                return self.reject(message, UNKNOWN_AGENT.to_string());
            }
        }

        if message.is_cross_division() && message.message_type.requires_federation() {
            let decision = self
                .federation
                .authorize(
                    &message.source_division_id,
                    &message.target_division_id,
                    &message.target_agent_id,
                    message.action(),
                )
                .await?;
            if let AuthorizationDecision::Deny(reason) = decision {
                return self.reject(message, format!("authorization_denied: {reason}"));
            }
        }

        let target_division = message.target_division_id.clone();
        let event = self.message_event(&message);

        let mut entry = LedgerEntry::new(message.clone(), now);
        entry.set_queued(true);
        self.ledger.insert(entry)?;

        if let Err(e) = self
            .queue
            .enqueue(&target_division, message, Duration::ZERO)
            .await
        {
            self.ledger.remove(&message_id);
            return Err(e);
        }
        info!(message_id = %message_id, division = %target_division, "Message enqueued");

        if let Some(event) = event {
            self.bus.publish(event).await;
        }
        Ok(RouteOutcome::Enqueued)
    }

    /// Record a terminal routing failure.
    fn reject(&self, message: AgentMessage, reason: String) -> RouterResult<RouteOutcome> {
        let now = self.time.now();
        let message_id = message.message_id().to_string();
        let target_division = message.target_division_id.clone();

        self.ledger.insert(LedgerEntry::new(message, now))?;
        self.ledger
            .update(&message_id, |e| e.fail_permanently(now, reason.clone()))
            .transpose()?;

        warn!(
            message_id = %message_id,
            division = %target_division,
            reason = %reason,
            "Message rejected"
        );
        Ok(RouteOutcome::Rejected(reason))
    }

    /// Bus event mirroring a routed message, if anyone listens for it.
    fn message_event(&self, message: &AgentMessage) -> Option<BusEvent> {
        let event_type = match message.message_type {
            MessageType::Heartbeat => AGENT_HEARTBEAT,
            _ => AGENT_MESSAGE,
        };
        if !self.bus.has_subscription_for(event_type) {
            return None;
        }

        let mut detail = json!({
            "messageId": message.message_id(),
            "messageType": message.message_type.as_str(),
            "sourceAgentId": message.source_agent_id,
            "sourceDivisionId": message.source_division_id,
            "targetAgentId": message.target_agent_id,
            "targetDivisionId": message.target_division_id,
            "priority": message.priority,
            "payload": message.payload,
        });
        if let Some(correlation_id) = &message.correlation_id {
            detail["correlationId"] = Value::String(correlation_id.clone());
        }
        if let Some(trace_id) = &message.trace_id {
            detail["traceId"] = Value::String(trace_id.clone());
        }

        Some(
            BusEvent::new(event_type, MESH_EVENT_SOURCE, detail)
                .with_published_at(self.time.now())
                .with_target(message.target_division_id.clone()),
        )
    }

    /// Publish an operational alert about `message`.
    pub(crate) async fn alert(&self, kind: &str, message: &AgentMessage, reason: &str) {
        let detail = json!({
            "alert": kind,
            "messageId": message.message_id(),
            "messageType": message.message_type.as_str(),
            "sourceDivisionId": message.source_division_id,
            "targetDivisionId": message.target_division_id,
            "targetAgentId": message.target_agent_id,
            "retryCount": message.retry_count(),
            "reason": reason,
        });
        let event = BusEvent::new(SYSTEM_EVENT, MESH_EVENT_SOURCE, detail)
            .with_published_at(self.time.now())
            .with_target(message.target_division_id.clone());
        self.bus.publish(event).await;
    }

    pub(crate) async fn retry_failed(&self, max_age: Duration) -> RouterResult<usize> {
        let now = self.time.now();
        let cutoff = now.saturating_sub(millis(max_age));
        let eligible = |e: &LedgerEntry| {
            e.message().status() == MessageStatus::Failed
                && e.is_retryable()
                && !e.is_queued()
                && !e.is_cancel_requested()
                && e.message().timestamp() >= cutoff
                && !e.message().is_expired(now)
        };

        let mut requeued = 0;
        for message_id in self.ledger.select(eligible) {
            let claimed = self
                .ledger
                .update(&message_id, |e| {
                    if !eligible(&*e) {
                        return None;
                    }
                    e.set_queued(true);
                    Some(e.message().clone())
                })
                .flatten();
            let Some(message) = claimed else {
                continue;
            };

            let division = message.target_division_id.clone();
            if let Err(e) = self.queue.enqueue(&division, message, Duration::ZERO).await {
                self.ledger.update(&message_id, |e| e.set_queued(false));
                return Err(e);
            }
            debug!(message_id = %message_id, division = %division, "Failed message requeued");
            requeued += 1;
        }

        if requeued > 0 {
            info!(requeued, "Requeued failed messages");
        }
        Ok(requeued)
    }

    pub(crate) fn cancel(&self, message_id: &str) -> bool {
        let now = self.time.now();
        let cancelled = self.ledger.update(message_id, |e| {
            if !e.request_cancel() {
                return false;
            }
            // Nothing will dequeue it again; settle now.
            if !e.is_queued() && !e.is_in_flight() {
                if let Err(err) = e.finish(MessageStatus::Expired, now, Some(CANCELLED.to_string())) {
                    debug!(message_id, error = %err, "Cancel raced with settlement");
                }
            }
            true
        });

        match cancelled {
            Some(true) => {
                info!(message_id, "Cancellation requested");
                true
            }
            _ => false,
        }
    }

    /// Settle a message the queue dead-lettered on its own.
    ///
    /// Returns `false` when the ledger already holds a terminal outcome.
    async fn settle_abandoned(&self, dead: &DeadLetter, now: Timestamp) -> bool {
        let message_id = dead.message.message_id();
        let settled = self.ledger.update(message_id, |e| {
            if e.message().status().is_terminal() {
                return None;
            }
            e.set_queued(false);
            e.finish(MessageStatus::Expired, now, Some(dead.reason.clone()))
                .ok()
                .map(|_| e.message().clone())
        });
        let Some(Some(message)) = settled else {
            return false;
        };

        warn!(
            message_id,
            division = %message.target_division_id,
            receive_count = dead.receive_count,
            reason = %dead.reason,
            "Abandoned message dead-lettered by queue"
        );
        self.alert(DEAD_LETTER_ALERT, &message, &dead.reason).await;
        true
    }

    pub(crate) async fn sweep(&self) -> RouterResult<SweepReport> {
        let now = self.time.now();
        let mut report = SweepReport::default();

        // Permanent failures are settled even though `failed` is not terminal.
        let due = |e: &LedgerEntry| {
            !e.message().status().is_terminal()
                && e.is_retryable()
                && e.message().is_expired(now)
        };
        for message_id in self.ledger.select(due) {
            let expired = self.ledger.update(&message_id, |e| {
                due(&*e)
                    && e
                        .finish(MessageStatus::Expired, now, Some(TTL_EXPIRED.to_string()))
                        .is_ok()
            });
            if expired == Some(true) {
                debug!(message_id = %message_id, "Message expired by sweep");
                report.expired += 1;
            }
        }

        for dead in self.queue.reclaim_abandoned().await? {
            if self.settle_abandoned(&dead, now).await {
                report.abandoned += 1;
            }
        }

        report.dead_letters_purged = self
            .queue
            .purge_dead_letters(now.saturating_sub(millis(self.config.dead_letter_retention)))
            .await?;
        report.ledger_pruned = self
            .ledger
            .prune_terminal(now.saturating_sub(millis(self.config.ledger_retention)));

        if report != SweepReport::default() {
            info!(
                expired = report.expired,
                abandoned = report.abandoned,
                dead_letters_purged = report.dead_letters_purged,
                ledger_pruned = report.ledger_pruned,
                "Sweep completed"
            );
        }
        Ok(report)
    }
}
