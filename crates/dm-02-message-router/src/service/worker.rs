//! Delivery workers.
//!
//! Each worker long-polls one division queue and settles every message it
//! receives:
//!
//! | Condition | Status | Receipt | Queue |
//! |-----------|--------|---------|-------|
//! | already terminal | unchanged | none | ack |
//! | cancelled | expired (`cancelled`) | yes | ack |
//! | TTL elapsed | expired (`ttl_expired`) | yes | ack |
//! | no handler | failed (`no_handler`) | yes | ack |
//! | handler ok | delivered | yes | ack |
//! | failure, retries left | failed | yes | requeue with backoff, ack |
//! | failure, no retries left | expired | yes | dead-letter |

use crate::config::RouterConfig;
use crate::domain::{
    DeliveryContext, DeliveryOutcome, HandlerError, LeaseId, LeasedMessage, LedgerEntry,
    RouterResult, CANCELLED, NO_HANDLER, TTL_EXPIRED,
};
use crate::service::routing::RouterCore;
use shared_types::{AgentMessage, DeliveryReceipt, MessageError, MessageStatus, Timestamp};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pause after a queue error before polling again.
const ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// Alert kind published when a message is dead-lettered.
pub const DEAD_LETTER_ALERT: &str = "dead_letter";

/// Alert kind published when no handler accepts a message.
pub const NO_HANDLER_ALERT: &str = "no_handler";

enum Admission {
    Skip,
    Cancelled,
    Expired,
    Attempt {
        message: AgentMessage,
        token: CancellationToken,
    },
}

enum Settlement {
    Cancelled,
    Retry {
        message: AgentMessage,
        delay: Duration,
    },
    Exhausted {
        message: AgentMessage,
        reason: String,
    },
}

/// Worker bound to one division queue.
pub(crate) struct DeliveryWorker {
    core: Arc<RouterCore>,
    division: String,
}

impl DeliveryWorker {
    pub(crate) fn new(core: Arc<RouterCore>, division: impl Into<String>) -> Self {
        Self {
            core,
            division: division.into(),
        }
    }

    /// Receive and settle one message. `None` when the long poll timed out.
    pub(crate) async fn process_next(&self) -> RouterResult<Option<DeliveryOutcome>> {
        let leased = self
            .core
            .queue
            .dequeue(&self.division, self.core.config.long_poll_wait)
            .await?;
        match leased {
            Some(leased) => self.process(leased).await.map(Some),
            None => Ok(None),
        }
    }

    async fn process(&self, leased: LeasedMessage) -> RouterResult<DeliveryOutcome> {
        let LeasedMessage { lease, message, .. } = leased;
        let message_id = message.message_id().to_string();
        let now = self.core.time.now();

        // Messages put on the queue by another producer are tracked from here.
        self.core.ledger.adopt(message, now);

        let admission = self
            .core
            .ledger
            .update(&message_id, |e| admit(e, now))
            .transpose()?
            .unwrap_or(Admission::Skip);

        match admission {
            Admission::Skip => {
                debug!(message_id = %message_id, division = %self.division, "Dropping settled message");
                self.acknowledge(&lease).await;
                Ok(DeliveryOutcome::Skipped)
            }
            Admission::Cancelled => {
                info!(message_id = %message_id, division = %self.division, "Message cancelled");
                self.acknowledge(&lease).await;
                Ok(DeliveryOutcome::Cancelled)
            }
            Admission::Expired => {
                info!(message_id = %message_id, division = %self.division, "Message expired before delivery");
                self.acknowledge(&lease).await;
                Ok(DeliveryOutcome::Expired)
            }
            Admission::Attempt { message, token } => self.attempt(lease, message, token).await,
        }
    }

    async fn attempt(
        &self,
        lease: LeaseId,
        message: AgentMessage,
        token: CancellationToken,
    ) -> RouterResult<DeliveryOutcome> {
        let core = &self.core;
        let message_id = message.message_id().to_string();

        let Some(handler) = core.handlers.find(&message) else {
            let now = core.time.now();
            let settled = core.ledger.update(&message_id, |e| {
                e.end_attempt();
                e.fail_permanently(now, NO_HANDLER)
            });
            self.acknowledge(&lease).await;
            if !self.recorded(&message_id, settled) {
                return Ok(DeliveryOutcome::Skipped);
            }
            warn!(
                message_id = %message_id,
                division = %self.division,
                message_type = %message.message_type,
                "No handler for message"
            );
            core.alert(NO_HANDLER_ALERT, &message, NO_HANDLER).await;
            return Ok(DeliveryOutcome::NoHandler);
        };

        if token.is_cancelled() {
            return self.settle_cancelled(&lease, &message_id).await;
        }

        let timeout = core.config.handler_timeout;
        if let Err(e) = core.queue.extend_lease(&lease, lease_extension(&core.config)).await {
            warn!(message_id = %message_id, error = %e, "Could not extend lease");
        }

        let ctx = DeliveryContext {
            division: self.division.clone(),
            attempt: message.retry_count() + 1,
            deadline: timeout,
            cancellation: token.clone(),
        };
        debug!(message_id = %message_id, attempt = ctx.attempt, "Invoking handler");

        let mut task = tokio::spawn({
            let message = message.clone();
            async move { handler.handle(message, ctx).await }
        });
        let result = match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(HandlerError::failed(format!("handler panicked: {join}"))),
            Err(_) => {
                token.cancel();
                task.abort();
                Err(HandlerError::Timeout(timeout))
            }
        };

        let now = core.time.now();
        match result {
            Ok(()) => {
                let settled = core.ledger.update(&message_id, |e| {
                    e.end_attempt();
                    e.finish(MessageStatus::Delivered, now, None)
                });
                self.acknowledge(&lease).await;
                if !self.recorded(&message_id, settled) {
                    return Ok(DeliveryOutcome::Skipped);
                }
                info!(message_id = %message_id, division = %self.division, "Message delivered");
                Ok(DeliveryOutcome::Delivered)
            }
            Err(err) => self.settle_failure(lease, &message_id, err, now).await,
        }
    }

    async fn settle_failure(
        &self,
        lease: LeaseId,
        message_id: &str,
        err: HandlerError,
        now: Timestamp,
    ) -> RouterResult<DeliveryOutcome> {
        let core = &self.core;
        let settlement = core.ledger.update(message_id, |e| -> Result<Settlement, MessageError> {
            e.end_attempt();
            if e.is_cancel_requested() {
                e.finish(MessageStatus::Expired, now, Some(CANCELLED.to_string()))?;
                return Ok(Settlement::Cancelled);
            }
            if e.message().has_retries_left() {
                let delay = core.retry.delay(e.message().retry_count());
                e.record_retry(now, err.to_string())?;
                e.set_queued(true);
                return Ok(Settlement::Retry {
                    message: e.message().clone(),
                    delay,
                });
            }
            let reason = format!("retries_exhausted: {err}");
            e.finish(MessageStatus::Expired, now, Some(reason.clone()))?;
            Ok(Settlement::Exhausted {
                message: e.message().clone(),
                reason,
            })
        });

        let settlement = match settlement {
            Some(Ok(settlement)) => settlement,
            Some(Err(e)) => {
                debug!(message_id, error = %e, "Failure outcome discarded");
                self.acknowledge(&lease).await;
                return Ok(DeliveryOutcome::Skipped);
            }
            None => {
                self.acknowledge(&lease).await;
                return Ok(DeliveryOutcome::Skipped);
            }
        };

        match settlement {
            Settlement::Cancelled => {
                info!(message_id, division = %self.division, "Message cancelled during delivery");
                self.acknowledge(&lease).await;
                Ok(DeliveryOutcome::Cancelled)
            }
            Settlement::Retry { message, delay } => {
                warn!(
                    message_id,
                    division = %self.division,
                    retry_count = message.retry_count(),
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Delivery failed, retrying"
                );
                if let Err(e) = core.queue.enqueue(&self.division, message, delay).await {
                    // Stays failed and unqueued; retry_failed picks it up.
                    error!(message_id, error = %e, "Could not requeue message");
                    core.ledger.update(message_id, |e| e.set_queued(false));
                }
                self.acknowledge(&lease).await;
                Ok(DeliveryOutcome::Retrying { delay })
            }
            Settlement::Exhausted { message, reason } => {
                error!(
                    message_id,
                    division = %self.division,
                    retry_count = message.retry_count(),
                    reason = %reason,
                    "Retries exhausted, dead-lettering"
                );
                if let Err(e) = core.queue.dead_letter(&lease, message.clone(), &reason).await {
                    error!(message_id, error = %e, "Could not dead-letter message");
                }
                core.alert(DEAD_LETTER_ALERT, &message, &reason).await;
                Ok(DeliveryOutcome::DeadLettered)
            }
        }
    }

    async fn settle_cancelled(
        &self,
        lease: &LeaseId,
        message_id: &str,
    ) -> RouterResult<DeliveryOutcome> {
        let now = self.core.time.now();
        let settled = self.core.ledger.update(message_id, |e| {
            e.end_attempt();
            e.finish(MessageStatus::Expired, now, Some(CANCELLED.to_string()))
        });
        self.acknowledge(lease).await;
        if !self.recorded(message_id, settled) {
            return Ok(DeliveryOutcome::Skipped);
        }
        info!(message_id, division = %self.division, "Message cancelled");
        Ok(DeliveryOutcome::Cancelled)
    }

    /// Whether a settlement produced a receipt. A rejected transition means
    /// another path (sweep, cancel, a redelivery) settled the message first.
    fn recorded(
        &self,
        message_id: &str,
        settled: Option<Result<DeliveryReceipt, MessageError>>,
    ) -> bool {
        match settled {
            Some(Ok(_)) => true,
            Some(Err(e)) => {
                debug!(message_id, error = %e, "Outcome discarded");
                false
            }
            None => false,
        }
    }

    async fn acknowledge(&self, lease: &LeaseId) {
        if let Err(e) = self.core.queue.acknowledge(lease).await {
            warn!(division = %self.division, handle = lease.handle, error = %e, "Acknowledge failed");
        }
    }

    /// Poll until `shutdown` flips.
    pub(crate) async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(division = %self.division, "Delivery worker started");
        while !*shutdown.borrow() {
            tokio::select! {
                result = self.process_next() => {
                    if let Err(e) = result {
                        error!(division = %self.division, error = %e, "Delivery worker error");
                        tokio::time::sleep(ERROR_BACKOFF).await;
                    }
                }
                _ = shutdown.changed() => {
                    info!(division = %self.division, "Delivery worker shutting down");
                    break;
                }
            }
        }
    }
}

/// Lease held across a handler attempt. Outlives the handler deadline so a
/// timed-out attempt is settled before the message can be redelivered.
pub(crate) fn lease_extension(config: &RouterConfig) -> Duration {
    config
        .visibility_timeout
        .max(config.handler_timeout.saturating_mul(2))
}

/// Decide what to do with a freshly dequeued message.
fn admit(e: &mut LedgerEntry, now: Timestamp) -> Result<Admission, MessageError> {
    e.set_queued(false);
    let status = e.message().status();
    if status.is_terminal() {
        return Ok(Admission::Skip);
    }
    if e.is_cancel_requested() {
        e.finish(MessageStatus::Expired, now, Some(CANCELLED.to_string()))?;
        return Ok(Admission::Cancelled);
    }
    if e.message().is_expired(now) {
        e.finish(MessageStatus::Expired, now, Some(TTL_EXPIRED.to_string()))?;
        return Ok(Admission::Expired);
    }
    if status == MessageStatus::Failed {
        e.resume(now)?;
    }
    let token = CancellationToken::new();
    e.begin_attempt(token.clone());
    Ok(Admission::Attempt {
        message: e.message().clone(),
        token,
    })
}

/// Spawn `workers_per_division` workers for each division.
pub(crate) fn spawn_workers(
    core: &Arc<RouterCore>,
    divisions: &[String],
    shutdown: &watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(divisions.len() * core.config.workers_per_division);
    for division in divisions {
        for _ in 0..core.config.workers_per_division {
            let worker = DeliveryWorker::new(Arc::clone(core), division.clone());
            handles.push(tokio::spawn(worker.run(shutdown.clone())));
        }
    }
    handles
}

/// Spawn the periodic TTL sweep.
pub(crate) fn spawn_sweeper(
    core: &Arc<RouterCore>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let core = Arc::clone(core);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(core.config.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = core.sweep().await {
                        error!(error = %e, "Sweep failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("Expiry sweeper shutting down");
                    break;
                }
            }
        }
    })
}
