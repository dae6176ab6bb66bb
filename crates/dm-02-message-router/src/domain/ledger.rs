//! # Message Ledger
//!
//! Authoritative status of every routed message, with its receipt log.
//!
//! Queue entries are copies; the ledger decides. Every status change goes
//! through a [`LedgerEntry`] method under the ledger's write lock, so a
//! worker finishing a delivery and the sweeper expiring the same message
//! cannot both win: the second transition is rejected by the state machine.

use super::errors::{RouterError, RouterResult};
use parking_lot::RwLock;
use shared_types::{AgentMessage, DeliveryReceipt, MessageError, MessageStatus, Timestamp};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Ledger record of one message.
#[derive(Debug)]
pub struct LedgerEntry {
    message: AgentMessage,
    receipts: Vec<DeliveryReceipt>,
    retryable: bool,
    queued: bool,
    cancel_requested: bool,
    in_flight: Option<CancellationToken>,
    updated_at: Timestamp,
}

impl LedgerEntry {
    /// Track `message`, first seen at `now`.
    pub fn new(message: AgentMessage, now: Timestamp) -> Self {
        Self {
            message,
            receipts: Vec::new(),
            retryable: true,
            queued: false,
            cancel_requested: false,
            in_flight: None,
            updated_at: now,
        }
    }

    /// Current message state.
    pub fn message(&self) -> &AgentMessage {
        &self.message
    }

    /// Receipts in recording order.
    pub fn receipts(&self) -> &[DeliveryReceipt] {
        &self.receipts
    }

    /// False after a deterministic failure (authorization, no handler).
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Whether a queue entry exists for the message.
    pub fn is_queued(&self) -> bool {
        self.queued
    }

    /// Whether the producer asked to cancel.
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    /// Whether a handler attempt is running.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Last change (unix millis).
    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// Mark whether a queue entry exists.
    pub fn set_queued(&mut self, queued: bool) {
        self.queued = queued;
    }

    /// Register the token of a running handler attempt.
    pub fn begin_attempt(&mut self, token: CancellationToken) {
        if self.cancel_requested {
            token.cancel();
        }
        self.in_flight = Some(token);
    }

    /// Forget the running attempt's token.
    pub fn end_attempt(&mut self) {
        self.in_flight = None;
    }

    /// Ask for cancellation. Returns `false` if the message is terminal.
    pub fn request_cancel(&mut self) -> bool {
        if self.message.status().is_terminal() {
            return false;
        }
        self.cancel_requested = true;
        if let Some(token) = &self.in_flight {
            token.cancel();
        }
        true
    }

    fn record(&mut self, receipt: DeliveryReceipt) -> DeliveryReceipt {
        self.updated_at = receipt.delivered_at();
        self.receipts.push(receipt.clone());
        receipt
    }

    /// Move to `status` and record a receipt for the outcome.
    pub fn finish(
        &mut self,
        status: MessageStatus,
        at: Timestamp,
        error: Option<String>,
    ) -> Result<DeliveryReceipt, MessageError> {
        self.message.transition_to(status)?;
        if status.is_terminal() {
            self.retryable = false;
        }
        let receipt = DeliveryReceipt::for_message(&self.message, at, error);
        Ok(self.record(receipt))
    }

    /// Fail without retry (authorization denial, no handler).
    pub fn fail_permanently(
        &mut self,
        at: Timestamp,
        error: impl Into<String>,
    ) -> Result<DeliveryReceipt, MessageError> {
        let receipt = self.finish(MessageStatus::Failed, at, Some(error.into()))?;
        self.retryable = false;
        Ok(receipt)
    }

    /// Record a failed attempt that will be retried.
    ///
    /// The receipt carries the `retry_count` of the failed attempt; the
    /// message leaves with it incremented.
    pub fn record_retry(
        &mut self,
        at: Timestamp,
        error: impl Into<String>,
    ) -> Result<DeliveryReceipt, MessageError> {
        let attempt_retry_count = self.message.retry_count();
        self.message.record_failed_attempt()?;
        let receipt = DeliveryReceipt::new(
            self.message.message_id(),
            MessageStatus::Failed,
            at,
            Some(error.into()),
            attempt_retry_count,
        );
        Ok(self.record(receipt))
    }

    /// Put a failed message back to `pending` for its next attempt.
    pub fn resume(&mut self, at: Timestamp) -> Result<(), MessageError> {
        self.message.transition_to(MessageStatus::Pending)?;
        self.updated_at = at;
        Ok(())
    }
}

/// Thread-safe map of message id to [`LedgerEntry`].
#[derive(Debug, Default)]
pub struct MessageLedger {
    entries: RwLock<HashMap<String, LedgerEntry>>,
}

impl MessageLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new message. Fails if the id is already known.
    pub fn insert(&self, entry: LedgerEntry) -> RouterResult<()> {
        let id = entry.message.message_id().to_string();
        let mut entries = self.entries.write();
        if entries.contains_key(&id) {
            return Err(RouterError::DuplicateMessage(id));
        }
        entries.insert(id, entry);
        Ok(())
    }

    /// Track `message` unless its id is already known.
    ///
    /// Returns `true` if the message was added.
    pub fn adopt(&self, message: AgentMessage, now: Timestamp) -> bool {
        let mut entries = self.entries.write();
        if entries.contains_key(message.message_id()) {
            return false;
        }
        entries.insert(
            message.message_id().to_string(),
            LedgerEntry::new(message, now),
        );
        true
    }

    /// Check whether the id is known.
    pub fn contains(&self, message_id: &str) -> bool {
        self.entries.read().contains_key(message_id)
    }

    /// Current status.
    pub fn status(&self, message_id: &str) -> Option<MessageStatus> {
        self.entries
            .read()
            .get(message_id)
            .map(|e| e.message.status())
    }

    /// Copy of the current message state.
    pub fn message(&self, message_id: &str) -> Option<AgentMessage> {
        self.entries
            .read()
            .get(message_id)
            .map(|e| e.message.clone())
    }

    /// Every receipt recorded for the message.
    pub fn receipts(&self, message_id: &str) -> Vec<DeliveryReceipt> {
        self.entries
            .read()
            .get(message_id)
            .map(|e| e.receipts.clone())
            .unwrap_or_default()
    }

    /// Most recent receipt.
    pub fn last_receipt(&self, message_id: &str) -> Option<DeliveryReceipt> {
        self.entries
            .read()
            .get(message_id)
            .and_then(|e| e.receipts.last().cloned())
    }

    /// Run `f` on the entry under the write lock.
    pub fn update<R>(&self, message_id: &str, f: impl FnOnce(&mut LedgerEntry) -> R) -> Option<R> {
        self.entries.write().get_mut(message_id).map(f)
    }

    /// Ids of entries matching `pred`.
    pub fn select(&self, pred: impl Fn(&LedgerEntry) -> bool) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .filter(|(_, e)| pred(e))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Stop tracking a message.
    pub fn remove(&self, message_id: &str) -> Option<LedgerEntry> {
        self.entries.write().remove(message_id)
    }

    /// Drop terminal entries last changed before `cutoff`.
    pub fn prune_terminal(&self, cutoff: Timestamp) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| !(e.message.status().is_terminal() && e.updated_at < cutoff));
        before - entries.len()
    }

    /// Number of tracked messages.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
