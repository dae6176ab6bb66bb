//! # In-Memory Message Queue
//!
//! Per-division lease queue with a dead-letter destination.
//!
//! ## Semantics
//!
//! - A dequeued entry becomes invisible until its lease deadline. Settling
//!   it (acknowledge / dead_letter) removes it; otherwise it reappears.
//! - An entry whose lease lapses after `max_receive_count` receives is moved
//!   to the dead-letter destination with reason `max_receive_count_exceeded`
//!   and reported once through `reclaim_abandoned`.
//! - Among visible entries the one with the highest effective priority
//!   (`priority + waited / aging_step`) wins; ties go to the oldest.
//! - Dequeue long-polls: it waits on a [`Notify`] until an entry becomes
//!   visible or the wait elapses.

use crate::config::RouterConfig;
use crate::domain::{
    DeadLetter, LeaseId, LeasedMessage, QueueAttributes, QueueError, RouterResult,
};
use crate::ports::MessageQueue;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use shared_types::{AgentMessage, SystemTimeSource, TimeSource, Timestamp};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Reason recorded when the queue itself dead-letters an abandoned entry.
pub const MAX_RECEIVE_COUNT_EXCEEDED: &str = "max_receive_count_exceeded";

/// Queue tunables.
#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// Lease length granted on dequeue.
    pub visibility_timeout: Duration,
    /// Receives after which a lapsed lease dead-letters the entry.
    pub max_receive_count: u32,
    /// Waiting time worth one priority level.
    pub aging_step: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::from(&RouterConfig::default())
    }
}

impl From<&RouterConfig> for QueueConfig {
    fn from(config: &RouterConfig) -> Self {
        Self {
            visibility_timeout: config.visibility_timeout,
            max_receive_count: config.max_receive_count,
            aging_step: config.aging_step,
        }
    }
}

struct QueueEntry {
    message: AgentMessage,
    enqueued_at: Instant,
    /// Visible from this instant; for leased entries, the lease deadline.
    visible_at: Instant,
    receive_count: u32,
    lease: Option<u64>,
}

impl QueueEntry {
    fn is_visible(&self, now: Instant) -> bool {
        self.lease.is_none() && self.visible_at <= now
    }

    fn effective_priority(&self, now: Instant, aging_step: Duration) -> u128 {
        let waited = now.saturating_duration_since(self.visible_at).as_millis();
        let step = aging_step.as_millis().max(1);
        u128::from(self.message.priority) + waited / step
    }
}

#[derive(Default)]
struct DivisionState {
    entries: Vec<QueueEntry>,
    dead_letters: Vec<DeadLetter>,
    /// Queue-made dead letters not yet reported to the router.
    abandoned: Vec<DeadLetter>,
}

impl DivisionState {
    fn position(&self, handle: u64) -> Option<usize> {
        self.entries.iter().position(|e| e.lease == Some(handle))
    }

    fn next_wake(&self) -> Option<Instant> {
        self.entries.iter().map(|e| e.visible_at).min()
    }
}

#[derive(Default)]
struct DivisionQueue {
    state: Mutex<DivisionState>,
    notify: Notify,
}

/// In-memory [`MessageQueue`].
pub struct InMemoryMessageQueue {
    config: QueueConfig,
    divisions: RwLock<HashMap<String, Arc<DivisionQueue>>>,
    next_handle: AtomicU64,
    time_source: Arc<dyn TimeSource>,
}

impl InMemoryMessageQueue {
    /// Create a queue stamping dead letters with the system clock.
    pub fn new(config: QueueConfig) -> Self {
        Self::with_time_source(config, Arc::new(SystemTimeSource))
    }

    /// Create a queue stamping dead letters with `time_source`.
    pub fn with_time_source(config: QueueConfig, time_source: Arc<dyn TimeSource>) -> Self {
        Self {
            config,
            divisions: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            time_source,
        }
    }

    fn division(&self, division: &str) -> Arc<DivisionQueue> {
        if let Some(queue) = self.divisions.read().get(division) {
            return Arc::clone(queue);
        }
        Arc::clone(
            self.divisions
                .write()
                .entry(division.to_string())
                .or_default(),
        )
    }

    fn existing(&self, division: &str) -> Option<Arc<DivisionQueue>> {
        self.divisions.read().get(division).cloned()
    }

    fn lease_not_found(lease: &LeaseId) -> QueueError {
        QueueError::LeaseNotFound {
            division: lease.division.clone(),
            handle: lease.handle,
        }
    }

    /// Make lapsed leases visible again, or dead-letter them.
    fn reclaim(&self, division: &str, state: &mut DivisionState, now: Instant) {
        let max_receive_count = self.config.max_receive_count;
        let mut i = 0;
        while i < state.entries.len() {
            let entry = &mut state.entries[i];
            if entry.lease.is_none() || entry.visible_at > now {
                i += 1;
                continue;
            }
            if entry.receive_count >= max_receive_count {
                let entry = state.entries.swap_remove(i);
                warn!(
                    division = %division,
                    message_id = %entry.message.message_id(),
                    receive_count = entry.receive_count,
                    "Lease lapsed too often, dead-lettering"
                );
                let dead = DeadLetter {
                    message: entry.message,
                    reason: MAX_RECEIVE_COUNT_EXCEEDED.to_string(),
                    dead_lettered_at: self.time_source.now(),
                    receive_count: entry.receive_count,
                };
                state.abandoned.push(dead.clone());
                state.dead_letters.push(dead);
                continue;
            }
            debug!(
                division = %division,
                message_id = %entry.message.message_id(),
                "Lease lapsed, message visible again"
            );
            entry.lease = None;
            i += 1;
        }
    }

    fn lease_next(
        &self,
        division: &str,
        state: &mut DivisionState,
        now: Instant,
    ) -> Option<LeasedMessage> {
        let aging_step = self.config.aging_step;
        let entry = state
            .entries
            .iter_mut()
            .filter(|e| e.is_visible(now))
            .max_by_key(|e| (e.effective_priority(now, aging_step), Reverse(e.enqueued_at)))?;

        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        entry.lease = Some(handle);
        entry.receive_count += 1;
        entry.visible_at = now + self.config.visibility_timeout;

        Some(LeasedMessage {
            lease: LeaseId {
                division: division.to_string(),
                handle,
            },
            message: entry.message.clone(),
            receive_count: entry.receive_count,
        })
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn enqueue(
        &self,
        division: &str,
        message: AgentMessage,
        delay: Duration,
    ) -> RouterResult<()> {
        let queue = self.division(division);
        let now = Instant::now();
        debug!(
            division = %division,
            message_id = %message.message_id(),
            priority = message.priority,
            delay_ms = delay.as_millis() as u64,
            "Enqueued"
        );
        queue.state.lock().entries.push(QueueEntry {
            message,
            enqueued_at: now,
            visible_at: now + delay,
            receive_count: 0,
            lease: None,
        });
        queue.notify.notify_waiters();
        Ok(())
    }

    async fn dequeue(&self, division: &str, wait: Duration) -> RouterResult<Option<LeasedMessage>> {
        let queue = self.division(division);
        let deadline = Instant::now() + wait;

        loop {
            let notified = queue.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_wake = {
                let mut state = queue.state.lock();
                let now = Instant::now();
                self.reclaim(division, &mut state, now);
                if let Some(leased) = self.lease_next(division, &mut state, now) {
                    return Ok(Some(leased));
                }
                state.next_wake()
            };

            if Instant::now() >= deadline {
                return Ok(None);
            }
            let wake = next_wake.map_or(deadline, |t| t.min(deadline));
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake) => {}
            }
        }
    }

    async fn acknowledge(&self, lease: &LeaseId) -> RouterResult<()> {
        let queue = self
            .existing(&lease.division)
            .ok_or_else(|| Self::lease_not_found(lease))?;
        let mut state = queue.state.lock();
        let index = state
            .position(lease.handle)
            .ok_or_else(|| Self::lease_not_found(lease))?;
        state.entries.swap_remove(index);
        Ok(())
    }

    async fn extend_lease(&self, lease: &LeaseId, extension: Duration) -> RouterResult<()> {
        let queue = self
            .existing(&lease.division)
            .ok_or_else(|| Self::lease_not_found(lease))?;
        let mut state = queue.state.lock();
        let index = state
            .position(lease.handle)
            .ok_or_else(|| Self::lease_not_found(lease))?;
        state.entries[index].visible_at = Instant::now() + extension;
        Ok(())
    }

    async fn dead_letter(
        &self,
        lease: &LeaseId,
        message: AgentMessage,
        reason: &str,
    ) -> RouterResult<()> {
        let queue = self
            .existing(&lease.division)
            .ok_or_else(|| Self::lease_not_found(lease))?;
        let mut state = queue.state.lock();
        let index = state
            .position(lease.handle)
            .ok_or_else(|| Self::lease_not_found(lease))?;
        let entry = state.entries.swap_remove(index);
        state.dead_letters.push(DeadLetter {
            message,
            reason: reason.to_string(),
            dead_lettered_at: self.time_source.now(),
            receive_count: entry.receive_count,
        });
        Ok(())
    }

    async fn dead_letters(&self, division: &str) -> RouterResult<Vec<DeadLetter>> {
        Ok(self
            .existing(division)
            .map(|q| q.state.lock().dead_letters.clone())
            .unwrap_or_default())
    }

    async fn take_dead_letter(
        &self,
        division: &str,
        message_id: &str,
    ) -> RouterResult<Option<DeadLetter>> {
        let Some(queue) = self.existing(division) else {
            return Ok(None);
        };
        let mut state = queue.state.lock();
        let taken = state
            .dead_letters
            .iter()
            .position(|d| d.message.message_id() == message_id)
            .map(|i| state.dead_letters.remove(i));
        Ok(taken)
    }

    async fn reclaim_abandoned(&self) -> RouterResult<Vec<DeadLetter>> {
        let queues: Vec<_> = self
            .divisions
            .read()
            .iter()
            .map(|(name, queue)| (name.clone(), Arc::clone(queue)))
            .collect();
        let now = Instant::now();
        let mut abandoned = Vec::new();
        for (division, queue) in queues {
            let mut state = queue.state.lock();
            self.reclaim(&division, &mut state, now);
            abandoned.append(&mut state.abandoned);
        }
        Ok(abandoned)
    }

    async fn purge_dead_letters(&self, cutoff: Timestamp) -> RouterResult<usize> {
        let queues: Vec<_> = self.divisions.read().values().cloned().collect();
        let mut purged = 0;
        for queue in queues {
            let mut state = queue.state.lock();
            let before = state.dead_letters.len();
            state.dead_letters.retain(|d| d.dead_lettered_at >= cutoff);
            purged += before - state.dead_letters.len();
        }
        Ok(purged)
    }

    async fn attributes(&self, division: &str) -> RouterResult<QueueAttributes> {
        let mut attributes = QueueAttributes {
            division: division.to_string(),
            ..QueueAttributes::default()
        };
        let Some(queue) = self.existing(division) else {
            return Ok(attributes);
        };
        let mut state = queue.state.lock();
        let now = Instant::now();
        self.reclaim(division, &mut state, now);
        for entry in &state.entries {
            if entry.lease.is_some() {
                attributes.in_flight += 1;
            } else if entry.visible_at <= now {
                attributes.visible += 1;
            } else {
                attributes.delayed += 1;
            }
        }
        attributes.dead_letters = state.dead_letters.len();
        Ok(attributes)
    }
}
