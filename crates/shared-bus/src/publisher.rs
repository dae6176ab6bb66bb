//! # Event Publisher
//!
//! Defines the publishing side of the event bus and the in-memory
//! dispatcher that fans events out to pattern-matched handlers.

use crate::events::{BusEvent, EventFilter};
use crate::subscriber::{EventHandler, EventTap, SubscriptionId};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Outcome of one publish call.
///
/// Publishing never errors: handler failures are counted, not raised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscriptions whose type and filter matched.
    pub matched: usize,
    /// Matched handlers that returned an error or panicked.
    pub failed: usize,
}

impl PublishReport {
    /// Handlers that completed successfully.
    pub fn succeeded(&self) -> usize {
        self.matched - self.failed
    }
}

/// Trait for publishing events to the bus.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event and wait for every matching handler to finish.
    async fn publish(&self, event: BusEvent) -> PublishReport;

    /// Check whether any subscription listens for `event_type`.
    fn has_subscription_for(&self, event_type: &str) -> bool;

    /// Get the total number of events published.
    fn events_published(&self) -> u64;
}

struct SubscriptionEntry {
    event_type: String,
    filter: EventFilter,
    handler: Arc<dyn EventHandler>,
}

/// In-memory implementation of the event bus.
///
/// Subscriptions live in a map guarded by a read/write lock; publish takes a
/// snapshot of the matching handlers, so subscribe/unsubscribe never wait on
/// a running handler. Every handler runs in its own task, which isolates
/// errors and panics. A `tokio::sync::broadcast` channel feeds the taps.
pub struct InMemoryEventBus {
    sender: broadcast::Sender<BusEvent>,
    subscriptions: Arc<RwLock<HashMap<SubscriptionId, SubscriptionEntry>>>,
    events_published: AtomicU64,
    capacity: usize,
}

impl InMemoryEventBus {
    /// Create a new in-memory event bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new in-memory event bus with specified tap capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            events_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe `handler` to events of `event_type` matching `filter`.
    pub fn subscribe(
        &self,
        event_type: impl Into<String>,
        filter: EventFilter,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        let id = SubscriptionId::generate();
        self.subscribe_as(id.clone(), event_type, filter, handler);
        id
    }

    /// Subscribe under a caller-chosen id.
    ///
    /// Subscribing an id twice keeps a single subscription holding the
    /// latest registration. Returns `true` if the id was new.
    pub fn subscribe_as(
        &self,
        id: SubscriptionId,
        event_type: impl Into<String>,
        filter: EventFilter,
        handler: Arc<dyn EventHandler>,
    ) -> bool {
        let event_type = event_type.into();
        debug!(subscription = %id, event_type = %event_type, "Subscription registered");

        let entry = SubscriptionEntry {
            event_type,
            filter,
            handler,
        };
        let mut subs = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        subs.insert(id, entry).is_none()
    }

    /// Remove a subscription. Returns `false` if it did not exist.
    pub fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        let removed = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some();
        if removed {
            debug!(subscription = %id, "Subscription removed");
        }
        removed
    }

    /// Observe every published event matching `filter`.
    #[must_use]
    pub fn tap(&self, filter: EventFilter) -> EventTap {
        EventTap::new(self.sender.subscribe(), filter)
    }

    /// Get the number of active subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Get the tap channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn matching_handlers(&self, event: &BusEvent) -> Vec<(SubscriptionId, Arc<dyn EventHandler>)> {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, s)| s.event_type == event.event_type && s.filter.matches(event))
            .map(|(id, s)| (id.clone(), Arc::clone(&s.handler)))
            .collect()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: BusEvent) -> PublishReport {
        self.events_published.fetch_add(1, Ordering::Relaxed);

        // No taps is the common case.
        let _ = self.sender.send(event.clone());

        let handlers = self.matching_handlers(&event);
        let mut report = PublishReport {
            matched: handlers.len(),
            failed: 0,
        };

        let tasks: Vec<_> = handlers
            .into_iter()
            .map(|(id, handler)| {
                let event = event.clone();
                (id, tokio::spawn(async move { handler.handle(event).await }))
            })
            .collect();

        for (id, task) in tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(subscription = %id, event_type = %event.event_type, error = %e, "Event handler failed");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(subscription = %id, event_type = %event.event_type, error = %e, "Event handler panicked");
                }
            }
        }

        debug!(
            event_type = %event.event_type,
            source = %event.source,
            matched = report.matched,
            failed = report.failed,
            "Event published"
        );
        report
    }

    fn has_subscription_for(&self, event_type: &str) -> bool {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .any(|s| s.event_type == event_type)
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
