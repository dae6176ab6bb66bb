//! # Event Subscriber
//!
//! Defines the subscription side of the event bus: handler trait,
//! subscription ids and the broadcast tap used by observers.

use crate::events::{BusEvent, EventFilter};
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The event bus was closed.
    #[error("Event bus closed")]
    Closed,
}

/// Failure reported by an event handler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Event handler failed: {0}")]
pub struct EventHandlerError(pub String);

/// Identifier of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Generate a fresh id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SubscriptionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SubscriptionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rule target invoked for every matching event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one event.
    async fn handle(&self, event: BusEvent) -> Result<(), EventHandlerError>;
}

/// Adapter turning an async closure into an [`EventHandler`].
pub struct FnEventHandler<F> {
    f: F,
}

impl<F> FnEventHandler<F> {
    /// Wrap `f`.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnEventHandler<F>
where
    F: Fn(BusEvent) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), EventHandlerError>> + Send,
{
    async fn handle(&self, event: BusEvent) -> Result<(), EventHandlerError> {
        (self.f)(event).await
    }
}

/// Read-only view of every published event matching a filter.
///
/// Taps do not count as subscriptions: they never influence whether the
/// router publishes a message.
pub struct EventTap {
    receiver: broadcast::Receiver<BusEvent>,
    filter: EventFilter,
}

impl EventTap {
    pub(crate) fn new(receiver: broadcast::Receiver<BusEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next event that matches the filter.
    ///
    /// Returns `None` when the bus was dropped.
    pub async fn recv(&mut self) -> Option<BusEvent> {
        loop {
            let event = match self.receiver.recv().await {
                Ok(e) => e,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, "Tap lagged, some events dropped");
                    continue;
                }
            };

            if self.filter.matches(&event) {
                return Some(event);
            }
        }
    }

    /// Try to receive the next matching event without blocking.
    pub fn try_recv(&mut self) -> Result<Option<BusEvent>, SubscriptionError> {
        loop {
            let event = match self.receiver.try_recv() {
                Ok(e) => e,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            };

            if self.filter.matches(&event) {
                return Ok(Some(event));
            }
        }
    }

    /// Get the filter for this tap.
    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}
