//! # Bus Events
//!
//! Defines the event envelope that flows through the shared bus and the
//! filter subscribers use to select events.

use crate::pattern::FilterPattern;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{SystemTimeSource, TimeSource, Timestamp};
use uuid::Uuid;

/// Source stamped on every event emitted by the mesh itself.
pub const MESH_EVENT_SOURCE: &str = "multi-agent-system";

/// Event type for routed request/response/event messages.
pub const AGENT_MESSAGE: &str = "Agent Message";

/// Event type for routed heartbeats.
pub const AGENT_HEARTBEAT: &str = "Agent Heartbeat";

/// Event type for operational alerts (dead letters, missing handlers).
pub const SYSTEM_EVENT: &str = "System Event";

/// An event published on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    /// Unique event id.
    pub event_id: String,
    /// Event type (detail type), e.g. [`AGENT_MESSAGE`].
    pub event_type: String,
    /// Emitting component.
    pub source: String,
    /// Optional addressee (division or agent).
    pub target: Option<String>,
    /// Event body, matched against subscription patterns.
    pub payload: Value,
    /// Publication time (unix millis).
    pub published_at: Timestamp,
}

impl BusEvent {
    /// Create an event stamped with the current time.
    pub fn new(event_type: impl Into<String>, source: impl Into<String>, payload: Value) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            source: source.into(),
            target: None,
            payload,
            published_at: SystemTimeSource.now(),
        }
    }

    /// Stamp the event with a caller-supplied clock reading.
    #[must_use]
    pub fn with_published_at(mut self, published_at: Timestamp) -> Self {
        self.published_at = published_at;
        self
    }

    /// Set the addressee.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Filter for selecting events.
///
/// Empty lists accept any value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    /// Accepted event types.
    pub event_types: Vec<String>,
    /// Accepted sources.
    pub sources: Vec<String>,
    /// Structural predicate over the payload.
    pub pattern: FilterPattern,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific event types.
    #[must_use]
    pub fn event_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            event_types: types.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Create a filter from a payload pattern.
    #[must_use]
    pub fn pattern(pattern: FilterPattern) -> Self {
        Self {
            pattern,
            ..Self::default()
        }
    }

    /// Restrict to events emitted by `source`.
    #[must_use]
    pub fn from_source(mut self, source: impl Into<String>) -> Self {
        self.sources.push(source.into());
        self
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &BusEvent) -> bool {
        let type_match =
            self.event_types.is_empty() || self.event_types.iter().any(|t| *t == event.event_type);

        let source_match =
            self.sources.is_empty() || self.sources.iter().any(|s| *s == event.source);

        type_match && source_match && self.pattern.matches(&event.payload)
    }
}
