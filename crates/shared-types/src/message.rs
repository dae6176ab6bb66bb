//! # Agent Message
//!
//! The unit of communication between agents, within or across divisions.
//!
//! ## Lifecycle
//!
//! ```text
//!              ┌──────────────┐
//!   created ──→│   Pending    │──────────→ Delivered (terminal)
//!              └──────────────┘
//!                 │   ↑     │
//!         failure │   │     └──────────→ Expired (terminal)
//!                 ↓   │ requeue              ↑
//!              ┌──────────────┐              │
//!              │    Failed    │──────────────┘
//!              └──────────────┘  retries exhausted / TTL
//! ```
//!
//! `expires_at` is computed exactly once, in [`MessageBuilder::build`], as
//! `timestamp + ttl`. It is never recomputed.

use crate::errors::MessageError;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Default time to live in seconds.
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Default maximum number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default scheduling priority.
pub const DEFAULT_PRIORITY: u8 = 5;

/// Lowest accepted priority.
pub const MIN_PRIORITY: u8 = 1;

/// Highest accepted priority.
pub const MAX_PRIORITY: u8 = 10;

/// Metadata key carrying the action used for federation checks.
pub const ACTION_METADATA_KEY: &str = "action";

/// Kind of message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Expects a response correlated by `correlation_id`.
    Request,
    /// Answer to an earlier request.
    Response,
    /// Fire-and-forget notification.
    Event,
    /// Liveness signal.
    Heartbeat,
}

impl MessageType {
    /// All message types.
    pub const ALL: [MessageType; 4] = [
        MessageType::Request,
        MessageType::Response,
        MessageType::Event,
        MessageType::Heartbeat,
    ];

    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::Event => "event",
            Self::Heartbeat => "heartbeat",
        }
    }

    /// Whether crossing a division boundary requires federation approval.
    ///
    /// Heartbeats carry no action and are never gated.
    pub fn requires_federation(&self) -> bool {
        !matches!(self, Self::Heartbeat)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "request" => Ok(Self::Request),
            "response" => Ok(Self::Response),
            "event" => Ok(Self::Event),
            "heartbeat" => Ok(Self::Heartbeat),
            other => Err(MessageError::Malformed {
                field: "message_type",
                reason: format!("unknown message type '{other}'"),
            }),
        }
    }
}

/// Delivery status of a message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Waiting for (re)delivery.
    #[default]
    Pending,
    /// Handler accepted the message.
    Delivered,
    /// Last attempt failed; may be requeued.
    Failed,
    /// TTL elapsed or retries exhausted.
    Expired,
}

impl MessageStatus {
    /// Check if transition is valid.
    pub fn can_transition_to(&self, next: MessageStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Delivered)
                | (Self::Pending, Self::Failed)
                | (Self::Pending, Self::Expired)
                | (Self::Failed, Self::Pending)
                | (Self::Failed, Self::Expired)
        )
    }

    /// Check if terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Expired)
    }

    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message between two agents.
///
/// Identity, creation time, TTL, expiry and the retry bound are fixed at
/// construction and exposed read-only. `status` and `retry_count` only move
/// through [`AgentMessage::transition_to`] and [`AgentMessage::record_failed_attempt`],
/// which reject edges outside the lifecycle above.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    message_id: String,
    /// Sending agent.
    pub source_agent_id: String,
    /// Division of the sending agent.
    pub source_division_id: String,
    /// Receiving agent.
    pub target_agent_id: String,
    /// Division of the receiving agent.
    pub target_division_id: String,
    /// Kind of message.
    pub message_type: MessageType,
    /// Opaque body. Never inspected by the router.
    pub payload: Value,
    /// Links a response to its request.
    pub correlation_id: Option<String>,
    /// Propagated unchanged for observability.
    pub trace_id: Option<String>,
    /// Set on responses: the request's `message_id`.
    pub parent_message_id: Option<String>,
    timestamp: Timestamp,
    ttl_secs: u64,
    expires_at: Timestamp,
    status: MessageStatus,
    retry_count: u32,
    max_retries: u32,
    /// Scheduling hint, 1 (lowest) to 10 (highest).
    pub priority: u8,
    /// Free-form metadata. `metadata["action"]` is read by the router.
    pub metadata: Map<String, Value>,
}

impl AgentMessage {
    /// Start building a message.
    pub fn builder(
        source_agent_id: impl Into<String>,
        source_division_id: impl Into<String>,
        target_agent_id: impl Into<String>,
        target_division_id: impl Into<String>,
        message_type: MessageType,
    ) -> MessageBuilder {
        MessageBuilder::new(
            source_agent_id,
            source_division_id,
            target_agent_id,
            target_division_id,
            message_type,
        )
    }

    /// Build a response to `request`, swapping source and target.
    ///
    /// The response inherits the request's correlation id (or uses the
    /// request's `message_id` when the request had none) and its trace id.
    pub fn response_to(
        request: &AgentMessage,
        payload: Value,
        now: Timestamp,
    ) -> Result<AgentMessage, MessageError> {
        let correlation = request
            .correlation_id
            .clone()
            .unwrap_or_else(|| request.message_id.clone());

        let mut builder = MessageBuilder::new(
            request.target_agent_id.clone(),
            request.target_division_id.clone(),
            request.source_agent_id.clone(),
            request.source_division_id.clone(),
            MessageType::Response,
        )
        .payload(payload)
        .correlation_id(correlation)
        .parent_message_id(request.message_id.clone())
        .priority(request.priority);

        if let Some(trace) = &request.trace_id {
            builder = builder.trace_id(trace.clone());
        }
        if let Some(action) = request.action_metadata() {
            builder = builder.metadata(ACTION_METADATA_KEY, Value::String(action.to_string()));
        }
        builder.build(now)
    }

    /// Unique identifier.
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Creation time (unix millis).
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Time to live in seconds.
    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Expiry time (unix millis), fixed at creation.
    pub fn expires_at(&self) -> Timestamp {
        self.expires_at
    }

    /// Current status.
    pub fn status(&self) -> MessageStatus {
        self.status
    }

    /// Number of failed attempts that were followed by a requeue.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Upper bound for `retry_count`.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Check whether the TTL has elapsed at `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// Check whether the message leaves its own division.
    pub fn is_cross_division(&self) -> bool {
        self.source_division_id != self.target_division_id
    }

    /// Whether another failed attempt may still be retried.
    pub fn has_retries_left(&self) -> bool {
        self.retry_count < self.max_retries
    }

    fn action_metadata(&self) -> Option<&str> {
        self.metadata.get(ACTION_METADATA_KEY).and_then(Value::as_str)
    }

    /// Action used for federation checks.
    ///
    /// `metadata["action"]` when set, otherwise the message type name.
    pub fn action(&self) -> &str {
        self.action_metadata()
            .unwrap_or_else(|| self.message_type.as_str())
    }

    /// Move to `next`, rejecting edges outside the lifecycle.
    pub fn transition_to(&mut self, next: MessageStatus) -> Result<(), MessageError> {
        if !self.status.can_transition_to(next) {
            return Err(MessageError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Record a failed attempt that will be retried.
    ///
    /// Moves `pending -> failed` and increments `retry_count`. Fails with
    /// [`MessageError::RetriesExhausted`] when no retry is left, leaving the
    /// message untouched.
    pub fn record_failed_attempt(&mut self) -> Result<(), MessageError> {
        if !self.has_retries_left() {
            return Err(MessageError::RetriesExhausted {
                max_retries: self.max_retries,
            });
        }
        self.transition_to(MessageStatus::Failed)?;
        self.retry_count += 1;
        Ok(())
    }

    /// Check required fields and value ranges.
    ///
    /// Messages that arrive over the wire bypass [`MessageBuilder`], so the
    /// router re-runs this before accepting them.
    pub fn validate(&self) -> Result<(), MessageError> {
        require_non_empty("message_id", &self.message_id)?;
        require_non_empty("source_agent_id", &self.source_agent_id)?;
        require_non_empty("source_division_id", &self.source_division_id)?;
        require_non_empty("target_agent_id", &self.target_agent_id)?;
        require_non_empty("target_division_id", &self.target_division_id)?;

        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&self.priority) {
            return Err(MessageError::Malformed {
                field: "priority",
                reason: format!(
                    "{} outside {}..={}",
                    self.priority, MIN_PRIORITY, MAX_PRIORITY
                ),
            });
        }
        if self.ttl_secs == 0 {
            return Err(MessageError::Malformed {
                field: "ttl",
                reason: "must be at least one second".to_string(),
            });
        }
        if self.retry_count > self.max_retries {
            return Err(MessageError::Malformed {
                field: "retry_count",
                reason: format!("{} exceeds max_retries {}", self.retry_count, self.max_retries),
            });
        }
        if self.message_type == MessageType::Response && self.correlation_id.is_none() {
            return Err(MessageError::Malformed {
                field: "correlation_id",
                reason: "responses must carry the request correlation id".to_string(),
            });
        }
        Ok(())
    }
}

fn require_non_empty(field: &'static str, value: &str) -> Result<(), MessageError> {
    if value.trim().is_empty() {
        return Err(MessageError::Malformed {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}

/// Builder for [`AgentMessage`].
///
/// Keeps the constructor readable and is the only place `expires_at` is set.
#[derive(Clone, Debug)]
pub struct MessageBuilder {
    message_id: Option<String>,
    source_agent_id: String,
    source_division_id: String,
    target_agent_id: String,
    target_division_id: String,
    message_type: MessageType,
    payload: Value,
    correlation_id: Option<String>,
    trace_id: Option<String>,
    parent_message_id: Option<String>,
    timestamp: Option<Timestamp>,
    ttl_secs: u64,
    max_retries: u32,
    priority: u8,
    metadata: Map<String, Value>,
}

impl MessageBuilder {
    /// Create a new builder with required fields.
    pub fn new(
        source_agent_id: impl Into<String>,
        source_division_id: impl Into<String>,
        target_agent_id: impl Into<String>,
        target_division_id: impl Into<String>,
        message_type: MessageType,
    ) -> Self {
        Self {
            message_id: None,
            source_agent_id: source_agent_id.into(),
            source_division_id: source_division_id.into(),
            target_agent_id: target_agent_id.into(),
            target_division_id: target_division_id.into(),
            message_type,
            payload: Value::Object(Map::new()),
            correlation_id: None,
            trace_id: None,
            parent_message_id: None,
            timestamp: None,
            ttl_secs: DEFAULT_TTL_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            priority: DEFAULT_PRIORITY,
            metadata: Map::new(),
        }
    }

    /// Use a producer-assigned id instead of a generated UUID.
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Set the payload.
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Set the correlation id.
    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Set the trace id.
    pub fn trace_id(mut self, id: impl Into<String>) -> Self {
        self.trace_id = Some(id.into());
        self
    }

    /// Set the parent message id.
    pub fn parent_message_id(mut self, id: impl Into<String>) -> Self {
        self.parent_message_id = Some(id.into());
        self
    }

    /// Set an explicit creation time. Defaults to `now` at build time.
    pub fn timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Set the TTL in seconds.
    pub fn ttl_secs(mut self, ttl: u64) -> Self {
        self.ttl_secs = ttl;
        self
    }

    /// Set the retry bound.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the priority (1-10).
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Set the federation action.
    pub fn action(self, action: impl Into<String>) -> Self {
        self.metadata(ACTION_METADATA_KEY, Value::String(action.into()))
    }

    /// Insert a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Finish the message.
    ///
    /// `now` is used as the creation time unless [`MessageBuilder::timestamp`]
    /// was called; `expires_at` is derived from that creation time.
    pub fn build(self, now: Timestamp) -> Result<AgentMessage, MessageError> {
        let timestamp = self.timestamp.unwrap_or(now);
        let expires_at = timestamp.saturating_add(self.ttl_secs.saturating_mul(1000));

        let message = AgentMessage {
            message_id: self
                .message_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            source_agent_id: self.source_agent_id,
            source_division_id: self.source_division_id,
            target_agent_id: self.target_agent_id,
            target_division_id: self.target_division_id,
            message_type: self.message_type,
            payload: self.payload,
            correlation_id: self.correlation_id,
            trace_id: self.trace_id,
            parent_message_id: self.parent_message_id,
            timestamp,
            ttl_secs: self.ttl_secs,
            expires_at,
            status: MessageStatus::Pending,
            retry_count: 0,
            max_retries: self.max_retries,
            priority: self.priority,
            metadata: self.metadata,
        };
        message.validate()?;
        Ok(message)
    }
}
