//! # Cross-Division Request / Response
//!
//! Gateway-level invocation of an agent in another division. A request and
//! its response form one logical transaction bounded by the request timeout,
//! and travel as `request`/`response` [`AgentMessage`]s whose payload is the
//! serialized struct.

use crate::errors::MessageError;
use crate::message::{AgentMessage, MessageType};
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Default request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Request from one division's gateway to an agent in another division.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrossDivisionRequest {
    /// Unique request id.
    pub request_id: String,
    /// Requesting division.
    pub source_division_id: String,
    /// Division owning the target agent.
    pub target_division_id: String,
    /// Agent to invoke.
    pub target_agent_id: String,
    /// Action to perform (checked against federation permissions).
    pub action: String,
    /// Action parameters.
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Request context.
    #[serde(default)]
    pub context: Map<String, Value>,
    /// User or agent on whose behalf the request is made.
    pub requester_id: String,
    /// Permissions the caller claims to need.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Timeout in seconds.
    pub timeout: u64,
    /// Creation time (unix millis).
    pub timestamp: Timestamp,
}

impl CrossDivisionRequest {
    /// Create a request with a fresh id and the default timeout.
    pub fn new(
        source_division_id: impl Into<String>,
        target_division_id: impl Into<String>,
        target_agent_id: impl Into<String>,
        action: impl Into<String>,
        requester_id: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            source_division_id: source_division_id.into(),
            target_division_id: target_division_id.into(),
            target_agent_id: target_agent_id.into(),
            action: action.into(),
            parameters: Map::new(),
            context: Map::new(),
            requester_id: requester_id.into(),
            permissions: Vec::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT_SECS,
            timestamp: now,
        }
    }

    /// Deadline (unix millis) after which the transaction is void.
    pub fn deadline(&self) -> Timestamp {
        self.timestamp.saturating_add(self.timeout.saturating_mul(1000))
    }

    /// Check whether the request timed out at `now`.
    pub fn is_timed_out(&self, now: Timestamp) -> bool {
        now >= self.deadline()
    }

    /// Wrap the request in a `request` message sent by `source_agent_id`.
    ///
    /// The message TTL equals the request timeout, the correlation id is the
    /// request id and the action is copied into the routing metadata.
    pub fn to_message(&self, source_agent_id: impl Into<String>) -> Result<AgentMessage, MessageError> {
        AgentMessage::builder(
            source_agent_id,
            self.source_division_id.clone(),
            self.target_agent_id.clone(),
            self.target_division_id.clone(),
            MessageType::Request,
        )
        .payload(serde_json::to_value(self)?)
        .correlation_id(self.request_id.clone())
        .action(self.action.clone())
        .timestamp(self.timestamp)
        .ttl_secs(self.timeout.max(1))
        .build(self.timestamp)
    }

    /// Recover a request from a message payload.
    pub fn from_message(message: &AgentMessage) -> Result<Self, MessageError> {
        if message.message_type != MessageType::Request {
            return Err(MessageError::Malformed {
                field: "message_type",
                reason: format!("expected request, got {}", message.message_type),
            });
        }
        Ok(serde_json::from_value(message.payload.clone())?)
    }
}

/// Answer to a [`CrossDivisionRequest`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrossDivisionResponse {
    /// Id of the request being answered.
    pub request_id: String,
    /// Unique response id.
    pub response_id: String,
    /// Whether the action succeeded.
    pub success: bool,
    /// Result data on success.
    pub result: Option<Value>,
    /// Machine-readable failure code.
    pub error_code: Option<String>,
    /// Human-readable failure message.
    pub error_message: Option<String>,
    /// Time spent handling the request.
    pub processing_time_ms: Option<u64>,
    /// Creation time (unix millis).
    pub timestamp: Timestamp,
}

impl CrossDivisionResponse {
    /// Successful response.
    pub fn success(request: &CrossDivisionRequest, result: Value, now: Timestamp) -> Self {
        Self {
            request_id: request.request_id.clone(),
            response_id: Uuid::new_v4().to_string(),
            success: true,
            result: Some(result),
            error_code: None,
            error_message: None,
            processing_time_ms: Some(now.saturating_sub(request.timestamp)),
            timestamp: now,
        }
    }

    /// Failed response.
    pub fn failure(
        request: &CrossDivisionRequest,
        error_code: impl Into<String>,
        error_message: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            request_id: request.request_id.clone(),
            response_id: Uuid::new_v4().to_string(),
            success: false,
            result: None,
            error_code: Some(error_code.into()),
            error_message: Some(error_message.into()),
            processing_time_ms: Some(now.saturating_sub(request.timestamp)),
            timestamp: now,
        }
    }

    /// Whether this response answers `request`.
    pub fn answers(&self, request: &CrossDivisionRequest) -> bool {
        self.request_id == request.request_id
    }

    /// Wrap the response in a `response` message answering `request_message`.
    pub fn to_message(&self, request_message: &AgentMessage) -> Result<AgentMessage, MessageError> {
        AgentMessage::response_to(request_message, serde_json::to_value(self)?, self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> CrossDivisionRequest {
        CrossDivisionRequest::new("div-a", "div-b", "agent-x", "summarize", "user-1", 1_000)
    }

    #[test]
    fn test_request_round_trips_through_message() {
        let req = request();
        let msg = req.to_message("gateway-a").unwrap();

        assert_eq!(msg.message_type, MessageType::Request);
        assert_eq!(msg.correlation_id.as_deref(), Some(req.request_id.as_str()));
        assert_eq!(msg.action(), "summarize");
        assert_eq!(msg.expires_at(), req.deadline());

        let back = CrossDivisionRequest::from_message(&msg).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn test_timeout() {
        let req = request();
        assert_eq!(req.deadline(), 1_000 + 300_000);
        assert!(!req.is_timed_out(300_999));
        assert!(req.is_timed_out(301_000));
    }

    #[test]
    fn test_response_correlates() {
        let req = request();
        let req_msg = req.to_message("gateway-a").unwrap();

        let ok = CrossDivisionResponse::success(&req, json!({"summary": "..."}), 1_250);
        assert!(ok.answers(&req));
        assert_eq!(ok.processing_time_ms, Some(250));

        let resp_msg = ok.to_message(&req_msg).unwrap();
        assert_eq!(resp_msg.parent_message_id.as_deref(), Some(req_msg.message_id()));
        assert_eq!(resp_msg.correlation_id.as_deref(), Some(req.request_id.as_str()));

        let err = CrossDivisionResponse::failure(&req, "agent_busy", "try later", 1_100);
        assert!(!err.success);
        assert_eq!(err.error_code.as_deref(), Some("agent_busy"));
    }

    #[test]
    fn test_from_message_rejects_other_types() {
        let msg = AgentMessage::builder("a", "d", "b", "d", MessageType::Event)
            .build(0)
            .unwrap();
        assert!(CrossDivisionRequest::from_message(&msg).is_err());
    }
}
