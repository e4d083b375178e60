//! Channel protocol — typed envelopes exchanged with UI surfaces
//!
//! Wire format (one JSON object per frame):
//!
//! Agent → UI:
//!   { "type": "stream-update", "payload": { "content": "Hello..." } }
//!
//! UI → Agent (request with correlation id):
//!   { "type": "execute-query", "payload": { "query": "..." }, "id": "req-7" }
//!
//! Liveness (initiating side sends, peer answers with the same timestamp):
//!   { "type": "heartbeat", "payload": { "timestamp": 1730000000000 } }
//!   { "type": "heartbeat-ack", "payload": { "timestamp": 1730000000000 } }

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Envelope types — closed set shared by both ends
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EnvelopeType {
    ExecuteQuery,
    CancelTask,
    Heartbeat,
    HeartbeatAck,
    StreamUpdate,
    WorkflowStatus,
}

impl EnvelopeType {
    /// Liveness traffic is handled by the endpoint itself and never reaches
    /// application listeners.
    pub fn is_internal(self) -> bool {
        matches!(self, EnvelopeType::Heartbeat | EnvelopeType::HeartbeatAck)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EnvelopeType::ExecuteQuery => "execute-query",
            EnvelopeType::CancelTask => "cancel-task",
            EnvelopeType::Heartbeat => "heartbeat",
            EnvelopeType::HeartbeatAck => "heartbeat-ack",
            EnvelopeType::StreamUpdate => "stream-update",
            EnvelopeType::WorkflowStatus => "workflow-status",
        }
    }
}

impl std::fmt::Display for EnvelopeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The unit exchanged over a channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Correlation id matching a response to an earlier request.
    #[serde(rename = "id", default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl Envelope {
    pub fn new(kind: EnvelopeType, payload: serde_json::Value) -> Self {
        Self {
            kind,
            payload,
            correlation_id: None,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Heartbeat stamped with `timestamp` (milliseconds since epoch).
    pub fn heartbeat(timestamp: i64) -> Self {
        Self::new(
            EnvelopeType::Heartbeat,
            serde_json::json!({ "timestamp": timestamp }),
        )
    }

    /// Acknowledgment echoing the heartbeat's timestamp.
    pub fn heartbeat_ack(timestamp: i64) -> Self {
        Self::new(
            EnvelopeType::HeartbeatAck,
            serde_json::json!({ "timestamp": timestamp }),
        )
    }

    /// Timestamp carried by a heartbeat or heartbeat-ack payload.
    pub fn heartbeat_timestamp(&self) -> Option<i64> {
        if !self.kind.is_internal() {
            return None;
        }
        serde_json::from_value::<HeartbeatPayload>(self.payload.clone())
            .ok()
            .map(|p| p.timestamp)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::InvalidEnvelope(e.to_string()))
    }
}

/// Payload of heartbeat and heartbeat-ack envelopes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeartbeatPayload {
    pub timestamp: i64,
}
