//! Runtime event values and their wire payloads.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EngineError;
use crate::types::EventType;

// ---------------------------------------------------------------------------
// Wire payloads
// ---------------------------------------------------------------------------

/// One event batch as submitted by the runtime plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBatchPayload {
    pub graph_id: String,
    pub trace_id: String,
    #[serde(default)]
    pub events: Vec<EventPayload>,
    #[serde(default)]
    pub trace_complete: bool,
}

/// A single submitted event. `event_type` stays a raw string here so the
/// decode step can reject unknown values explicitly instead of letting serde
/// produce an opaque error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

// ---------------------------------------------------------------------------
// Runtime event
// ---------------------------------------------------------------------------

/// A decoded runtime event. Stored in the trace buffer in submission order;
/// the merge engine relies on that ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl RuntimeEvent {
    /// Decode a submitted event. Unknown event types and empty node-ids are
    /// validation errors.
    pub fn from_payload(payload: &EventPayload) -> Result<Self, EngineError> {
        let event_type: EventType = payload.event_type.parse()?;
        if payload.node_id.is_empty() {
            return Err(EngineError::MissingField { field: "nodeId" });
        }
        Ok(Self {
            event_id: payload.event_id.clone().filter(|id| !id.is_empty()),
            event_type,
            timestamp: payload.timestamp,
            node_id: payload.node_id.clone(),
            span_id: payload.span_id.clone(),
            parent_span_id: payload.parent_span_id.clone(),
            duration_ms: payload.duration_ms,
            correlation_id: payload.correlation_id.clone(),
            error_message: payload.error_message.clone(),
            error_type: payload.error_type.clone(),
            attributes: payload.attributes.clone(),
        })
    }

    /// Key used to detect repeat submissions: the event-id when present,
    /// else `(span-id, type, timestamp)`.
    pub fn dedup_key(&self) -> String {
        match &self.event_id {
            Some(id) => id.clone(),
            None => format!(
                "{}:{}:{}",
                self.span_id.as_deref().unwrap_or(""),
                self.event_type,
                self.timestamp.timestamp_millis()
            ),
        }
    }

    /// Correlation id for async-hop matching: the dedicated field, falling
    /// back to the `correlationId` attribute.
    pub fn correlation(&self) -> Option<&str> {
        self.correlation_id
            .as_deref()
            .or_else(|| self.attributes.get("correlationId").and_then(Value::as_str))
    }
}
