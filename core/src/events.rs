use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const AGENT_STARTED: &str = "agent_started";
pub const AGENT_THINKING: &str = "agent_thinking";
pub const TOOL_EXECUTING: &str = "tool_executing";
pub const TOOL_COMPLETED: &str = "tool_completed";
pub const AGENT_COMPLETED: &str = "agent_completed";
pub const PARTIAL_RESULT: &str = "partial_result";
pub const FINAL_REPORT: &str = "final_report";
pub const AGENT_FALLBACK: &str = "agent_fallback";

/// The five lifecycle events every chat session must emit.
pub const REQUIRED_EVENTS: [&str; 5] = [
    AGENT_STARTED,
    AGENT_THINKING,
    TOOL_EXECUTING,
    TOOL_COMPLETED,
    AGENT_COMPLETED,
];

/// Events that show the agent is doing something.
pub const ACTIVITY_EVENTS: [&str; 3] = [AGENT_THINKING, TOOL_EXECUTING, PARTIAL_RESULT];

/// Events that may legitimately end a session.
pub const COMPLETION_EVENTS: [&str; 3] = [AGENT_COMPLETED, FINAL_REPORT, AGENT_FALLBACK];

pub fn is_activity(event_type: &str) -> bool {
    ACTIVITY_EVENTS.iter().any(|e| *e == event_type)
}

pub fn is_completion(event_type: &str) -> bool {
    COMPLETION_EVENTS.iter().any(|e| *e == event_type)
}

/// A single event pushed by the server during a chat session.
///
/// `event_type` is a free-form string; unknown types are kept for
/// diagnostics. It is optional because a server bug can drop it, and the
/// validator needs to see that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    pub data: Value,
}

impl ChatEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: Some(event_type.into()),
            timestamp: None,
            data: Value::Object(Default::default()),
        }
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Read an event from a JSON object. `type` wins over the legacy
    /// `event` field; `data` falls back to `payload`, then the whole object.
    pub fn from_json(value: &Value) -> Self {
        let event_type = ["type", "event"]
            .iter()
            .find_map(|key| value.get(*key).and_then(Value::as_str))
            .map(str::to_string);
        let timestamp = value.get("timestamp").and_then(Value::as_f64);
        let data = value
            .get("data")
            .or_else(|| value.get("payload"))
            .cloned()
            .unwrap_or_else(|| value.clone());

        Self {
            event_type,
            timestamp,
            data,
        }
    }

    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }
}

/// One text frame off the socket.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Event(ChatEvent),
    /// Not JSON, or JSON that is not an object
    Malformed(String),
}

impl InboundFrame {
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) if value.is_object() => InboundFrame::Event(ChatEvent::from_json(&value)),
            _ => InboundFrame::Malformed(text.to_string()),
        }
    }
}
