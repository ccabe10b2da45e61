//! Outbound message shapes.
//!
//! Every push shares the envelope `{type, topic | event_type, data, timestamp}`.
//! Control frames (ping, acks, errors) are a separate, smaller vocabulary
//! addressed to a single connection.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use super::topic::Topic;

/// Generic broadcast envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    /// Message kind (`signal`, `strategy_status`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Topic the message was routed through, absent for global pushes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<Topic>,
    /// Finer-grained event name for status and alert pushes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// Payload.
    pub data: Value,
    /// RFC 3339 creation time.
    pub timestamp: String,
}

impl PushMessage {
    /// Build a topic-scoped message stamped now.
    pub fn for_topic(kind: &str, topic: Topic, data: Value) -> Self {
        Self {
            kind: kind.to_string(),
            topic: Some(topic),
            event_type: None,
            data,
            timestamp: now_rfc3339(),
        }
    }

    /// Build a global event message stamped now.
    pub fn event(kind: &str, event_type: &str, data: Value) -> Self {
        Self {
            kind: kind.to_string(),
            topic: None,
            event_type: Some(event_type.to_string()),
            data,
            timestamp: now_rfc3339(),
        }
    }

    /// Attach an event type.
    #[must_use]
    pub fn with_event_type(mut self, event_type: &str) -> Self {
        self.event_type = Some(event_type.to_string());
        self
    }
}

/// Worker status reported by the lifecycle flow or by strategies themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyStatus {
    Started,
    Stopped,
    Error,
    Running,
    /// Any other status string, forwarded verbatim.
    Other(String),
}

impl StrategyStatus {
    /// Parse a free-form status string.
    pub fn parse(status: &str) -> Self {
        match status {
            "started" => Self::Started,
            "stopped" => Self::Stopped,
            "error" => Self::Error,
            "running" => Self::Running,
            other => Self::Other(other.to_string()),
        }
    }

    /// Status as sent in the payload.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::Error => "error",
            Self::Running => "running",
            Self::Other(s) => s,
        }
    }

    /// Event type for the status push.
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Started => "strategy_started",
            Self::Stopped => "strategy_stopped",
            Self::Error => "strategy_error",
            Self::Running => "strategy_running",
            Self::Other(_) => "strategy_update",
        }
    }
}

/// Frames addressed to one connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Greeting sent right after accept.
    ConnectionEstablished { client_id: String, timestamp: String },
    /// Unilateral liveness probe from the heartbeat monitor.
    Ping { timestamp: String },
    /// Reply to a client `ping`.
    Pong { timestamp: String },
    /// Reply to a client `heartbeat`.
    HeartbeatAck { timestamp: String },
    /// Subscription confirmed.
    Subscribed { topic: String },
    /// Unsubscription confirmed.
    Unsubscribed { topic: String },
    /// Malformed or unsupported client frame.
    Error { message: String },
}

impl ControlMessage {
    /// Liveness probe stamped now.
    pub fn ping() -> Self {
        Self::Ping {
            timestamp: now_rfc3339(),
        }
    }
}

/// Current time as RFC 3339.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}
