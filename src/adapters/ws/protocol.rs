//! Inbound WebSocket frames.
//!
//! Clients speak a small JSON vocabulary tagged by `type`. Outbound frames
//! are `PushMessage` envelopes and `ControlMessage` replies.

use serde::Deserialize;

/// Message sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Refresh the liveness timestamp.
    Heartbeat,
    /// Join a topic.
    Subscribe {
        /// Topic name, e.g. `signals` or `strategy_7_logs`.
        topic: String,
    },
    /// Leave a topic.
    Unsubscribe {
        /// Topic name.
        topic: String,
    },
    /// Application-level ping; answered with `pong` and counted as a heartbeat.
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_client_messages() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"heartbeat"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Heartbeat);

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","topic":"signals"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Subscribe {
                topic: "signals".to_string()
            }
        );

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping","extra":1}"#).unwrap();
        assert_eq!(msg, ClientMessage::Ping);
    }

    #[test]
    fn test_reject_unknown_type() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"shutdown"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"subscribe"}"#).is_err());
    }
}
