use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::queue::payload_encoding;

/// Frames sent by streaming clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe {
        queue_id: String,
        #[serde(default)]
        access_token: Option<String>,
    },
    Unsubscribe {
        queue_id: String,
    },
    Ack {
        queue_id: String,
        message_id: String,
        access_token: String,
    },
    Ping,
}

/// Frames sent by the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Message {
        queue_id: String,
        message_id: String,
        #[serde(with = "payload_encoding")]
        payload: Vec<u8>,
        timestamp: DateTime<Utc>,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
    Error {
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl ServerFrame {
    pub fn message(queue_id: impl Into<String>, message_id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self::Message {
            queue_id: queue_id.into(),
            message_id: message_id.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn pong() -> Self {
        Self::Pong {
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// What a session's writer task may be asked to put on the wire. Funnelling
/// everything through one channel per connection keeps replies and
/// broadcasts from interleaving mid-frame.
#[derive(Debug, Clone)]
pub enum Outbound {
    Frame(ServerFrame),
    /// Protocol-level keepalive ping.
    Ping,
    /// Close the connection from the server side.
    Close,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_wire_format() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"subscribe","queue_id":"q1","access_token":"t1"}"#)
                .unwrap();
        match frame {
            ClientFrame::Subscribe {
                queue_id,
                access_token,
            } => {
                assert_eq!(queue_id, "q1");
                assert_eq!(access_token.as_deref(), Some("t1"));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_subscribe_token_is_optional() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"subscribe","queue_id":"q1"}"#).unwrap();
        assert!(matches!(
            frame,
            ClientFrame::Subscribe {
                access_token: None,
                ..
            }
        ));
    }

    #[test]
    fn test_ping_ignores_extra_fields() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"ping","timestamp":"2024-01-01T00:00:00Z"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Ping));
    }

    #[test]
    fn test_ack_requires_token() {
        let result = serde_json::from_str::<ClientFrame>(
            r#"{"type":"ack","queue_id":"q1","message_id":"m1"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_message_frame_payload_is_base64() {
        let frame = ServerFrame::message("q1", "m1", vec![9, 9]);
        let wire = serde_json::to_value(&frame).unwrap();
        assert_eq!(wire["type"], "message");
        assert_eq!(wire["queue_id"], "q1");
        assert_eq!(wire["message_id"], "m1");
        assert_eq!(wire["payload"], "CQk=");
        assert!(wire["timestamp"].is_string());
    }

    #[test]
    fn test_pong_wire_format() {
        let wire = serde_json::to_value(ServerFrame::pong()).unwrap();
        assert_eq!(wire["type"], "pong");
    }

    #[test]
    fn test_error_wire_format() {
        let wire = serde_json::to_value(ServerFrame::error("invalid access token")).unwrap();
        assert_eq!(wire["type"], "error");
        assert_eq!(wire["error"], "invalid access token");
    }
}
