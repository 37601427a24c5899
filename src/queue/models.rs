use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Queues expire a fixed interval after creation; activity never extends the
/// hard expiry.
pub const QUEUE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Undelivered messages expire on their own.
pub const MESSAGE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub const MAX_QUEUE_DEPTH: usize = 1000;

pub const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

pub const DEFAULT_WINDOW_LIMIT: usize = 100;

pub const MAX_WINDOW_LIMIT: usize = 100;

/// Persisted queue record. The access token is deliberately absent: the
/// token index is the only authorization authority, so the record never
/// carries a secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// An opaque ciphertext blob queued for one receiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub queue_id: String,
    #[serde(with = "payload_encoding")]
    pub payload: Vec<u8>,
    pub received_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQueueResponse {
    /// Share this with senders.
    pub queue_id: String,
    /// Returned exactly once; keep it private.
    pub access_token: String,
    pub queue_url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    #[serde(with = "payload_encoding")]
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub message_id: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveMessagesResponse {
    pub messages: Vec<Message>,
    pub has_more: bool,
}

/// Generate a cryptographically secure random identifier, hex-encoded.
pub fn random_hex(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut bytes);
    hex::encode(bytes)
}

/// Shift a wall-clock timestamp by a TTL.
pub fn expiry_after(start: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    start + chrono::Duration::seconds(ttl.as_secs() as i64)
}

/// Payload bytes on the wire: base64 on send, base64 string or JSON octet
/// array accepted on receive. Clients predate the canonical form and emit
/// both.
pub mod payload_encoding {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Text(String),
        Octets(Vec<u8>),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Wire::deserialize(deserializer)? {
            Wire::Text(text) => STANDARD
                .decode(text.as_bytes())
                .map_err(serde::de::Error::custom),
            Wire::Octets(bytes) => Ok(bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_hex_length_and_alphabet() {
        let handle = random_hex(32);
        assert_eq!(handle.len(), 64);
        assert!(handle.chars().all(|c| c.is_ascii_hexdigit()));

        let message_id = random_hex(16);
        assert_eq!(message_id.len(), 32);
    }

    #[test]
    fn test_random_hex_is_unique() {
        let a = random_hex(32);
        let b = random_hex(32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_payload_serializes_as_base64() {
        let request = SendMessageRequest {
            payload: vec![1, 2, 3],
        };
        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["payload"], "AQID");
    }

    #[test]
    fn test_payload_accepts_base64_string() {
        let request: SendMessageRequest = serde_json::from_str(r#"{"payload":"AQID"}"#).unwrap();
        assert_eq!(request.payload, vec![1, 2, 3]);
    }

    #[test]
    fn test_payload_accepts_octet_array() {
        let request: SendMessageRequest = serde_json::from_str(r#"{"payload":[9,9]}"#).unwrap();
        assert_eq!(request.payload, vec![9, 9]);
    }

    #[test]
    fn test_payload_rejects_invalid_base64() {
        let result = serde_json::from_str::<SendMessageRequest>(r#"{"payload":"!!!"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_message_expiry_matches_ttl() {
        let now = Utc::now();
        let expires = expiry_after(now, MESSAGE_TTL);
        assert_eq!((expires - now).num_seconds(), 24 * 60 * 60);
    }
}
