mod manager;
mod models;

pub use manager::QueueManager;
pub use models::{
    payload_encoding, random_hex, CreateQueueResponse, Message, QueueRecord,
    ReceiveMessagesResponse, SendMessageRequest, SendMessageResponse, DEFAULT_WINDOW_LIMIT,
    MAX_MESSAGE_BYTES, MAX_QUEUE_DEPTH, MAX_WINDOW_LIMIT, MESSAGE_TTL, QUEUE_TTL,
};
