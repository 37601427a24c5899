//! Storage abstraction for queue, message, and token records.
//!
//! The relay only needs a small capability set from its backing store:
//! single-key get/set/delete with per-key TTL, atomic list append, ranged
//! list read, removal by value, and TTL refresh. "Not found" is an
//! `Ok(None)` / empty result, distinct from a [`StoreError`] fault.

mod memory;
mod redis;

use std::time::Duration;

use async_trait::async_trait;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Redis operation failed
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// Record could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Connection not available
    #[error("connection not available: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch a value; `None` means absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Deleting an absent key is a no-op success.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Atomically append a value to the tail of a list, creating it if absent.
    async fn list_append(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Full contents of a list in insertion order; empty when absent.
    async fn list_range(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Remove the first occurrence of `value` from a list.
    async fn list_remove(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn list_len(&self, key: &str) -> Result<usize, StoreError>;

    async fn refresh_ttl(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Eviction seam for backends without autonomous per-key expiry.
    /// Returns the number of records dropped.
    async fn evict_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}

/// Key scheme shared by every backend.
pub mod keys {
    pub fn queue(handle: &str) -> String {
        format!("queue:{handle}")
    }

    pub fn token(token: &str) -> String {
        format!("token:{token}")
    }

    pub fn message_list(handle: &str) -> String {
        format!("queue:{handle}:messages")
    }

    pub fn message(handle: &str, message_id: &str) -> String {
        format!("message:{handle}:{message_id}")
    }
}
