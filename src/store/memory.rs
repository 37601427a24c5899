//! In-memory store using DashMap.
//!
//! Deadlines are checked lazily on access; the [`Store::evict_expired`] seam
//! does the scan the Redis backend gets for free from per-key TTL. Used by
//! the test suites and exercised by the sweeper.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{Store, StoreError};

#[derive(Debug, Clone)]
enum Slot {
    Text(String),
    List(Vec<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    slot: Slot,
    /// `None` mirrors a key created without TTL (a fresh list before its
    /// first refresh).
    deadline: Option<Instant>,
}

impl Entry {
    fn live(&self) -> bool {
        self.deadline.map_or(true, |at| Instant::now() < at)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the key if its deadline has passed; reports whether it survived.
    fn prune(&self, key: &str) -> bool {
        let expired = match self.entries.get(key) {
            Some(entry) => !entry.live(),
            None => return false,
        };
        if expired {
            self.entries.remove(key);
            return false;
        }
        true
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if !self.prune(key) {
            return Ok(None);
        }

        let value = self.entries.get(key).and_then(|entry| match &entry.slot {
            Slot::Text(value) => Some(value.clone()),
            Slot::List(_) => None,
        });
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                slot: Slot::Text(value.to_string()),
                deadline: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn list_append(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.prune(key);

        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            slot: Slot::List(Vec::new()),
            deadline: None,
        });
        match &mut entry.slot {
            Slot::List(items) => items.push(value.to_string()),
            // Type clash; Redis would answer WRONGTYPE here
            Slot::Text(_) => {
                return Err(StoreError::Unavailable(format!(
                    "key {key} holds a scalar, not a list"
                )));
            }
        }
        Ok(())
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, StoreError> {
        if !self.prune(key) {
            return Ok(Vec::new());
        }

        let items = self
            .entries
            .get(key)
            .map(|entry| match &entry.slot {
                Slot::List(items) => items.clone(),
                Slot::Text(_) => Vec::new(),
            })
            .unwrap_or_default();
        Ok(items)
    }

    async fn list_remove(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if !self.prune(key) {
            return Ok(());
        }

        if let Some(mut entry) = self.entries.get_mut(key) {
            if let Slot::List(items) = &mut entry.slot {
                if let Some(position) = items.iter().position(|item| item == value) {
                    items.remove(position);
                }
            }
        }
        Ok(())
    }

    async fn list_len(&self, key: &str) -> Result<usize, StoreError> {
        if !self.prune(key) {
            return Ok(0);
        }

        let len = self
            .entries
            .get(key)
            .map(|entry| match &entry.slot {
                Slot::List(items) => items.len(),
                Slot::Text(_) => 0,
            })
            .unwrap_or(0);
        Ok(len)
    }

    async fn refresh_ttl(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        if !self.prune(key) {
            return Ok(());
        }

        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.deadline = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn evict_expired(&self) -> Result<usize, StoreError> {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.live());
        Ok(before - self.entries.len())
    }
}
