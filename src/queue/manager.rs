//! Domain core: queue creation, ingestion, windowed retrieval, removal,
//! and housekeeping. All state lives in the store; the manager itself is
//! stateless between calls, so handlers can share one instance freely.

use std::sync::Arc;

use chrono::Utc;

use crate::error::{RelayError, Result};
use crate::store::{keys, Store, StoreError};

use super::models::{
    expiry_after, random_hex, CreateQueueResponse, Message, QueueRecord, ReceiveMessagesResponse,
    SendMessageResponse, DEFAULT_WINDOW_LIMIT, MAX_MESSAGE_BYTES, MAX_QUEUE_DEPTH, MAX_WINDOW_LIMIT,
    MESSAGE_TTL, QUEUE_TTL,
};

pub struct QueueManager {
    store: Arc<dyn Store>,
}

impl QueueManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create a queue with a fresh handle and access token. The token is
    /// returned here and never again; afterwards only the token index knows
    /// it.
    pub async fn create_queue(&self) -> Result<CreateQueueResponse> {
        let handle = random_hex(32);
        let token = random_hex(32);

        let now = Utc::now();
        let expires_at = expiry_after(now, QUEUE_TTL);

        let record = QueueRecord {
            id: handle.clone(),
            created_at: now,
            expires_at,
            last_active: now,
        };
        let body = serde_json::to_string(&record).map_err(StoreError::from)?;

        self.store
            .set_with_ttl(&keys::queue(&handle), &body, QUEUE_TTL)
            .await?;
        self.store
            .set_with_ttl(&keys::token(&token), &handle, QUEUE_TTL)
            .await?;

        tracing::info!(queue_id = %handle, "queue created");

        Ok(CreateQueueResponse {
            queue_url: format!("/queue/{handle}"),
            queue_id: handle,
            access_token: token,
            expires_at,
        })
    }

    /// Accept a ciphertext blob for a queue. Anyone holding the handle may
    /// send; no authentication happens here.
    #[tracing::instrument(name = "queue.append", skip(self, payload), fields(queue_id = %handle, bytes = payload.len()))]
    pub async fn append(&self, handle: &str, payload: Vec<u8>) -> Result<SendMessageResponse> {
        if payload.len() > MAX_MESSAGE_BYTES {
            return Err(RelayError::MessageTooLarge);
        }

        let mut queue = self.fetch_queue(handle).await?;

        // Advisory under concurrent senders: two appends racing at the
        // boundary may both pass, overshooting by one. Tolerated; never
        // undone with a retry loop.
        let depth = self.store.list_len(&keys::message_list(handle)).await?;
        if depth >= MAX_QUEUE_DEPTH {
            return Err(RelayError::QueueFull);
        }

        let message_id = random_hex(16);
        let now = Utc::now();
        let message = Message {
            id: message_id.clone(),
            queue_id: handle.to_string(),
            payload,
            received_at: now,
            expires_at: expiry_after(now, MESSAGE_TTL),
        };
        let body = serde_json::to_string(&message).map_err(StoreError::from)?;

        self.store
            .set_with_ttl(&keys::message(handle, &message_id), &body, MESSAGE_TTL)
            .await?;

        let list_key = keys::message_list(handle);
        self.store.list_append(&list_key, &message_id).await?;
        if let Err(e) = self.store.refresh_ttl(&list_key, QUEUE_TTL).await {
            tracing::warn!(queue_id = %handle, error = %e, "failed to refresh message list ttl");
        }

        queue.last_active = now;
        self.touch(&queue).await;

        tracing::debug!(queue_id = %handle, message_id = %message_id, depth = depth + 1, "message stored");

        Ok(SendMessageResponse {
            message_id,
            sent_at: now,
        })
    }

    /// Return a bounded slice of the queue in arrival order.
    ///
    /// `since` resumes after a previously seen message id. An id that has
    /// vanished from the list (expired or acknowledged) degrades to the
    /// start of the list; clients deduplicate by message id.
    #[tracing::instrument(name = "queue.window", skip(self, token), fields(queue_id = %handle))]
    pub async fn window(
        &self,
        handle: &str,
        token: &str,
        since: Option<&str>,
        limit: Option<usize>,
    ) -> Result<ReceiveMessagesResponse> {
        let mut queue = self.fetch_queue(handle).await?;
        self.authorize(handle, token).await?;

        let list_key = keys::message_list(handle);
        let ids = self.store.list_range(&list_key).await?;

        let limit = match limit {
            None | Some(0) => DEFAULT_WINDOW_LIMIT,
            Some(n) => n.min(MAX_WINDOW_LIMIT),
        };

        let start = match since {
            Some(id) => ids
                .iter()
                .position(|candidate| candidate == id)
                .map(|position| position + 1)
                .unwrap_or(0),
            None => 0,
        };

        let mut messages = Vec::new();
        let mut has_more = false;

        // Ids past the limit are still probed until one resolves to a live
        // record, so has_more reports deliverable messages, not ids whose
        // records have already expired.
        for id in &ids[start..] {
            match self.store.get(&keys::message(handle, id)).await? {
                Some(body) => match serde_json::from_str::<Message>(&body) {
                    Ok(message) => {
                        if messages.len() >= limit {
                            has_more = true;
                            break;
                        }
                        messages.push(message);
                    }
                    Err(e) => {
                        tracing::warn!(queue_id = %handle, message_id = %id, error = %e, "skipping malformed message record");
                    }
                },
                None => {
                    // The record expired on its own; drop the dangling id.
                    if let Err(e) = self.store.list_remove(&list_key, id).await {
                        tracing::warn!(queue_id = %handle, message_id = %id, error = %e, "failed to prune expired message id");
                    }
                }
            }
        }

        queue.last_active = Utc::now();
        self.touch(&queue).await;

        Ok(ReceiveMessagesResponse { messages, has_more })
    }

    /// Remove one delivered message. Idempotent: acknowledging an id that is
    /// already gone succeeds.
    #[tracing::instrument(name = "queue.acknowledge", skip(self, token), fields(queue_id = %handle, message_id = %message_id))]
    pub async fn acknowledge(&self, handle: &str, message_id: &str, token: &str) -> Result<()> {
        self.authorize(handle, token).await?;

        self.store.delete(&keys::message(handle, message_id)).await?;
        self.store
            .list_remove(&keys::message_list(handle), message_id)
            .await?;

        Ok(())
    }

    /// Tear down a queue: every message record, the id list, the queue
    /// record, and the token index entry. Records that are already gone are
    /// not errors.
    #[tracing::instrument(name = "queue.delete", skip(self, token), fields(queue_id = %handle))]
    pub async fn delete_queue(&self, handle: &str, token: &str) -> Result<()> {
        self.authorize(handle, token).await?;

        let list_key = keys::message_list(handle);
        let ids = match self.store.list_range(&list_key).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(queue_id = %handle, error = %e, "could not enumerate messages during delete");
                Vec::new()
            }
        };

        for id in &ids {
            if let Err(e) = self.store.delete(&keys::message(handle, id)).await {
                tracing::warn!(queue_id = %handle, message_id = %id, error = %e, "failed to delete message record");
            }
        }

        self.store.delete(&list_key).await?;
        self.store.delete(&keys::queue(handle)).await?;
        self.store.delete(&keys::token(token)).await?;

        tracing::info!(queue_id = %handle, messages = ids.len(), "queue deleted");

        Ok(())
    }

    /// Check that the token maps to exactly this handle. The index is the
    /// sole authority; queue records carry no secrets to compare against.
    pub async fn authorize(&self, handle: &str, token: &str) -> Result<()> {
        match self.store.get(&keys::token(token)).await? {
            Some(mapped) if mapped == handle => Ok(()),
            _ => Err(RelayError::InvalidAccessToken),
        }
    }

    /// Best-effort housekeeping pass. With a TTL-native backend this does
    /// nothing; backends without autonomous expiry scan here.
    pub async fn housekeep(&self) -> usize {
        match self.store.evict_expired().await {
            Ok(evicted) => {
                if evicted > 0 {
                    tracing::debug!(evicted, "housekeeping pass evicted expired records");
                }
                evicted
            }
            Err(e) => {
                tracing::warn!(error = %e, "housekeeping pass failed");
                0
            }
        }
    }

    async fn fetch_queue(&self, handle: &str) -> Result<QueueRecord> {
        match self.store.get(&keys::queue(handle)).await? {
            Some(body) => Ok(serde_json::from_str(&body).map_err(StoreError::from)?),
            None => Err(RelayError::QueueNotFound),
        }
    }

    /// Rewrite the queue record with its remaining lifetime so activity
    /// tracking never extends the hard expiry. Best-effort.
    async fn touch(&self, queue: &QueueRecord) {
        let remaining = (queue.expires_at - Utc::now())
            .to_std()
            .unwrap_or(QUEUE_TTL);

        let body = match serde_json::to_string(queue) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(queue_id = %queue.id, error = %e, "failed to encode queue record");
                return;
            }
        };

        if let Err(e) = self
            .store
            .set_with_ttl(&keys::queue(&queue.id), &body, remaining)
            .await
        {
            tracing::warn!(queue_id = %queue.id, error = %e, "failed to update queue activity");
        }
    }
}
