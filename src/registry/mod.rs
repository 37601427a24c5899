//! In-process map from queue handle to live streaming sessions.
//!
//! Holds no persistent state: sessions register an outbound channel, attach
//! to queue handles, and receive broadcasts until they detach or die.
//! Broadcast snapshots the subscriber set before touching any channel so no
//! map guard is held across channel operations.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::ws::{Outbound, ServerFrame};

/// Handle for a single streaming session.
pub struct SessionHandle {
    pub id: Uuid,
    sender: mpsc::Sender<Outbound>,
    pub connected_at: DateTime<Utc>,
    /// Last inbound activity (Unix seconds); lock-free updates.
    last_activity: AtomicI64,
    /// Queue handles this session is attached to, so disconnect can detach
    /// all of them.
    pub subscriptions: RwLock<HashSet<String>>,
}

impl SessionHandle {
    fn new(sender: mpsc::Sender<Outbound>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            sender,
            connected_at: now,
            last_activity: AtomicI64::new(now.timestamp()),
            subscriptions: RwLock::new(HashSet::new()),
        }
    }

    pub fn touch(&self) {
        self.last_activity
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.last_activity.load(Ordering::Relaxed), 0)
            .unwrap_or_else(Utc::now)
    }

    /// Queue a frame for the session's writer task, waiting for room.
    pub async fn send(
        &self,
        frame: ServerFrame,
    ) -> Result<(), mpsc::error::SendError<Outbound>> {
        self.sender.send(Outbound::Frame(frame)).await
    }

    /// Queue a frame without waiting. A full or closed channel is the
    /// caller's signal to skip this session.
    pub fn try_send(&self, frame: ServerFrame) -> Result<(), mpsc::error::TrySendError<Outbound>> {
        self.sender.try_send(Outbound::Frame(frame))
    }

    /// Queue a protocol-level keepalive ping.
    pub fn ping(&self) -> Result<(), mpsc::error::TrySendError<Outbound>> {
        self.sender.try_send(Outbound::Ping)
    }

    /// Ask the writer task to close the connection.
    pub fn close(&self) {
        let _ = self.sender.try_send(Outbound::Close);
    }
}

/// Registry of live sessions and their queue subscriptions.
#[derive(Default)]
pub struct SubscriberRegistry {
    /// session id -> handle
    sessions: DashMap<Uuid, Arc<SessionHandle>>,
    /// queue handle -> subscribed session ids
    queues: DashMap<String, HashSet<Uuid>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, sender: mpsc::Sender<Outbound>) -> Arc<SessionHandle> {
        let handle = Arc::new(SessionHandle::new(sender));
        self.sessions.insert(handle.id, handle.clone());

        tracing::info!(session_id = %handle.id, "session registered");
        handle
    }

    pub async fn unregister(&self, session_id: Uuid) {
        if let Some((_, handle)) = self.sessions.remove(&session_id) {
            let subscribed = handle.subscriptions.read().await.clone();
            for queue_id in subscribed {
                self.drop_from_index(&queue_id, session_id);
            }

            tracing::info!(session_id = %session_id, "session unregistered");
        }
    }

    /// Attach a session as a subscriber of a queue handle.
    pub async fn attach(&self, session: &Arc<SessionHandle>, queue_id: &str) {
        session
            .subscriptions
            .write()
            .await
            .insert(queue_id.to_string());

        self.queues
            .entry(queue_id.to_string())
            .or_default()
            .insert(session.id);

        tracing::debug!(session_id = %session.id, queue_id = %queue_id, "subscribed");
    }

    pub async fn detach(&self, session: &Arc<SessionHandle>, queue_id: &str) {
        session.subscriptions.write().await.remove(queue_id);
        self.drop_from_index(queue_id, session.id);

        tracing::debug!(session_id = %session.id, queue_id = %queue_id, "unsubscribed");
    }

    /// Deliver a frame to every current subscriber of a queue. Best-effort:
    /// a session whose channel is full or closed is logged and skipped; the
    /// owning session detaches itself when it next observes the error.
    /// Returns the number of sessions the frame was queued for.
    pub fn broadcast(&self, queue_id: &str, frame: ServerFrame) -> usize {
        let targets = self.subscribers(queue_id);
        if targets.is_empty() {
            return 0;
        }

        let mut delivered = 0;
        for session in targets {
            match session.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        session_id = %session.id,
                        queue_id = %queue_id,
                        error = %e,
                        "skipping subscriber that cannot accept the notification"
                    );
                }
            }
        }

        delivered
    }

    /// Snapshot of the sessions attached to a queue. Taken before any
    /// channel I/O so broadcasts never hold the index guard.
    pub fn subscribers(&self, queue_id: &str) -> Vec<Arc<SessionHandle>> {
        self.queues
            .get(queue_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.sessions.get(id).map(|h| h.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, queue_id: &str) -> usize {
        self.queues.get(queue_id).map(|ids| ids.len()).unwrap_or(0)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Snapshot of every live session (for keepalive pings).
    pub fn sessions_snapshot(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Sessions with no inbound traffic for longer than `idle`.
    pub fn find_stale(&self, idle: Duration) -> Vec<Uuid> {
        let now = Utc::now();
        let idle = chrono::Duration::seconds(idle.as_secs() as i64);

        self.sessions
            .iter()
            .filter(|entry| now.signed_duration_since(entry.value().last_activity()) > idle)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Close and unregister every stale session; returns how many.
    pub async fn cleanup_stale(&self, idle: Duration) -> usize {
        let stale = self.find_stale(idle);
        let count = stale.len();

        for session_id in stale {
            if let Some(handle) = self.sessions.get(&session_id).map(|h| h.clone()) {
                handle.close();
            }
            tracing::info!(session_id = %session_id, "closing stale session");
            self.unregister(session_id).await;
        }

        count
    }

    /// Shutdown: ask every session to close and drop all registrations.
    pub fn close(&self) {
        for entry in self.sessions.iter() {
            entry.value().close();
        }
        self.sessions.clear();
        self.queues.clear();

        tracing::info!("subscriber registry closed");
    }

    fn drop_from_index(&self, queue_id: &str, session_id: Uuid) {
        if let Some(mut ids) = self.queues.get_mut(queue_id) {
            ids.remove(&session_id);
            if ids.is_empty() {
                drop(ids);
                self.queues.remove(queue_id);
            }
        }
    }
}
