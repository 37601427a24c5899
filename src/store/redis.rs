//! Redis-backed store.
//!
//! Keeps one multiplexed connection shared across tasks, established lazily
//! and re-established after dropped-connection or IO errors. Per-key TTL is
//! native, so the eviction seam stays a no-op here.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError};
use tokio::sync::RwLock;

use crate::config::RedisSettings;

use super::{Store, StoreError};

pub struct RedisStore {
    client: Client,
    /// Multiplexed connection (shared across tasks)
    connection: RwLock<Option<MultiplexedConnection>>,
}

impl RedisStore {
    pub fn new(settings: &RedisSettings) -> Result<Self, StoreError> {
        let client = Client::open(settings.url())?;

        Ok(Self {
            client,
            connection: RwLock::new(None),
        })
    }

    /// Open the store and verify the backend answers before serving traffic.
    pub async fn connect(settings: &RedisSettings) -> Result<Self, StoreError> {
        let store = Self::new(settings)?;
        store.ping().await?;
        Ok(store)
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.acquire().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn acquire(&self) -> Result<MultiplexedConnection, StoreError> {
        {
            let conn = self.connection.read().await;
            if let Some(ref c) = *conn {
                return Ok(c.clone());
            }
        }

        self.establish().await
    }

    async fn establish(&self) -> Result<MultiplexedConnection, StoreError> {
        let mut guard = self.connection.write().await;

        // Another task may have connected while we waited for the lock
        if let Some(ref c) = *guard {
            return Ok(c.clone());
        }

        match self.client.get_multiplexed_tokio_connection().await {
            Ok(conn) => {
                *guard = Some(conn.clone());
                tracing::info!("redis connection established");
                Ok(conn)
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to connect to redis");
                Err(StoreError::Redis(e))
            }
        }
    }

    /// Drop the cached connection when the error indicates it died, so the
    /// next call reconnects instead of failing forever.
    async fn note_failure(&self, error: &RedisError) {
        if error.is_connection_dropped() || error.is_io_error() {
            let mut guard = self.connection.write().await;
            *guard = None;
        }
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.acquire().await?;

        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.note_failure(&e).await;
                Err(e.into())
            }
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.acquire().await?;

        match conn.set_ex::<_, _, ()>(key, value, ttl.as_secs()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.note_failure(&e).await;
                Err(e.into())
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.acquire().await?;

        match conn.del::<_, ()>(key).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.note_failure(&e).await;
                Err(e.into())
            }
        }
    }

    async fn list_append(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.acquire().await?;

        match conn.rpush::<_, _, ()>(key, value).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.note_failure(&e).await;
                Err(e.into())
            }
        }
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.acquire().await?;

        match conn.lrange::<_, Vec<String>>(key, 0, -1).await {
            Ok(values) => Ok(values),
            Err(e) => {
                self.note_failure(&e).await;
                Err(e.into())
            }
        }
    }

    async fn list_remove(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.acquire().await?;

        match conn.lrem::<_, _, ()>(key, 1, value).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.note_failure(&e).await;
                Err(e.into())
            }
        }
    }

    async fn list_len(&self, key: &str) -> Result<usize, StoreError> {
        let mut conn = self.acquire().await?;

        match conn.llen::<_, usize>(key).await {
            Ok(len) => Ok(len),
            Err(e) => {
                self.note_failure(&e).await;
                Err(e.into())
            }
        }
    }

    async fn refresh_ttl(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.acquire().await?;

        match conn.expire::<_, ()>(key, ttl.as_secs() as i64).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.note_failure(&e).await;
                Err(e.into())
            }
        }
    }
}
