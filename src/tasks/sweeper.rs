use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::queue::QueueManager;

/// Periodic housekeeping pass. With a TTL-native store each tick is a no-op;
/// the task exists so backends without autonomous expiry still get swept.
pub struct SweeperTask {
    interval: Duration,
    manager: Arc<QueueManager>,
    shutdown: broadcast::Receiver<()>,
}

impl SweeperTask {
    pub fn new(
        interval: Duration,
        manager: Arc<QueueManager>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            interval,
            manager,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut timer = tokio::time::interval(self.interval);

        // Skip immediate first tick
        timer.tick().await;

        tracing::info!(interval_secs = self.interval.as_secs(), "sweeper task started");

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("sweeper task received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    let evicted = self.manager.housekeep().await;
                    if evicted > 0 {
                        tracing::info!(evicted, "sweeper evicted expired records");
                    }
                }
            }
        }

        tracing::info!("sweeper task stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let manager = Arc::new(QueueManager::new(Arc::new(MemoryStore::new())));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = SweeperTask::new(Duration::from_secs(3600), manager, shutdown_rx);
        let handle = tokio::spawn(async move {
            task.run().await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("task should stop")
            .expect("task should not panic");
    }

    #[tokio::test]
    async fn test_sweeper_invokes_housekeeping() {
        use crate::store::Store;

        let store = Arc::new(MemoryStore::new());
        store
            .set_with_ttl("doomed", "v", Duration::from_millis(5))
            .await
            .unwrap();

        let manager = Arc::new(QueueManager::new(store.clone()));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = SweeperTask::new(Duration::from_millis(20), manager, shutdown_rx);
        let handle = tokio::spawn(async move {
            task.run().await;
        });

        tokio::time::sleep(Duration::from_millis(80)).await;
        shutdown_tx.send(()).unwrap();
        let _ = handle.await;

        // The expired record was scanned away, not merely hidden
        assert_eq!(store.evict_expired().await.unwrap(), 0);
    }
}
