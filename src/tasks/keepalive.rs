use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::StreamSettings;
use crate::registry::SubscriberRegistry;

/// Keeps streaming sessions honest: periodic protocol pings so idle
/// connections stay open, and a cleanup pass that closes sessions that have
/// gone silent past the read deadline.
pub struct KeepaliveTask {
    settings: StreamSettings,
    registry: Arc<SubscriberRegistry>,
    shutdown: broadcast::Receiver<()>,
}

impl KeepaliveTask {
    pub fn new(
        settings: StreamSettings,
        registry: Arc<SubscriberRegistry>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            settings,
            registry,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let ping_interval = Duration::from_secs(self.settings.ping_interval);
        let cleanup_interval = Duration::from_secs(self.settings.cleanup_interval);
        let read_deadline = Duration::from_secs(self.settings.read_deadline);

        let mut ping_timer = tokio::time::interval(ping_interval);
        let mut cleanup_timer = tokio::time::interval(cleanup_interval);

        // Skip immediate first tick
        ping_timer.tick().await;
        cleanup_timer.tick().await;

        tracing::info!(
            ping_interval_secs = self.settings.ping_interval,
            read_deadline_secs = self.settings.read_deadline,
            "keepalive task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("keepalive task received shutdown signal");
                    break;
                }
                _ = ping_timer.tick() => {
                    self.send_pings();
                }
                _ = cleanup_timer.tick() => {
                    let removed = self.registry.cleanup_stale(read_deadline).await;
                    if removed > 0 {
                        tracing::info!(removed, "closed sessions past the read deadline");
                    }
                }
            }
        }

        tracing::info!("keepalive task stopped");
    }

    fn send_pings(&self) {
        let sessions = self.registry.sessions_snapshot();
        if sessions.is_empty() {
            return;
        }

        let mut failed = 0;
        for session in &sessions {
            if session.ping().is_err() {
                failed += 1;
                tracing::debug!(
                    session_id = %session.id,
                    "failed to queue ping, session may be dead"
                );
            }
        }

        tracing::debug!(
            total = sessions.len(),
            failed,
            "keepalive round completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::mpsc;

    use crate::ws::Outbound;

    #[tokio::test]
    async fn test_keepalive_stops_on_shutdown() {
        let registry = Arc::new(SubscriberRegistry::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = KeepaliveTask::new(StreamSettings::default(), registry, shutdown_rx);
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
    async fn test_keepalive_pings_sessions() {
        let registry = Arc::new(SubscriberRegistry::new());
        let (tx, mut rx) = mpsc::channel::<Outbound>(8);
        let _session = registry.register(tx);

        let settings = StreamSettings {
            ping_interval: 1,
            read_deadline: 60,
            cleanup_interval: 60,
        };
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = KeepaliveTask::new(settings, registry, shutdown_rx);
        let handle = tokio::spawn(async move {
            task.run().await;
        });

        let outbound = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("should receive ping")
            .expect("channel should stay open");
        assert!(matches!(outbound, Outbound::Ping));

        shutdown_tx.send(()).unwrap();
        let _ = handle.await;
    }
}
