use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use veil_relay::config::Settings;
use veil_relay::server::{create_app, AppState};
use veil_relay::store::RedisStore;
use veil_relay::tasks::{KeepaliveTask, SweeperTask};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    init_tracing();

    // Load configuration
    let settings = Settings::new()?;
    tracing::info!(port = settings.port, redis = %settings.redis.addr, "configuration loaded");

    // Connect to the store; a dead backend at startup is fatal
    let store = RedisStore::connect(&settings.redis).await?;
    tracing::info!("connected to redis");

    // Create application state
    let state = AppState::new(settings, Arc::new(store));

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    // Start housekeeping sweeper in background
    let sweeper = SweeperTask::new(
        std::time::Duration::from_secs(state.settings.sweeper.interval),
        state.manager.clone(),
        shutdown_tx.subscribe(),
    );
    let sweeper_handle = tokio::spawn(async move {
        sweeper.run().await;
    });

    // Start session keepalive task in background
    let keepalive = KeepaliveTask::new(
        state.settings.stream.clone(),
        state.registry.clone(),
        shutdown_tx.subscribe(),
    );
    let keepalive_handle = tokio::spawn(async move {
        keepalive.run().await;
    });

    // Create Axum app
    let app = create_app(state.clone());

    // Start server
    let addr = state.settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "relay listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown_tx.clone()))
        .await?;

    // Drop every streaming session, then give the background tasks a
    // bounded window to finish
    state.registry.close();

    let grace = std::time::Duration::from_secs(state.settings.server.shutdown_grace);
    let drained = tokio::time::timeout(grace, async {
        let _ = tokio::join!(sweeper_handle, keepalive_handle);
    })
    .await;
    if drained.is_err() {
        tracing::warn!("background tasks did not stop within the grace period");
    }

    tracing::info!("shutdown complete");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal_handler(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    // Stop background tasks
    let _ = shutdown_tx.send(());
}
