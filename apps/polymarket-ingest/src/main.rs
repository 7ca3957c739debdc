//! Polymarket Ingest Binary
//!
//! Starts live order book ingestion.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin polymarket-ingest
//! ```
//!
//! # Environment Variables
//!
//! ## Optional
//! - `POLYMARKET_API_KEY`, `POLYMARKET_SECRET`, `POLYMARKET_PASSPHRASE`:
//!   credentials for the auth frame (all three or none)
//! - `POLYMARKET_WSS_URL`: market channel URL
//! - `WATCHLIST_PATH`: watch-list JSON file (default: watchlist.json)
//! - `BOOK_STORE_PATH`: JSON-lines store file (default: in memory)
//! - `MARKET_CHECK_INTERVAL`: reconciliation period (default: 300)
//! - `INGEST_HEALTH_PORT`: health/metrics/command HTTP port (default: 8083)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `RUST_LOG`: Log filter (default: `polymarket_ingest=info`)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use polymarket_ingest::application::ports::{
    BookStorePort, IngestionControl, NotificationPort, WatchListPort,
};
use polymarket_ingest::application::services::{
    CommandIntake, CommandRegistry, EventDispatcher, ReconcileCommand, RestartCommand,
    RetentionCleanup, SubscriptionReconciler,
};
use polymarket_ingest::infrastructure::broadcast::{NotificationConfig, NotificationHub};
use polymarket_ingest::infrastructure::commands::{DEFAULT_COMMAND_CAPACITY, command_queue};
use polymarket_ingest::infrastructure::health::{HealthServer, HealthServerState};
use polymarket_ingest::infrastructure::polymarket::{Supervisor, WsTransport};
use polymarket_ingest::infrastructure::store::{InMemoryBookStore, JsonlBookStore};
use polymarket_ingest::infrastructure::telemetry;
use polymarket_ingest::infrastructure::watchlist::JsonFileWatchList;
use polymarket_ingest::{FeedEvent, IngestConfig, init_metrics};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Polymarket ingest");

    // Initialize Prometheus metrics
    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder unavailable, metrics disabled");
    }

    let config = IngestConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Adapters
    let hub = Arc::new(NotificationHub::new(NotificationConfig {
        capacity: config.channels.notification_capacity,
    }));
    let store: Arc<dyn BookStorePort> = match &config.storage.book_store_path {
        Some(path) => Arc::new(JsonlBookStore::new(path.clone())),
        None => Arc::new(InMemoryBookStore::new()),
    };
    let watch_list: Arc<dyn WatchListPort> =
        Arc::new(JsonFileWatchList::new(config.storage.watchlist_path.clone()));

    // Supervisor and the feed it produces
    let (feed_tx, feed_rx) = mpsc::channel::<FeedEvent>(config.channels.event_capacity);
    let transport = WsTransport::new(config.transport_config());
    let (supervisor, handle) = Supervisor::new(
        transport,
        Arc::clone(&watch_list),
        config.supervisor_config(),
        feed_tx,
        shutdown_token.clone(),
    );
    let status = handle.status();
    let control: Arc<dyn IngestionControl> = Arc::new(handle);

    // Reconciler and operator commands
    let reconciler = SubscriptionReconciler::new(
        Arc::clone(&watch_list),
        Arc::clone(&control),
        config.reconciler_config(),
    );
    let registry = CommandRegistry::new()
        .with("restart", Arc::new(RestartCommand::new(Arc::clone(&control))))
        .with(
            "reconcile",
            Arc::new(ReconcileCommand::new(reconciler.trigger())),
        );
    let (command_tx, command_source) = command_queue(DEFAULT_COMMAND_CAPACITY);
    let intake = CommandIntake::new(command_source, registry);

    // Downstream of the feed
    let notifier: Arc<dyn NotificationPort> = Arc::clone(&hub) as Arc<dyn NotificationPort>;
    let dispatcher = EventDispatcher::new(Arc::clone(&store), notifier);
    let retention = RetentionCleanup::new(store, config.retention_config());

    // Health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        status,
        Arc::clone(&hub),
        command_tx,
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    tasks.push(tokio::spawn(supervisor.run()));
    tasks.push(tokio::spawn(reconciler.run(shutdown_token.clone())));
    tasks.push(tokio::spawn(intake.run(shutdown_token.clone())));
    tasks.push(tokio::spawn(retention.run(shutdown_token.clone())));

    let dispatch_cancel = shutdown_token.clone();
    tasks.push(tokio::spawn(async move {
        let stats = dispatcher.run(feed_rx, dispatch_cancel).await;
        tracing::info!(
            events = stats.events,
            store_failures = stats.store_failures,
            published = stats.published,
            publish_failures = stats.publish_failures,
            "Dispatcher stopped"
        );
    }));

    tasks.push(tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    }));

    tracing::info!("Polymarket ingest ready");

    await_shutdown(shutdown_token).await;

    let joined = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Task panicked during shutdown");
            }
        }
    })
    .await;
    if joined.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Shutdown timed out, abandoning remaining tasks"
        );
    }

    tracing::info!("Polymarket ingest stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &IngestConfig) {
    tracing::info!(
        wss_url = %config.feed.wss_url,
        authenticated = config.credentials.is_some(),
        watchlist = %config.storage.watchlist_path.display(),
        book_store = %config
            .storage
            .book_store_path
            .as_ref()
            .map_or_else(|| "memory".to_string(), |p| p.display().to_string()),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        check_interval_secs = config.schedule.market_check_interval.as_secs(),
        keepalive_interval_secs = config.feed.keepalive_interval.as_secs(),
        keepalive_timeout_secs = config.feed.keepalive_timeout.as_secs(),
        max_reconnect_attempts = config.feed.max_reconnect_attempts,
        retention_days = config.schedule.retention_days,
        "Schedule"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
