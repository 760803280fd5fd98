use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imgqueue_core::queue::ConsumeSettings;
use imgqueue_core::{
    load_config, validate_config, Config, ConfigError, FsArtifactStore, ImageEngine,
    ImageJobHandler, ImageQueue, ImageService, JobConsumer, Reconciler, SqliteImageStore,
    SqliteQueue,
};
use imgqueue_server::api::create_router;
use imgqueue_server::state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("IMGQUEUE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(ConfigError::FileNotFound(path)) => {
            warn!("No configuration file at {}, using defaults", path);
            Config::default()
        }
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to load config from {:?}", config_path))
        }
    };

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);
    info!("Artifact root: {:?}", config.storage.base_dir);

    if let Some(parent) = config.database.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
    }

    // Create SQLite image store
    let images = Arc::new(
        SqliteImageStore::new(&config.database.path).context("Failed to create image store")?,
    );
    info!("Image store initialized");

    // Create durable queue (same database file, own connection)
    let queue = Arc::new(
        SqliteQueue::new(&config.database.path, config.queue.topic.clone())
            .context("Failed to open queue")?,
    );
    info!("Queue initialized (topic: {})", queue.topic());

    let artifacts = Arc::new(FsArtifactStore::new(&config.storage.base_dir));
    let engine = Arc::new(ImageEngine::new(artifacts.clone(), &config.transform));
    let producer = Arc::new(ImageQueue::new(queue.clone(), config.retry.policy()));

    let service = Arc::new(
        ImageService::new(images, artifacts, producer, engine).with_dead_letters(queue.clone()),
    );

    // Start the consume loop
    let consumer = JobConsumer::new(
        Arc::new(
            queue
                .consumer(config.queue.group_id.clone())
                .context("Failed to create queue consumer")?,
        ),
        Arc::new(ImageJobHandler::new(Arc::clone(&service))),
        config.retry.policy(),
        ConsumeSettings::from_config(&config.queue, &config.consumer),
    );
    consumer.start();
    info!("Job consumer started (group: {})", config.queue.group_id);

    // Start the reconciliation sweep if enabled
    let reconciler = if config.reconciler.enabled {
        let reconciler = Reconciler::new(Arc::clone(&service), &config.reconciler);
        reconciler.start();
        Some(reconciler)
    } else {
        info!("Reconciler disabled in config");
        None
    };

    // Create app state and router
    let state = Arc::new(AppState::new(config.clone(), service));
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let (drain_tx, mut drain_rx) = watch::channel(false);
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = drain_rx.changed().await;
            })
            .await
    });

    shutdown_signal().await;
    info!("Shutdown signal received");

    // Stop accepting connections; in-flight requests keep running.
    let grace = Duration::from_secs(config.server.shutdown_grace_secs);
    let deadline = tokio::time::Instant::now() + grace;
    let _ = drain_tx.send(true);

    if let Some(ref reconciler) = reconciler {
        reconciler.stop();
    }
    info!("Stopping job consumer...");
    consumer.stop().await;
    info!("Job consumer stopped");

    match tokio::time::timeout_at(deadline, server).await {
        Ok(Ok(Ok(()))) => info!("HTTP server drained"),
        Ok(Ok(Err(e))) => return Err(e).context("Server error"),
        Ok(Err(e)) => return Err(e).context("Server task failed"),
        Err(_) => warn!(
            "HTTP server did not drain within {}s, forcing shutdown",
            grace.as_secs()
        ),
    }

    info!("Server shut down");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
