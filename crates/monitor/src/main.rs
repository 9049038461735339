//! Energy Monitor - solar inverter telemetry monitor
//!
//! This binary binds the ingestion pipeline to Postgres and the
//! HTTP/WebSocket surface, and runs the baseline refresh loop.

use anyhow::{Context, Result};
use energy_monitor::{api, config};
use monitor_lib::{
    alert::Notifier,
    baseline::{BaselineStore, RefreshLoop},
    health::{components, HealthRegistry},
    ingest::Ingestor,
    observability::StructuredLogger,
    store::{schema, PgReadingStore, ReadingStore},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting energy-monitor");

    // Load configuration
    let config = config::MonitorConfig::load()?;
    info!(api_port = config.api_port, "Monitor configured");

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::STORE).await;
    health_registry.register(components::BASELINE_REFRESH).await;
    health_registry.register(components::NOTIFIER).await;
    health_registry.register(components::API).await;

    // Initialize structured logger
    let logger = StructuredLogger::new("energy-monitor");
    logger.log_startup(MONITOR_VERSION);

    // Connect to the store; an unreachable store is fatal at startup.
    let pool = PgPoolOptions::new()
        .max_connections(config.db_pool_size)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to Postgres")?;
    schema::create_schema(&pool)
        .await
        .context("Failed to apply database schema")?;
    let store: Arc<dyn ReadingStore> = Arc::new(PgReadingStore::new(pool));
    health_registry.set_healthy(components::STORE).await;

    // Wire the pipeline
    let baselines = Arc::new(BaselineStore::new());
    let notifier = Notifier::new(config.notifier_capacity);
    let ingestor = Arc::new(Ingestor::new(
        Arc::clone(&store),
        Arc::clone(&baselines),
        notifier.clone(),
        config.classifier_config(),
        config.tracker_config(),
    ));

    // Shutdown channel shared by background tasks
    let (shutdown_tx, _) = broadcast::channel(1);

    // Start the baseline refresh loop; its first cycle runs immediately
    // so classification does not start blind.
    let refresh = RefreshLoop::new(
        Arc::clone(&store),
        Arc::clone(&baselines),
        health_registry.clone(),
        config.refresh_config(),
    );
    let refresh_handle = tokio::spawn(refresh.run(shutdown_tx.subscribe()));

    // Create shared application state
    let app_state = Arc::new(api::AppState::new(
        Arc::clone(&store),
        ingestor,
        notifier,
        health_registry.clone(),
    ));

    // Mark monitor as ready after initialization
    health_registry.set_ready(true).await;

    // Start the API server
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    let _ = shutdown_tx.send(());
    let _ = refresh_handle.await;
    api_handle.abort();

    Ok(())
}
