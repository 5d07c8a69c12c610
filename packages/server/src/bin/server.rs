// Main entry point for the registry sync service

use std::sync::Arc;

use anyhow::{Context, Result};
use deces_client::DecesClient;
use memorial_core::domains::memorials::PgMemorialStore;
use memorial_core::domains::registry_sync::{PgSyncJobStore, SyncOrchestrator};
use memorial_core::kernel::scheduled_tasks::start_scheduler;
use memorial_core::Config;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,memorial_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting memorial registry sync service");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    // Wire the sync pipeline. `start` fails any job orphaned by a crash
    // before new syncs are accepted.
    let registry = DecesClient::new(config.deces_api_url.clone())
        .context("Failed to build registry client")?;
    let orchestrator = Arc::new(
        SyncOrchestrator::start(
            Arc::new(registry),
            Arc::new(PgMemorialStore::new(pool.clone())),
            Arc::new(PgSyncJobStore::new(pool)),
        )
        .await
        .context("Failed to start sync orchestrator")?,
    );

    let _scheduler = start_scheduler(Arc::clone(&orchestrator))
        .await
        .context("Failed to start scheduler")?;

    tracing::info!("Registry sync service ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutting down");

    Ok(())
}
