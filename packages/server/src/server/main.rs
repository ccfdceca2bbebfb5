// Main entry point for the ingestion service

use anyhow::{Context, Result};
use server_core::kernel::{start_scheduler, ServerDeps};
use server_core::{Config, QueueMode};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,outlived=debug,server_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting outlived ingestion service");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        queue = ?config.queue,
        persistent = config.database_url.is_some(),
        "Configuration loaded"
    );
    if config.database_url.is_none() {
        tracing::warn!("DATABASE_URL not set, figures and tasks are kept in memory");
    }

    let deps = ServerDeps::build(&config)
        .await
        .context("Failed to build pipeline")?;

    let shutdown = CancellationToken::new();
    let handles = deps.spawn_queue(shutdown.clone());
    tracing::info!(
        workers = if config.queue == QueueMode::Managed { deps.workers } else { 1 },
        "Queue workers started"
    );

    if config.scan_on_start {
        server_core::kernel::scheduled_tasks::run_scan(&deps.orchestrator).await;
    }

    let mut scheduler = start_scheduler(
        deps.orchestrator.clone(),
        &config.scan_cron,
        &config.expire_cron,
    )
    .await
    .context("Failed to start scheduler")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received, draining workers");

    shutdown.cancel();
    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!(error = %e, "Scheduler did not shut down cleanly");
    }
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Worker task panicked");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
