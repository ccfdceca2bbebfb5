//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! - Daily scan: enqueue one task per calendar day (no-op while a scan drains)
//! - Daily expiry: delete figures a scan has not refreshed in 30 days
//!
//! # Architecture
//!
//! Scheduled tasks only kick work off. The scan job enqueues tasks; the
//! queue's workers do the fetching.
//!
//! ```text
//! Scheduler (daily)
//!     │
//!     ├─► start_scan() ─► 366 day tasks ─► queue workers
//!     └─► expire_stale(30)
//! ```

use std::sync::Arc;

use anyhow::Result;
use outlived::{ScanOutcome, ScrapeOrchestrator};
use tokio_cron_scheduler::{Job, JobScheduler};

/// Start all scheduled tasks
pub async fn start_scheduler(
    orchestrator: Arc<ScrapeOrchestrator>,
    scan_cron: &str,
    expire_cron: &str,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let scan_orchestrator = orchestrator.clone();
    let scan_job = Job::new_async(scan_cron, move |_uuid, _lock| {
        let orchestrator = scan_orchestrator.clone();
        Box::pin(async move {
            run_scan(&orchestrator).await;
        })
    })?;

    scheduler.add(scan_job).await?;

    let expire_orchestrator = orchestrator.clone();
    let expire_job = Job::new_async(expire_cron, move |_uuid, _lock| {
        let orchestrator = expire_orchestrator.clone();
        Box::pin(async move {
            run_expiry(&orchestrator).await;
        })
    })?;

    scheduler.add(expire_job).await?;
    scheduler.start().await?;

    tracing::info!(scan_cron, expire_cron, "Scheduled tasks started");
    Ok(scheduler)
}

/// Start a scan unless one is already underway.
pub async fn run_scan(orchestrator: &ScrapeOrchestrator) {
    tracing::info!("Running scheduled scan");

    match orchestrator.start_scan().await {
        Ok(ScanOutcome::Started { enqueued, .. }) => {
            tracing::info!(enqueued, "Scan scheduled");
        }
        Ok(ScanOutcome::AlreadyRunning) => {
            tracing::info!("Previous scan still draining, skipped");
        }
        Err(e) => tracing::error!(error = %e, "Scheduled scan failed"),
    }
}

/// Delete figures that stopped being refreshed.
pub async fn run_expiry(orchestrator: &ScrapeOrchestrator) {
    tracing::info!("Running scheduled expiry");

    let threshold = orchestrator.config().stale_after_days;
    let summary = orchestrator.store().expire_stale(threshold).await;

    if summary.abandoned {
        tracing::warn!(deleted = summary.deleted, "Expiry pass abandoned early");
    }
}
