//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! The only periodic task is the weekly registry sync: every Monday the
//! previous calendar month is re-imported, picking up records the registry
//! published late. Deduplication makes the re-import idempotent.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Datelike, NaiveDate, Utc};
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::domains::registry_sync::{SyncError, SyncOrchestrator};

/// Mondays at 04:00 UTC.
const WEEKLY_SYNC_SCHEDULE: &str = "0 0 4 * * MON";

/// Start all scheduled tasks
pub async fn start_scheduler(orchestrator: Arc<SyncOrchestrator>) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let sync_job = Job::new_async(WEEKLY_SYNC_SCHEDULE, move |_uuid, _lock| {
        let orchestrator = Arc::clone(&orchestrator);
        Box::pin(async move {
            if let Err(e) = run_weekly_sync(&orchestrator).await {
                tracing::error!("Weekly registry sync failed: {}", e);
            }
        })
    })?;

    scheduler.add(sync_job).await?;
    scheduler.start().await?;

    tracing::info!("Scheduled tasks started (registry sync every Monday)");
    Ok(scheduler)
}

/// Sync the previous calendar month.
async fn run_weekly_sync(orchestrator: &SyncOrchestrator) -> Result<()> {
    let period = previous_month(Utc::now().date_naive());
    tracing::info!(period = %period, "Running weekly registry sync");

    match orchestrator.sync_month(&period).await {
        Ok(result) => {
            tracing::info!(
                job_id = %result.job_id,
                records_processed = result.records_processed,
                new_profiles = result.new_profiles,
                skipped_duplicates = result.skipped_duplicates,
                "Weekly registry sync complete"
            );
            Ok(())
        }
        Err(SyncError::AlreadyRunning) => {
            tracing::warn!("Skipping weekly sync: another sync is already running");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// `YYYYMM` label of the month before the given date.
fn previous_month(today: NaiveDate) -> String {
    let (year, month) = if today.month() == 1 {
        (today.year() - 1, 12)
    } else {
        (today.year(), today.month() - 1)
    };
    format!("{}{:02}", year, month)
}
