//! Sync orchestrator.
//!
//! Drives the "pull batch → map each record → checkpoint progress" loop and
//! owns the job lifecycle: the single-flight guard, cooperative stop,
//! terminal-state finalization, and startup crash recovery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Result;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use deces_client::{DecesError, SyncPeriod};

use super::mapper::{MapOutcome, RecordMapper};
use super::models::sync_job::{NewSyncJob, SyncJob, SyncJobStatus};
use super::source::RegistrySource;
use super::store::SyncJobStore;
use crate::domains::memorials::{MemorialStore, Provenance};

/// How many job rows `sync_status` returns.
const RECENT_JOBS_LIMIT: i64 = 10;

/// Terminal message for runs halted by a stop request.
const STOP_MESSAGE: &str = "Sync stopped by operator request";

/// Terminal message for jobs orphaned by a dead process instance.
const RESTART_MESSAGE: &str = "Interrupted by process restart";

/// Errors surfaced by sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("a registry sync is already in progress")]
    AlreadyRunning,

    #[error("invalid sync period: {0}")]
    InvalidPeriod(String),

    #[error("registry API error: {0}")]
    Registry(#[from] DecesError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Summary returned to the caller once a run reaches a terminal state
/// without a fatal error.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub job_id: Uuid,
    pub records_processed: u64,
    pub new_profiles: u64,
    pub skipped_duplicates: u64,
    pub errors: u64,
    pub duration_ms: u64,
}

/// Answer to a stop request.
#[derive(Debug, Clone, Serialize)]
pub struct StopOutcome {
    pub stopped: bool,
    pub job_id: Option<Uuid>,
}

/// Snapshot for observers.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub is_syncing: bool,
    pub total_imported: i64,
    pub recent_jobs: Vec<SyncJob>,
}

pub struct SyncOrchestrator {
    registry: Arc<dyn RegistrySource>,
    memorials: Arc<dyn MemorialStore>,
    jobs: Arc<dyn SyncJobStore>,
    mapper: RecordMapper,
    /// Claimed with compare-and-swap; exactly one run may hold it.
    sync_active: AtomicBool,
    /// Cooperative stop flag, observed at batch boundaries only.
    stop_requested: AtomicBool,
    current_job: Mutex<Option<Uuid>>,
}

impl SyncOrchestrator {
    /// Build the orchestrator, first forcing any `Running` job left behind
    /// by a dead process instance to `Failed`. No sync can be accepted
    /// before this recovery has completed.
    pub async fn start(
        registry: Arc<dyn RegistrySource>,
        memorials: Arc<dyn MemorialStore>,
        jobs: Arc<dyn SyncJobStore>,
    ) -> Result<Self> {
        let orphaned = jobs.find_by_status(SyncJobStatus::Running).await?;
        for job in &orphaned {
            warn!(
                job_id = %job.id,
                period = %job.period,
                "Marking orphaned sync job as failed after restart"
            );
            jobs.finalize(job.id, SyncJobStatus::Failed, Some(RESTART_MESSAGE))
                .await?;
        }
        if !orphaned.is_empty() {
            info!(count = orphaned.len(), "Recovered orphaned sync jobs");
        }

        Ok(Self {
            registry,
            mapper: RecordMapper::new(Arc::clone(&memorials)),
            memorials,
            jobs,
            sync_active: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            current_job: Mutex::new(None),
        })
    }

    /// Import all records whose death date falls in the given calendar month
    /// (`"YYYYMM"`).
    pub async fn sync_month(&self, period: &str) -> Result<SyncResult, SyncError> {
        match SyncPeriod::parse(period) {
            Some(p @ SyncPeriod::Month { .. }) => self.sync_period(&p).await,
            _ => Err(SyncError::InvalidPeriod(period.to_string())),
        }
    }

    /// Import all records whose death date falls in the given year
    /// (`"YYYY"`).
    pub async fn sync_year(&self, period: &str) -> Result<SyncResult, SyncError> {
        match SyncPeriod::parse(period) {
            Some(p @ SyncPeriod::Year(_)) => self.sync_period(&p).await,
            _ => Err(SyncError::InvalidPeriod(period.to_string())),
        }
    }

    /// Run one sync for the period. Exactly one sync may run at a time; a
    /// second request fails immediately with `AlreadyRunning`; no queuing.
    pub async fn sync_period(&self, period: &SyncPeriod) -> Result<SyncResult, SyncError> {
        let _claim = self.claim()?;

        let started = Instant::now();
        let job = self
            .jobs
            .create(NewSyncJob {
                source_label: format!("deces-{}", period.label()),
                period: period.label(),
            })
            .await
            .map_err(SyncError::Internal)?;
        {
            let mut current = self.current_job.lock().unwrap();
            *current = Some(job.id);
        }
        info!(job_id = %job.id, period = %period.label(), "Starting registry sync");

        match self.run_job(&job, period).await {
            Ok(tally) => {
                let (status, message) = if tally.stopped {
                    (SyncJobStatus::Cancelled, Some(STOP_MESSAGE))
                } else {
                    (SyncJobStatus::Completed, None)
                };
                self.jobs
                    .finalize(job.id, status, message)
                    .await
                    .map_err(SyncError::Internal)?;

                info!(
                    job_id = %job.id,
                    records_processed = tally.processed,
                    new_profiles = tally.created,
                    skipped_duplicates = tally.duplicates,
                    errors = tally.errors,
                    cancelled = tally.stopped,
                    "Registry sync finished"
                );

                Ok(SyncResult {
                    job_id: job.id,
                    records_processed: tally.processed,
                    new_profiles: tally.created,
                    skipped_duplicates: tally.duplicates,
                    errors: tally.errors,
                    duration_ms: started.elapsed().as_millis() as u64,
                })
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Registry sync failed");
                if let Err(finalize_err) = self
                    .jobs
                    .finalize(job.id, SyncJobStatus::Failed, Some(&e.to_string()))
                    .await
                {
                    error!(
                        job_id = %job.id,
                        error = %finalize_err,
                        "Failed to record sync failure"
                    );
                }
                Err(e)
            }
        }
        // `_claim` drops here, releasing the guard on every exit path.
    }

    /// Request cancellation of the active run. Returns immediately; the flag
    /// is observed at the next batch boundary, so the batch in flight is
    /// still processed.
    pub fn stop_sync(&self) -> StopOutcome {
        if !self.sync_active.load(Ordering::SeqCst) {
            return StopOutcome {
                stopped: false,
                job_id: None,
            };
        }

        self.stop_requested.store(true, Ordering::SeqCst);
        let job_id = *self.current_job.lock().unwrap();
        info!(job_id = ?job_id, "Sync stop requested");
        StopOutcome {
            stopped: true,
            job_id,
        }
    }

    /// Current activity, lifetime import count, and the most recent job rows.
    pub async fn sync_status(&self) -> Result<SyncStatus> {
        let total_imported = self
            .memorials
            .count_by_provenance(Provenance::Registry)
            .await?;
        let recent_jobs = self.jobs.find_recent(RECENT_JOBS_LIMIT).await?;

        Ok(SyncStatus {
            is_syncing: self.sync_active.load(Ordering::SeqCst),
            total_imported,
            recent_jobs,
        })
    }

    /// Claim the single-flight guard; released when the returned token
    /// drops.
    fn claim(&self) -> Result<RunClaim<'_>, SyncError> {
        if self
            .sync_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::AlreadyRunning);
        }
        self.stop_requested.store(false, Ordering::SeqCst);
        Ok(RunClaim { orchestrator: self })
    }

    /// Inner batch loop. Remote and persistence errors abort the run and
    /// bubble to the caller; per-record mapping errors are counted and the
    /// loop continues.
    async fn run_job(&self, job: &SyncJob, period: &SyncPeriod) -> Result<RunTally, SyncError> {
        let mut batches = self.registry.open_period(period).await?;
        self.jobs
            .set_record_count(job.id, batches.total() as i64)
            .await
            .map_err(SyncError::Internal)?;

        let mut tally = RunTally::default();

        loop {
            if self.stop_requested.load(Ordering::SeqCst) {
                info!(job_id = %job.id, "Stop requested, halting sync at batch boundary");
                tally.stopped = true;
                break;
            }

            let batch = match batches.next_batch().await? {
                Some(batch) => batch,
                None => break,
            };

            for person in &batch {
                match self.mapper.map_record(person).await {
                    Ok(MapOutcome::Created(_)) => {
                        tally.processed += 1;
                        tally.created += 1;
                    }
                    Ok(MapOutcome::Duplicate) => {
                        tally.processed += 1;
                        tally.duplicates += 1;
                    }
                    Ok(MapOutcome::MissingDeathDate) => {
                        // Deliberate skip: neither processed nor an error.
                    }
                    Err(e) => {
                        tally.errors += 1;
                        warn!(
                            job_id = %job.id,
                            record_id = %person.id,
                            error = %e,
                            "Failed to import record"
                        );
                    }
                }
            }

            // Checkpoint so progress is visible mid-run and survives a crash.
            self.jobs
                .update_progress(job.id, tally.processed as i64, tally.created as i64)
                .await
                .map_err(SyncError::Internal)?;
        }

        Ok(tally)
    }
}

#[derive(Debug, Default)]
struct RunTally {
    processed: u64,
    created: u64,
    duplicates: u64,
    errors: u64,
    stopped: bool,
}

/// Token for the single-flight guard. Dropping it clears the current job,
/// the stop flag, and the active flag, so the guard is released even when
/// the run exits through an error path.
struct RunClaim<'a> {
    orchestrator: &'a SyncOrchestrator,
}

impl Drop for RunClaim<'_> {
    fn drop(&mut self) {
        *self.orchestrator.current_job.lock().unwrap() = None;
        self.orchestrator
            .stop_requested
            .store(false, Ordering::SeqCst);
        self.orchestrator.sync_active.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::registry_sync::testing::{
        memorial_fixture, person, FixtureRegistry, InMemoryMemorialStore, InMemorySyncJobStore,
    };
    use deces_client::PersonRecord;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    fn records(prefix: &str, count: usize) -> Vec<PersonRecord> {
        (0..count)
            .map(|i| {
                person(
                    &format!("{}{}", prefix, i),
                    "Jean",
                    &format!("Dupont{}", i),
                    "20251201",
                )
            })
            .collect()
    }

    async fn orchestrator_with(
        registry: FixtureRegistry,
        memorials: Arc<InMemoryMemorialStore>,
        jobs: Arc<InMemorySyncJobStore>,
    ) -> SyncOrchestrator {
        SyncOrchestrator::start(Arc::new(registry), memorials, jobs)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn completed_run_counts_created_duplicates_and_skips() {
        // 45 records over 3 pages: one with an invalid death date, two
        // already stored.
        let mut batch1 = records("a", 20);
        batch1[10] = person("a10", "Jean", "Dupont10", "20251301");
        let batch2 = records("b", 20);
        let batch3 = records("c", 5);

        let memorials = Arc::new(InMemoryMemorialStore::new());
        memorials.insert(memorial_fixture("seed-a", Some("75056-20251201-b0-acte")));
        memorials.insert(memorial_fixture("seed-b", Some("75056-20251201-b1-acte")));

        let jobs = Arc::new(InMemorySyncJobStore::new());
        let orch = orchestrator_with(
            FixtureRegistry::new(vec![batch1, batch2, batch3]),
            memorials.clone(),
            jobs.clone(),
        )
        .await;

        let result = orch.sync_month("202512").await.unwrap();
        assert_eq!(result.records_processed, 44);
        assert_eq!(result.new_profiles, 42);
        assert_eq!(result.skipped_duplicates, 2);
        assert_eq!(result.errors, 0);

        let job = jobs.get(result.job_id).unwrap();
        assert_eq!(job.status, SyncJobStatus::Completed);
        assert_eq!(job.record_count, 45);
        assert_eq!(job.processed_count, 44);
        assert_eq!(job.new_profiles, 42);
        assert!(job.error_message.is_none());
        assert!(job.completed_at.is_some());

        // 2 seeds + 42 created.
        assert_eq!(memorials.all().len(), 44);
    }

    #[tokio::test]
    async fn second_run_over_same_period_creates_nothing() {
        let batches = vec![records("a", 5), records("b", 5)];
        let memorials = Arc::new(InMemoryMemorialStore::new());
        let jobs = Arc::new(InMemorySyncJobStore::new());
        let orch = orchestrator_with(
            FixtureRegistry::new(batches),
            memorials.clone(),
            jobs.clone(),
        )
        .await;

        let first = orch.sync_month("202512").await.unwrap();
        assert_eq!(first.new_profiles, 10);
        assert_eq!(first.skipped_duplicates, 0);

        let second = orch.sync_month("202512").await.unwrap();
        assert_eq!(second.records_processed, 10);
        assert_eq!(second.new_profiles, 0);
        assert_eq!(second.skipped_duplicates, 10);
        assert_eq!(memorials.all().len(), 10);
    }

    #[tokio::test]
    async fn rejects_period_with_wrong_granularity() {
        let orch = orchestrator_with(
            FixtureRegistry::new(vec![]),
            Arc::new(InMemoryMemorialStore::new()),
            Arc::new(InMemorySyncJobStore::new()),
        )
        .await;

        assert!(matches!(
            orch.sync_month("2025").await,
            Err(SyncError::InvalidPeriod(_))
        ));
        assert!(matches!(
            orch.sync_year("202512").await,
            Err(SyncError::InvalidPeriod(_))
        ));
        assert!(matches!(
            orch.sync_month("2025-12").await,
            Err(SyncError::InvalidPeriod(_))
        ));
    }

    #[tokio::test]
    async fn stop_request_cancels_at_the_next_batch_boundary() {
        let mut registry =
            FixtureRegistry::new(vec![records("a", 3), records("b", 2), records("c", 2)]);
        let gate = Arc::new(Semaphore::new(1));
        registry.gate = Some(gate.clone());
        let calls = Arc::clone(&registry.calls);

        let memorials = Arc::new(InMemoryMemorialStore::new());
        let jobs = Arc::new(InMemorySyncJobStore::new());
        let orch = Arc::new(orchestrator_with(registry, memorials.clone(), jobs.clone()).await);

        let handle = tokio::spawn({
            let orch = Arc::clone(&orch);
            async move { orch.sync_month("202512").await }
        });

        // Wait until the run is blocked fetching the second batch.
        while calls.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let stop = orch.stop_sync();
        assert!(stop.stopped);
        let job_id = stop.job_id.unwrap();

        // Let the in-flight fetch complete; its batch must still be
        // processed before the flag is observed.
        gate.add_permits(1);
        let result = handle.await.unwrap().unwrap();

        assert_eq!(result.job_id, job_id);
        assert_eq!(result.records_processed, 5);
        assert_eq!(result.new_profiles, 5);

        let job = jobs.get(job_id).unwrap();
        assert_eq!(job.status, SyncJobStatus::Cancelled);
        assert_eq!(job.processed_count, 5);
        assert_eq!(job.error_message.as_deref(), Some(STOP_MESSAGE));
        assert!(job.completed_at.is_some());

        // Records from processed batches stay persisted; the third batch was
        // never pulled.
        assert_eq!(memorials.all().len(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stop_with_no_active_run_reports_nothing_to_stop() {
        let orch = orchestrator_with(
            FixtureRegistry::new(vec![]),
            Arc::new(InMemoryMemorialStore::new()),
            Arc::new(InMemorySyncJobStore::new()),
        )
        .await;

        let stop = orch.stop_sync();
        assert!(!stop.stopped);
        assert!(stop.job_id.is_none());
    }

    #[tokio::test]
    async fn concurrent_start_is_rejected_without_queuing() {
        let mut registry = FixtureRegistry::new(vec![records("a", 2), records("b", 2)]);
        let gate = Arc::new(Semaphore::new(0));
        registry.gate = Some(gate.clone());
        let calls = Arc::clone(&registry.calls);

        let jobs = Arc::new(InMemorySyncJobStore::new());
        let orch = Arc::new(
            orchestrator_with(registry, Arc::new(InMemoryMemorialStore::new()), jobs.clone())
                .await,
        );

        let handle = tokio::spawn({
            let orch = Arc::clone(&orch);
            async move { orch.sync_month("202512").await }
        });

        while calls.load(Ordering::SeqCst) < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(matches!(
            orch.sync_month("202512").await,
            Err(SyncError::AlreadyRunning)
        ));

        // Unblock the active run: two batches plus the end-of-sequence call.
        gate.add_permits(3);
        handle.await.unwrap().unwrap();

        // Guard released; a new sync is accepted.
        gate.add_permits(3);
        let result = orch.sync_month("202512").await.unwrap();
        assert_eq!(result.skipped_duplicates, 4);
    }

    #[tokio::test]
    async fn remote_failure_marks_job_failed_and_propagates() {
        let mut registry = FixtureRegistry::new(vec![records("a", 3), records("b", 3)]);
        registry.fail_at_batch = Some(1);

        let memorials = Arc::new(InMemoryMemorialStore::new());
        let jobs = Arc::new(InMemorySyncJobStore::new());
        let orch = orchestrator_with(registry, memorials.clone(), jobs.clone()).await;

        let err = orch.sync_month("202512").await.unwrap_err();
        assert!(matches!(err, SyncError::Registry(_)));

        let job = &jobs.find_by_status(SyncJobStatus::Failed).await.unwrap()[0];
        assert_eq!(job.processed_count, 3);
        assert!(job
            .error_message
            .as_deref()
            .unwrap()
            .contains("registry unavailable"));
        assert!(job.completed_at.is_some());

        // Already-processed batches are not rolled back.
        assert_eq!(memorials.all().len(), 3);

        // The guard was released: the next attempt reaches the registry
        // again instead of being rejected.
        assert!(matches!(
            orch.sync_month("202512").await.unwrap_err(),
            SyncError::Registry(_)
        ));
    }

    #[tokio::test]
    async fn per_record_store_failure_is_counted_not_fatal() {
        let memorials = Arc::new(InMemoryMemorialStore::new());
        *memorials.fail_on_dedup_key.lock().unwrap() =
            Some("75056-20251201-a1-acte".to_string());

        let jobs = Arc::new(InMemorySyncJobStore::new());
        let orch = orchestrator_with(
            FixtureRegistry::new(vec![records("a", 3)]),
            memorials.clone(),
            jobs.clone(),
        )
        .await;

        let result = orch.sync_month("202512").await.unwrap();
        assert_eq!(result.errors, 1);
        assert_eq!(result.records_processed, 2);
        assert_eq!(result.new_profiles, 2);

        let job = jobs.get(result.job_id).unwrap();
        assert_eq!(job.status, SyncJobStatus::Completed);
    }

    #[tokio::test]
    async fn startup_fails_jobs_orphaned_by_a_crash() {
        let jobs = Arc::new(InMemorySyncJobStore::new());
        let orphan = jobs
            .create(NewSyncJob {
                source_label: "deces-202511".to_string(),
                period: "202511".to_string(),
            })
            .await
            .unwrap();

        let _orch = orchestrator_with(
            FixtureRegistry::new(vec![]),
            Arc::new(InMemoryMemorialStore::new()),
            jobs.clone(),
        )
        .await;

        let recovered = jobs.get(orphan.id).unwrap();
        assert_eq!(recovered.status, SyncJobStatus::Failed);
        assert_eq!(recovered.error_message.as_deref(), Some(RESTART_MESSAGE));
        assert!(recovered.completed_at.is_some());
    }

    #[tokio::test]
    async fn status_reports_imports_and_recent_jobs() {
        let memorials = Arc::new(InMemoryMemorialStore::new());
        // Partner records never count toward registry imports.
        let mut partner = memorial_fixture("partner-1", None);
        partner.provenance = Provenance::Partner;
        memorials.insert(partner);

        let jobs = Arc::new(InMemorySyncJobStore::new());
        let orch = orchestrator_with(
            FixtureRegistry::new(vec![records("a", 4)]),
            memorials.clone(),
            jobs.clone(),
        )
        .await;

        let before = orch.sync_status().await.unwrap();
        assert!(!before.is_syncing);
        assert_eq!(before.total_imported, 0);
        assert!(before.recent_jobs.is_empty());

        orch.sync_month("202512").await.unwrap();

        let after = orch.sync_status().await.unwrap();
        assert!(!after.is_syncing);
        assert_eq!(after.total_imported, 4);
        assert_eq!(after.recent_jobs.len(), 1);
        assert_eq!(after.recent_jobs[0].status, SyncJobStatus::Completed);
    }

    #[tokio::test]
    async fn year_sync_uses_year_granularity() {
        let jobs = Arc::new(InMemorySyncJobStore::new());
        let orch = orchestrator_with(
            FixtureRegistry::new(vec![records("a", 2)]),
            Arc::new(InMemoryMemorialStore::new()),
            jobs.clone(),
        )
        .await;

        let result = orch.sync_year("2025").await.unwrap();
        let job = jobs.get(result.job_id).unwrap();
        assert_eq!(job.period, "2025");
        assert_eq!(job.source_label, "deces-2025");
    }
}
