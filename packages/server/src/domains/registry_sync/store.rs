//! Persistence contract for sync jobs.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::models::sync_job::{NewSyncJob, SyncJob, SyncJobStatus};

#[async_trait]
pub trait SyncJobStore: Send + Sync {
    /// Create a job row in `Running` state.
    async fn create(&self, new: NewSyncJob) -> Result<SyncJob>;

    /// Record the total match count once the registry reports it.
    async fn set_record_count(&self, id: Uuid, record_count: i64) -> Result<()>;

    /// Checkpoint progress counters after a batch.
    async fn update_progress(
        &self,
        id: Uuid,
        processed_count: i64,
        new_profiles: i64,
    ) -> Result<()>;

    /// Move a job to a terminal state and stamp `completed_at`. The caller
    /// guarantees this is invoked at most once per job.
    async fn finalize(
        &self,
        id: Uuid,
        status: SyncJobStatus,
        error_message: Option<&str>,
    ) -> Result<()>;

    async fn find_by_status(&self, status: SyncJobStatus) -> Result<Vec<SyncJob>>;

    /// Most recent jobs, newest first.
    async fn find_recent(&self, limit: i64) -> Result<Vec<SyncJob>>;
}

/// Postgres-backed implementation.
pub struct PgSyncJobStore {
    pool: PgPool,
}

impl PgSyncJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncJobStore for PgSyncJobStore {
    async fn create(&self, new: NewSyncJob) -> Result<SyncJob> {
        sqlx::query_as::<_, SyncJob>(
            r#"
            INSERT INTO sync_jobs (id, source_label, period, status)
            VALUES ($1, $2, $3, 'running')
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.source_label)
        .bind(&new.period)
        .fetch_one(&self.pool)
        .await
        .map_err(Into::into)
    }

    async fn set_record_count(&self, id: Uuid, record_count: i64) -> Result<()> {
        sqlx::query("UPDATE sync_jobs SET record_count = $2 WHERE id = $1")
            .bind(id)
            .bind(record_count)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_progress(
        &self,
        id: Uuid,
        processed_count: i64,
        new_profiles: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE sync_jobs SET processed_count = $2, new_profiles = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(processed_count)
        .bind(new_profiles)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn finalize(
        &self,
        id: Uuid,
        status: SyncJobStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sync_jobs
            SET status = $2, error_message = $3, completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_status(&self, status: SyncJobStatus) -> Result<Vec<SyncJob>> {
        sqlx::query_as::<_, SyncJob>("SELECT * FROM sync_jobs WHERE status = $1")
            .bind(status)
            .fetch_all(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn find_recent(&self, limit: i64) -> Result<Vec<SyncJob>> {
        sqlx::query_as::<_, SyncJob>(
            "SELECT * FROM sync_jobs ORDER BY started_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }
}
