//! SyncJob model
//!
//! Tracks each execution of the registry import pipeline (scheduled or
//! manual).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle state of a sync job. A job is created `Running` and moves to
/// exactly one terminal state, after which it is never mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "sync_job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SyncJobStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// One sync attempt, persisted for auditability.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: Uuid,
    /// Identifying label, e.g. `deces-202512`.
    pub source_label: String,
    /// Target period label (`YYYYMM` or `YYYY`).
    pub period: String,
    /// Total matches the registry reported for the period.
    pub record_count: i64,
    /// Records mapped so far (created + duplicates). Only ever increases.
    pub processed_count: i64,
    /// Records newly created so far. Only ever increases.
    pub new_profiles: i64,
    pub status: SyncJobStatus,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Input for creating a sync job row.
#[derive(Debug, Clone)]
pub struct NewSyncJob {
    pub source_label: String,
    pub period: String,
}
