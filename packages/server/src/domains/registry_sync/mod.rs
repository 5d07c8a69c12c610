//! Registry import pipeline.
//!
//! Pulls civil-registry death records from the remote search API and turns
//! them into deduplicated memorial profiles, tracking every run as an
//! auditable sync job.

pub mod mapper;
pub mod models;
pub mod orchestrator;
pub mod source;
pub mod store;
pub mod testing;

pub use mapper::{MapOutcome, RecordMapper};
pub use models::sync_job::{NewSyncJob, SyncJob, SyncJobStatus};
pub use orchestrator::{StopOutcome, SyncError, SyncOrchestrator, SyncResult, SyncStatus};
pub use source::{RecordBatches, RegistrySource};
pub use store::{PgSyncJobStore, SyncJobStore};
