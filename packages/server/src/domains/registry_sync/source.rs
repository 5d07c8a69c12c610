//! Pull-based abstraction over the registry client.
//!
//! Batch traversal is modeled as a `next() -> batch | end` cursor so the
//! orchestrator depends on neither the concrete client nor any particular
//! concurrency primitive.

use async_trait::async_trait;
use deces_client::{DecesClient, DecesError, PeriodScroll, PersonRecord, SyncPeriod};

/// A lazy, finite sequence of record batches for one traversal.
#[async_trait]
pub trait RecordBatches: Send {
    /// Total match count the registry reported for the period.
    fn total(&self) -> u64;

    /// Next batch, or `None` once the sequence is exhausted.
    async fn next_batch(&mut self) -> Result<Option<Vec<PersonRecord>>, DecesError>;
}

/// Anything that can open a batch traversal for a period.
#[async_trait]
pub trait RegistrySource: Send + Sync {
    async fn open_period(
        &self,
        period: &SyncPeriod,
    ) -> Result<Box<dyn RecordBatches>, DecesError>;
}

#[async_trait]
impl RecordBatches for PeriodScroll {
    fn total(&self) -> u64 {
        PeriodScroll::total(self)
    }

    async fn next_batch(&mut self) -> Result<Option<Vec<PersonRecord>>, DecesError> {
        PeriodScroll::next_batch(self).await
    }
}

#[async_trait]
impl RegistrySource for DecesClient {
    async fn open_period(
        &self,
        period: &SyncPeriod,
    ) -> Result<Box<dyn RecordBatches>, DecesError> {
        Ok(Box::new(self.fetch_for_period(period).await?))
    }
}
