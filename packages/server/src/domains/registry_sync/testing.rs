//! Test doubles for the registry sync pipeline.
//!
//! In-memory store implementations and a canned registry source, used by the
//! unit tests in this module tree.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::Semaphore;
use uuid::Uuid;

use deces_client::{
    DecesError, LifeEvent, Location, OneOrMany, PersonName, PersonRecord, SyncPeriod,
};

use super::models::sync_job::{NewSyncJob, SyncJob, SyncJobStatus};
use super::source::{RecordBatches, RegistrySource};
use super::store::SyncJobStore;
use crate::domains::memorials::{Memorial, MemorialStore, NewMemorial, Provenance};

/// In-memory memorial store.
#[derive(Default)]
pub struct InMemoryMemorialStore {
    records: Mutex<Vec<Memorial>>,
    /// Dedup key whose creation should fail, for error-path tests.
    pub fail_on_dedup_key: Mutex<Option<String>>,
}

impl InMemoryMemorialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Memorial> {
        self.records.lock().unwrap().clone()
    }

    /// Seed a record directly, bypassing the mapper.
    pub fn insert(&self, memorial: Memorial) {
        self.records.lock().unwrap().push(memorial);
    }
}

#[async_trait]
impl MemorialStore for InMemoryMemorialStore {
    async fn find_by_dedup_key(&self, key: &str) -> Result<Option<Memorial>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.insee_num_acte.as_deref() == Some(key))
            .cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Memorial>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.slug == slug)
            .cloned())
    }

    async fn create(&self, new: NewMemorial) -> Result<Memorial> {
        let fail_key = self.fail_on_dedup_key.lock().unwrap().clone();
        if fail_key.is_some() && fail_key.as_deref() == new.insee_num_acte.as_deref() {
            return Err(anyhow!("simulated write failure"));
        }

        let now = Utc::now();
        let memorial = Memorial {
            id: Uuid::new_v4(),
            slug: new.slug,
            first_name: new.first_name,
            last_name: new.last_name,
            birth_date: new.birth_date,
            death_date: new.death_date,
            sex: new.sex,
            birth_place_code: new.birth_place_code,
            birth_place_label: new.birth_place_label,
            death_place_code: new.death_place_code,
            death_place_label: new.death_place_label,
            latitude: new.latitude,
            longitude: new.longitude,
            provenance: new.provenance,
            insee_num_acte: new.insee_num_acte,
            created_at: now,
            updated_at: now,
        };
        self.records.lock().unwrap().push(memorial.clone());
        Ok(memorial)
    }

    async fn count_by_provenance(&self, provenance: Provenance) -> Result<i64> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.provenance == provenance)
            .count() as i64)
    }
}

/// In-memory sync job store.
#[derive(Default)]
pub struct InMemorySyncJobStore {
    jobs: Mutex<Vec<SyncJob>>,
}

impl InMemorySyncJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: Uuid) -> Option<SyncJob> {
        self.jobs.lock().unwrap().iter().find(|j| j.id == id).cloned()
    }

    /// Seed a job row directly, e.g. an orphaned `Running` job.
    pub fn insert(&self, job: SyncJob) {
        self.jobs.lock().unwrap().push(job);
    }

    fn with_job(&self, id: Uuid, f: impl FnOnce(&mut SyncJob)) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.iter_mut().find(|j| j.id == id) {
            Some(job) => {
                f(job);
                Ok(())
            }
            None => Err(anyhow!("no sync job {}", id)),
        }
    }
}

#[async_trait]
impl SyncJobStore for InMemorySyncJobStore {
    async fn create(&self, new: NewSyncJob) -> Result<SyncJob> {
        let job = SyncJob {
            id: Uuid::new_v4(),
            source_label: new.source_label,
            period: new.period,
            record_count: 0,
            processed_count: 0,
            new_profiles: 0,
            status: SyncJobStatus::Running,
            error_message: None,
            started_at: Utc::now(),
            completed_at: None,
        };
        self.jobs.lock().unwrap().push(job.clone());
        Ok(job)
    }

    async fn set_record_count(&self, id: Uuid, record_count: i64) -> Result<()> {
        self.with_job(id, |j| j.record_count = record_count)
    }

    async fn update_progress(
        &self,
        id: Uuid,
        processed_count: i64,
        new_profiles: i64,
    ) -> Result<()> {
        self.with_job(id, |j| {
            j.processed_count = processed_count;
            j.new_profiles = new_profiles;
        })
    }

    async fn finalize(
        &self,
        id: Uuid,
        status: SyncJobStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        self.with_job(id, |j| {
            j.status = status;
            j.error_message = error_message.map(str::to_string);
            j.completed_at = Some(Utc::now());
        })
    }

    async fn find_by_status(&self, status: SyncJobStatus) -> Result<Vec<SyncJob>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.status == status)
            .cloned()
            .collect())
    }

    async fn find_recent(&self, limit: i64) -> Result<Vec<SyncJob>> {
        let mut jobs = self.jobs.lock().unwrap().clone();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        jobs.truncate(limit as usize);
        Ok(jobs)
    }
}

/// Canned registry source yielding predefined batches.
pub struct FixtureRegistry {
    batches: Vec<Vec<PersonRecord>>,
    /// Error returned in place of the batch at this index, if set.
    pub fail_at_batch: Option<usize>,
    /// When set, `next_batch` consumes one permit per call, letting tests
    /// hold a run at a batch boundary.
    pub gate: Option<Arc<Semaphore>>,
    /// Number of `next_batch` calls across all traversals.
    pub calls: Arc<AtomicUsize>,
}

impl FixtureRegistry {
    pub fn new(batches: Vec<Vec<PersonRecord>>) -> Self {
        Self {
            batches,
            fail_at_batch: None,
            gate: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl RegistrySource for FixtureRegistry {
    async fn open_period(
        &self,
        _period: &SyncPeriod,
    ) -> Result<Box<dyn RecordBatches>, DecesError> {
        Ok(Box::new(FixtureBatches {
            total: self.batches.iter().map(Vec::len).sum::<usize>() as u64,
            remaining: self.batches.clone().into(),
            index: 0,
            fail_at_batch: self.fail_at_batch,
            gate: self.gate.clone(),
            calls: Arc::clone(&self.calls),
        }))
    }
}

pub struct FixtureBatches {
    total: u64,
    remaining: VecDeque<Vec<PersonRecord>>,
    index: usize,
    fail_at_batch: Option<usize>,
    gate: Option<Arc<Semaphore>>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl RecordBatches for FixtureBatches {
    fn total(&self) -> u64 {
        self.total
    }

    async fn next_batch(&mut self) -> Result<Option<Vec<PersonRecord>>, DecesError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.map_err(|_| DecesError::Api {
                status: 0,
                body: "gate closed".to_string(),
            })?;
            permit.forget();
        }
        if self.fail_at_batch == Some(self.index) {
            return Err(DecesError::Api {
                status: 500,
                body: "registry unavailable".to_string(),
            });
        }
        self.index += 1;
        Ok(self.remaining.pop_front())
    }
}

/// Build a registry person record fixture.
pub fn person(id: &str, first: &str, last: &str, death_date: &str) -> PersonRecord {
    PersonRecord {
        id: id.to_string(),
        score: Some(1.0),
        name: PersonName {
            first: Some(OneOrMany::Many(vec![first.to_string()])),
            last: Some(last.to_string()),
        },
        sex: Some("M".to_string()),
        birth: Some(LifeEvent {
            date: Some("19450101".to_string()),
            certificate_id: None,
            location: Some(Location {
                city: Some(OneOrMany::One("Lyon".to_string())),
                code: Some("69123".to_string()),
                country: Some("France".to_string()),
                latitude: None,
                longitude: None,
            }),
        }),
        death: Some(LifeEvent {
            date: Some(death_date.to_string()),
            certificate_id: Some(format!("{}-acte", id)),
            location: Some(Location {
                city: Some(OneOrMany::One("Paris".to_string())),
                code: Some("75056".to_string()),
                country: Some("France".to_string()),
                latitude: Some(48.86),
                longitude: Some(2.35),
            }),
        }),
    }
}

/// Build a stored memorial fixture with the given slug and dedup key.
pub fn memorial_fixture(slug: &str, insee_num_acte: Option<&str>) -> Memorial {
    let now = Utc::now();
    Memorial {
        id: Uuid::new_v4(),
        slug: slug.to_string(),
        first_name: "Jean".to_string(),
        last_name: "Dupont".to_string(),
        birth_date: None,
        death_date: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
        sex: None,
        birth_place_code: None,
        birth_place_label: None,
        death_place_code: None,
        death_place_label: None,
        latitude: None,
        longitude: None,
        provenance: Provenance::Registry,
        insee_num_acte: insee_num_acte.map(str::to_string),
        created_at: now,
        updated_at: now,
    }
}
