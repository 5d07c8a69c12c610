//! Pure client for the matchID civil-registry death records search API.
//!
//! A minimal client for the `deces` search endpoint. Supports one-shot
//! searches and scrolled batch traversal of all records in a calendar
//! period.
//!
//! # Example
//!
//! ```rust,ignore
//! use deces_client::{DecesClient, SyncPeriod};
//!
//! let client = DecesClient::new("https://deces.matchid.io/deces/api/v1".into())?;
//! let period = SyncPeriod::parse("202512").unwrap();
//!
//! let mut scroll = client.fetch_for_period(&period).await?;
//! while let Some(batch) = scroll.next_batch().await? {
//!     println!("{} records", batch.len());
//! }
//! ```

pub mod error;
pub mod types;

pub use error::{DecesError, Result};
pub use types::{
    parse_date8, LifeEvent, Location, OneOrMany, PersonName, PersonRecord, SearchRequest,
    SearchResponse, SyncPeriod,
};

use std::time::Duration;

use types::ApiEnvelope;

/// Hard cap the API places on page size.
pub const MAX_PAGE_SIZE: u32 = 20;

/// Scroll context lifetime requested from the API.
const SCROLL_TTL: &str = "1m";

/// Courtesy delay between successive scroll requests.
const SCROLL_DELAY: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct DecesClient {
    client: reqwest::Client,
    base_url: String,
}

impl DecesClient {
    pub fn new(base_url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, base_url })
    }

    /// Run one search request. Non-2xx responses become `DecesError::Api`
    /// with the status and body; the client never retries on its own.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let url = format!("{}/search", self.base_url);
        let resp = self.client.post(&url).json(request).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DecesError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: ApiEnvelope = resp.json().await?;
        Ok(envelope.response)
    }

    /// Open a scrolled traversal of every record whose death date falls in
    /// `period`. The initial search runs eagerly so the total match count is
    /// known up front; batches already yielded are never re-fetched within
    /// one traversal.
    pub async fn fetch_for_period(&self, period: &SyncPeriod) -> Result<PeriodScroll> {
        let first = self
            .search(&SearchRequest {
                page: 1,
                size: MAX_PAGE_SIZE,
                sort: "score".to_string(),
                fuzzy: false,
                death_date: Some(period.death_date_filter()),
                scroll: Some(SCROLL_TTL.to_string()),
                scroll_id: None,
            })
            .await?;

        tracing::info!(
            period = %period.label(),
            total = first.total,
            "Opened registry scroll"
        );

        Ok(PeriodScroll {
            client: self.clone(),
            total: first.total,
            fetched: 0,
            scroll_id: first.scroll_id.clone(),
            pending: Some(first.persons),
            done: false,
        })
    }
}

/// Lazy, pull-based sequence of record batches backed by the API's scroll
/// cursor. Not restartable: a fresh traversal re-issues the initial search.
pub struct PeriodScroll {
    client: DecesClient,
    total: u64,
    fetched: u64,
    scroll_id: Option<String>,
    pending: Option<Vec<PersonRecord>>,
    done: bool,
}

impl PeriodScroll {
    /// Total number of matches the API reported for the period.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Next batch of records, or `None` once the scroll is exhausted. The
    /// sequence ends when the total is reached, a batch comes back empty, or
    /// the API stops returning a continuation token.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<PersonRecord>>> {
        if let Some(first) = self.pending.take() {
            if first.is_empty() {
                self.done = true;
                return Ok(None);
            }
            self.fetched += first.len() as u64;
            return Ok(Some(first));
        }

        if self.done || self.fetched >= self.total {
            return Ok(None);
        }
        let scroll_id = match self.scroll_id.clone() {
            Some(id) => id,
            None => return Ok(None),
        };

        tokio::time::sleep(SCROLL_DELAY).await;

        let page = self
            .client
            .search(&SearchRequest {
                page: 1,
                size: MAX_PAGE_SIZE,
                sort: "score".to_string(),
                fuzzy: false,
                death_date: None,
                scroll: Some(SCROLL_TTL.to_string()),
                scroll_id: Some(scroll_id),
            })
            .await?;

        self.scroll_id = page.scroll_id;
        if page.persons.is_empty() {
            self.done = true;
            return Ok(None);
        }

        self.fetched += page.persons.len() as u64;
        tracing::debug!(
            fetched = self.fetched,
            total = self.total,
            "Fetched scroll batch"
        );
        Ok(Some(page.persons))
    }
}
