use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Body of a `POST /search` request.
#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    pub page: u32,
    pub size: u32,
    pub sort: String,
    pub fuzzy: bool,
    #[serde(rename = "deathDate", skip_serializing_if = "Option::is_none")]
    pub death_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scroll: Option<String>,
    #[serde(rename = "scrollId", skip_serializing_if = "Option::is_none")]
    pub scroll_id: Option<String>,
}

/// Envelope around every search response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope {
    #[serde(default)]
    pub request: serde_json::Value,
    pub response: SearchResponse,
}

/// One page of search results.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub total: u64,
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub persons: Vec<PersonRecord>,
    #[serde(default)]
    pub scroll_id: Option<String>,
}

/// A single civil-registry entry as returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct PersonRecord {
    pub id: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub name: PersonName,
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub birth: Option<LifeEvent>,
    #[serde(default)]
    pub death: Option<LifeEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersonName {
    #[serde(default)]
    pub first: Option<OneOrMany<String>>,
    #[serde(default)]
    pub last: Option<String>,
}

/// Birth or death sub-record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifeEvent {
    /// 8-digit `YYYYMMDD` calendar string.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub certificate_id: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Place name; the API serves either a string or an array of historical
    /// name variants.
    #[serde(default)]
    pub city: Option<OneOrMany<String>>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// A field the API serves either as a scalar or as an array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// First value, if any. Arrays of historical variants list the current
    /// form first.
    pub fn first(&self) -> Option<&T> {
        match self {
            OneOrMany::One(value) => Some(value),
            OneOrMany::Many(values) => values.first(),
        }
    }
}

/// Parse an 8-digit `YYYYMMDD` calendar string.
///
/// Wrong length, non-digit input, and impossible calendar dates all yield
/// `None`: an unparseable date is a skip condition for callers, never an
/// error.
pub fn parse_date8(raw: &str) -> Option<NaiveDate> {
    if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y%m%d").ok()
}

/// Target window of a sync run: a calendar month or a full year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPeriod {
    Month { year: i32, month: u32 },
    Year(i32),
}

impl SyncPeriod {
    /// Parse `"YYYY"` or `"YYYYMM"`.
    pub fn parse(raw: &str) -> Option<Self> {
        if !raw.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        match raw.len() {
            4 => raw.parse().ok().map(SyncPeriod::Year),
            6 => {
                let year = raw[..4].parse().ok()?;
                let month = raw[4..].parse().ok()?;
                if !(1..=12).contains(&month) {
                    return None;
                }
                Some(SyncPeriod::Month { year, month })
            }
            _ => None,
        }
    }

    /// Label used for job records, e.g. `"202512"` or `"2025"`.
    pub fn label(&self) -> String {
        match *self {
            SyncPeriod::Month { year, month } => format!("{}{:02}", year, month),
            SyncPeriod::Year(year) => year.to_string(),
        }
    }

    /// Render the `deathDate` filter the search endpoint expects: a bare
    /// year, or a `DD/MM/YYYY-DD/MM/YYYY` range spanning the month.
    pub fn death_date_filter(&self) -> String {
        match *self {
            SyncPeriod::Year(year) => year.to_string(),
            SyncPeriod::Month { year, month } => {
                let last_day = last_day_of_month(year, month);
                format!(
                    "01/{:02}/{}-{:02}/{:02}/{}",
                    month, year, last_day, month, year
                )
            }
        }
    }
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}
