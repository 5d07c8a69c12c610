//! Memorial profile model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// Where a memorial record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "memorial_provenance", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Entered by a partner organization.
    Partner,
    /// Imported from the civil-registry death records API.
    Registry,
    /// A partner record reconciled with a registry import.
    Merged,
}

/// A published memorial profile.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Memorial {
    pub id: Uuid,
    /// Globally unique across every provenance.
    pub slug: String,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    pub death_date: NaiveDate,
    pub sex: Option<String>,
    pub birth_place_code: Option<String>,
    pub birth_place_label: Option<String>,
    pub death_place_code: Option<String>,
    pub death_place_label: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub provenance: Provenance,
    /// Composite dedup key for registry imports; NULL for partner records.
    pub insee_num_acte: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a memorial.
#[derive(Debug, Clone, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct NewMemorial {
    pub slug: String,
    pub first_name: String,
    pub last_name: String,
    #[builder(default)]
    pub birth_date: Option<NaiveDate>,
    pub death_date: NaiveDate,
    #[builder(default)]
    pub sex: Option<String>,
    #[builder(default)]
    pub birth_place_code: Option<String>,
    #[builder(default)]
    pub birth_place_label: Option<String>,
    #[builder(default)]
    pub death_place_code: Option<String>,
    #[builder(default)]
    pub death_place_label: Option<String>,
    #[builder(default)]
    pub latitude: Option<f64>,
    #[builder(default)]
    pub longitude: Option<f64>,
    pub provenance: Provenance,
    #[builder(default)]
    pub insee_num_acte: Option<String>,
}
