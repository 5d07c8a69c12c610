//! Persistence contract for memorial profiles.
//!
//! The sync pipeline only needs this narrow slice of the memorial CRUD
//! surface; everything else lives with the API layer.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::models::memorial::{Memorial, NewMemorial, Provenance};

#[async_trait]
pub trait MemorialStore: Send + Sync {
    /// Look up an imported record by its dedup key.
    async fn find_by_dedup_key(&self, key: &str) -> Result<Option<Memorial>>;

    /// Look up a record by slug, for collision checking.
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Memorial>>;

    async fn create(&self, new: NewMemorial) -> Result<Memorial>;

    /// Number of records with the given provenance.
    async fn count_by_provenance(&self, provenance: Provenance) -> Result<i64>;
}

/// Postgres-backed implementation.
pub struct PgMemorialStore {
    pool: PgPool,
}

impl PgMemorialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MemorialStore for PgMemorialStore {
    async fn find_by_dedup_key(&self, key: &str) -> Result<Option<Memorial>> {
        sqlx::query_as::<_, Memorial>("SELECT * FROM memorials WHERE insee_num_acte = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Memorial>> {
        sqlx::query_as::<_, Memorial>("SELECT * FROM memorials WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn create(&self, new: NewMemorial) -> Result<Memorial> {
        sqlx::query_as::<_, Memorial>(
            r#"
            INSERT INTO memorials (
                id, slug, first_name, last_name, birth_date, death_date, sex,
                birth_place_code, birth_place_label, death_place_code, death_place_label,
                latitude, longitude, provenance, insee_num_acte
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.slug)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(new.birth_date)
        .bind(new.death_date)
        .bind(&new.sex)
        .bind(&new.birth_place_code)
        .bind(&new.birth_place_label)
        .bind(&new.death_place_code)
        .bind(&new.death_place_label)
        .bind(new.latitude)
        .bind(new.longitude)
        .bind(new.provenance)
        .bind(&new.insee_num_acte)
        .fetch_one(&self.pool)
        .await
        .map_err(Into::into)
    }

    async fn count_by_provenance(&self, provenance: Provenance) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM memorials WHERE provenance = $1")
            .bind(provenance)
            .fetch_one(&self.pool)
            .await
            .map_err(Into::into)
    }
}
