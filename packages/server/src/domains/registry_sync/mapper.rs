//! Maps one external registry record onto a memorial profile.

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use deces_client::{parse_date8, Location, PersonRecord};

use crate::common::utils::{short_hash, slugify};
use crate::domains::memorials::{Memorial, MemorialStore, NewMemorial, Provenance};

/// Placeholder for names the registry did not record.
const UNKNOWN_NAME: &str = "Inconnu";

/// Dedup-key fragment when the death location code is missing.
const UNKNOWN_LOCATION: &str = "unknown";

/// Outcome of mapping a single record.
#[derive(Debug)]
pub enum MapOutcome {
    /// A new memorial was created.
    Created(Memorial),
    /// A memorial with the same dedup key already exists; nothing written.
    Duplicate,
    /// The record has no usable death date and was dropped.
    MissingDeathDate,
}

pub struct RecordMapper {
    memorials: Arc<dyn MemorialStore>,
}

impl RecordMapper {
    pub fn new(memorials: Arc<dyn MemorialStore>) -> Self {
        Self { memorials }
    }

    /// Map one external record: compute its dedup key, skip duplicates and
    /// records without a usable death date, otherwise create the memorial.
    pub async fn map_record(&self, person: &PersonRecord) -> Result<MapOutcome> {
        let death = match person.death.as_ref() {
            Some(death) => death,
            None => {
                debug!(record_id = %person.id, "Record has no death event, skipping");
                return Ok(MapOutcome::MissingDeathDate);
            }
        };
        let death_date_raw = match death.date.as_deref() {
            Some(raw) => raw,
            None => {
                debug!(record_id = %person.id, "Record has no death date, skipping");
                return Ok(MapOutcome::MissingDeathDate);
            }
        };
        let death_date = match parse_date8(death_date_raw) {
            Some(date) => date,
            None => {
                debug!(
                    record_id = %person.id,
                    raw = death_date_raw,
                    "Unparseable death date, skipping record"
                );
                return Ok(MapOutcome::MissingDeathDate);
            }
        };

        let key = dedup_key(person, death_date_raw);
        if self.memorials.find_by_dedup_key(&key).await?.is_some() {
            return Ok(MapOutcome::Duplicate);
        }

        // Registry data has gaps; a missing name is not a reason to drop the
        // record.
        let first_name = person
            .name
            .first
            .as_ref()
            .and_then(|f| f.first())
            .cloned()
            .unwrap_or_else(|| UNKNOWN_NAME.to_string());
        let last_name = person
            .name
            .last
            .clone()
            .unwrap_or_else(|| UNKNOWN_NAME.to_string());

        let slug = self
            .unique_slug(&first_name, &last_name, death_date_raw)
            .await?;

        let birth = person.birth.as_ref();
        let birth_date = birth.and_then(|b| b.date.as_deref()).and_then(parse_date8);
        let birth_location = birth.and_then(|b| b.location.as_ref());
        let death_location = death.location.as_ref();

        let new = NewMemorial::builder()
            .slug(slug)
            .first_name(first_name)
            .last_name(last_name)
            .birth_date(birth_date)
            .death_date(death_date)
            .sex(person.sex.clone())
            .birth_place_code(birth_location.and_then(|l| l.code.clone()))
            .birth_place_label(place_label(birth_location))
            .death_place_code(death_location.and_then(|l| l.code.clone()))
            .death_place_label(place_label(death_location))
            .latitude(death_location.and_then(|l| l.latitude))
            .longitude(death_location.and_then(|l| l.longitude))
            .provenance(Provenance::Registry)
            .insee_num_acte(Some(key))
            .build();

        let memorial = self.memorials.create(new).await?;
        Ok(MapOutcome::Created(memorial))
    }

    /// Build the base slug and walk `-1`, `-2`, … suffixes until a free one
    /// is found. Looping until free is required for correctness, not
    /// best-effort.
    async fn unique_slug(&self, first: &str, last: &str, death_date_raw: &str) -> Result<String> {
        let name = slugify(&format!("{} {}", first, last));
        let fingerprint = short_hash(&[first, last, death_date_raw]);
        let base = format!("{}-{}-{}", name, death_date_raw, fingerprint);

        let mut candidate = base.clone();
        let mut suffix = 0u32;
        while self.memorials.find_by_slug(&candidate).await?.is_some() {
            suffix += 1;
            candidate = format!("{}-{}", base, suffix);
        }
        Ok(candidate)
    }
}

/// Composite uniqueness key: death location code (or `unknown`), raw death
/// date, and the death certificate id falling back to the record id. Two
/// records with the same key are the same memorial regardless of which fetch
/// or run delivered them.
pub fn dedup_key(person: &PersonRecord, death_date_raw: &str) -> String {
    let location_code = person
        .death
        .as_ref()
        .and_then(|d| d.location.as_ref())
        .and_then(|l| l.code.as_deref())
        .unwrap_or(UNKNOWN_LOCATION);
    let certificate = person
        .death
        .as_ref()
        .and_then(|d| d.certificate_id.as_deref())
        .unwrap_or(person.id.as_str());

    format!("{}-{}-{}", location_code, death_date_raw, certificate)
}

fn place_label(location: Option<&Location>) -> Option<String> {
    location
        .and_then(|l| l.city.as_ref())
        .and_then(|c| c.first())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::registry_sync::testing::{memorial_fixture, person, InMemoryMemorialStore};
    use deces_client::OneOrMany;

    fn mapper_with_store() -> (RecordMapper, Arc<InMemoryMemorialStore>) {
        let store = Arc::new(InMemoryMemorialStore::new());
        (RecordMapper::new(store.clone()), store)
    }

    #[test]
    fn dedup_key_combines_location_date_and_certificate() {
        let p = person("r1", "Jean", "Dupont", "20251201");
        assert_eq!(dedup_key(&p, "20251201"), "75056-20251201-r1-acte");
    }

    #[test]
    fn dedup_key_falls_back_to_record_id_without_certificate() {
        let mut p = person("r1", "Jean", "Dupont", "20251201");
        p.death.as_mut().unwrap().certificate_id = None;
        assert_eq!(dedup_key(&p, "20251201"), "75056-20251201-r1");
    }

    #[test]
    fn dedup_key_uses_unknown_without_location_code() {
        let mut p = person("r1", "Jean", "Dupont", "20251201");
        p.death.as_mut().unwrap().location = None;
        assert_eq!(dedup_key(&p, "20251201"), "unknown-20251201-r1-acte");
    }

    #[tokio::test]
    async fn creates_memorial_from_record() {
        let (mapper, store) = mapper_with_store();
        let p = person("r1", "Jean", "Dupont", "20251201");

        let outcome = mapper.map_record(&p).await.unwrap();
        let created = match outcome {
            MapOutcome::Created(m) => m,
            other => panic!("expected Created, got {:?}", other),
        };

        assert_eq!(created.first_name, "Jean");
        assert_eq!(created.last_name, "Dupont");
        assert_eq!(created.death_date.to_string(), "2025-12-01");
        assert_eq!(created.provenance, Provenance::Registry);
        assert_eq!(
            created.insee_num_acte.as_deref(),
            Some("75056-20251201-r1-acte")
        );
        assert_eq!(created.death_place_code.as_deref(), Some("75056"));
        assert_eq!(created.death_place_label.as_deref(), Some("Paris"));
        assert_eq!(created.latitude, Some(48.86));
        assert_eq!(store.all().len(), 1);
    }

    #[tokio::test]
    async fn slug_embeds_name_date_and_fingerprint() {
        let (mapper, _store) = mapper_with_store();
        let p = person("r1", "Jean", "Dupont", "20251201");

        let outcome = mapper.map_record(&p).await.unwrap();
        let created = match outcome {
            MapOutcome::Created(m) => m,
            other => panic!("expected Created, got {:?}", other),
        };

        let expected = format!(
            "jean-dupont-20251201-{}",
            short_hash(&["Jean", "Dupont", "20251201"])
        );
        assert_eq!(created.slug, expected);
    }

    #[tokio::test]
    async fn identical_dedup_keys_collapse_to_one_memorial() {
        let (mapper, store) = mapper_with_store();
        // Same certificate, location, and date, but different external ids.
        let p1 = person("r1", "Jean", "Dupont", "20251201");
        let mut p2 = person("r2", "Jean", "Dupont", "20251201");
        p2.death.as_mut().unwrap().certificate_id = Some("r1-acte".to_string());

        assert!(matches!(
            mapper.map_record(&p1).await.unwrap(),
            MapOutcome::Created(_)
        ));
        assert!(matches!(
            mapper.map_record(&p2).await.unwrap(),
            MapOutcome::Duplicate
        ));
        assert_eq!(store.all().len(), 1);
    }

    #[tokio::test]
    async fn missing_death_event_is_a_skip() {
        let (mapper, store) = mapper_with_store();
        let mut p = person("r1", "Jean", "Dupont", "20251201");
        p.death = None;

        assert!(matches!(
            mapper.map_record(&p).await.unwrap(),
            MapOutcome::MissingDeathDate
        ));
        assert!(store.all().is_empty());
    }

    #[tokio::test]
    async fn unparseable_death_date_is_a_skip() {
        let (mapper, store) = mapper_with_store();
        let p = person("r1", "Jean", "Dupont", "20251301");

        assert!(matches!(
            mapper.map_record(&p).await.unwrap(),
            MapOutcome::MissingDeathDate
        ));
        assert!(store.all().is_empty());
    }

    #[tokio::test]
    async fn missing_names_fall_back_to_placeholder() {
        let (mapper, _store) = mapper_with_store();
        let mut p = person("r1", "Jean", "Dupont", "20251201");
        p.name.first = None;
        p.name.last = None;

        let outcome = mapper.map_record(&p).await.unwrap();
        let created = match outcome {
            MapOutcome::Created(m) => m,
            other => panic!("expected Created, got {:?}", other),
        };
        assert_eq!(created.first_name, "Inconnu");
        assert_eq!(created.last_name, "Inconnu");
    }

    #[tokio::test]
    async fn place_name_array_takes_first_variant() {
        let (mapper, _store) = mapper_with_store();
        let mut p = person("r1", "Jean", "Dupont", "20251201");
        p.death.as_mut().unwrap().location.as_mut().unwrap().city = Some(OneOrMany::Many(vec![
            "Marseille".to_string(),
            "Massilia".to_string(),
        ]));

        let outcome = mapper.map_record(&p).await.unwrap();
        let created = match outcome {
            MapOutcome::Created(m) => m,
            other => panic!("expected Created, got {:?}", other),
        };
        assert_eq!(created.death_place_label.as_deref(), Some("Marseille"));
    }

    #[tokio::test]
    async fn slug_collision_appends_numeric_suffix() {
        let (mapper, store) = mapper_with_store();
        let base = format!(
            "jean-dupont-20251201-{}",
            short_hash(&["Jean", "Dupont", "20251201"])
        );
        // Occupy the base slug and the first suffix.
        store.insert(memorial_fixture(&base, Some("occupied-1")));
        store.insert(memorial_fixture(&format!("{}-1", base), Some("occupied-2")));

        let p = person("r1", "Jean", "Dupont", "20251201");
        let outcome = mapper.map_record(&p).await.unwrap();
        let created = match outcome {
            MapOutcome::Created(m) => m,
            other => panic!("expected Created, got {:?}", other),
        };
        assert_eq!(created.slug, format!("{}-2", base));
    }

    #[tokio::test]
    async fn same_name_same_day_records_get_distinct_slugs() {
        let (mapper, store) = mapper_with_store();
        let p1 = person("r1", "Jean", "Dupont", "20251201");
        let p2 = person("r2", "Jean", "Dupont", "20251201");

        mapper.map_record(&p1).await.unwrap();
        mapper.map_record(&p2).await.unwrap();

        let records = store.all();
        assert_eq!(records.len(), 2);
        assert_ne!(records[0].slug, records[1].slug);
        assert_eq!(records[1].slug, format!("{}-1", records[0].slug));
    }
}
