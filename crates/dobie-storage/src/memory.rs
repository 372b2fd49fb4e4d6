//! In-memory [`ListingStore`] + [`DogCatalog`] for tests and dry environments.
//!
//! Enforces the same keys as the relational schema: natural-key uniqueness for
//! shelters and dogs, primary-key uniqueness for photos, `(run, dog)` uniqueness
//! for run links, and a known run for every link. Each `persist_listing` call
//! works on a staged copy that only replaces the live state on success.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dobie_core::{Dog, DogView, NormalizedListing, Photo, SearchResultLink, SearchRun, Shelter};

use crate::{DogCatalog, DogQuery, ListingStore, StoreError};

type ShelterKey = (String, String);
type DogKey = (String, String, String);

#[derive(Debug, Clone, Default)]
struct State {
    shelters: HashMap<String, Shelter>,
    shelter_keys: HashMap<ShelterKey, String>,
    dogs: HashMap<String, Dog>,
    dog_keys: HashMap<DogKey, String>,
    photos: HashMap<String, Vec<Photo>>,
    runs: HashMap<String, SearchRun>,
    links: Vec<SearchResultLink>,
}

impl State {
    fn upsert_shelter(&mut self, mut shelter: Shelter) -> String {
        let key = (shelter.source.clone(), shelter.client_id.clone());
        if let Some(existing) = self.shelter_keys.get(&key) {
            shelter.id = existing.clone();
        } else {
            self.shelter_keys.insert(key, shelter.id.clone());
        }
        let id = shelter.id.clone();
        self.shelters.insert(id.clone(), shelter);
        id
    }

    fn upsert_dog(&mut self, mut dog: Dog) -> Result<String, StoreError> {
        if !self.shelters.contains_key(&dog.shelter_id) {
            return Err(StoreError::Constraint(format!(
                "dogs.shelter_id {} references no shelter",
                dog.shelter_id
            )));
        }
        let key = (
            dog.source.clone(),
            dog.source_animal_id.clone(),
            dog.client_id.clone(),
        );
        if let Some(existing) = self.dog_keys.get(&key) {
            dog.id = existing.clone();
        } else {
            self.dog_keys.insert(key, dog.id.clone());
        }
        let id = dog.id.clone();
        self.dogs.insert(id.clone(), dog);
        Ok(id)
    }

    fn replace_photos(&mut self, dog_id: &str, photos: Vec<Photo>) -> Result<(), StoreError> {
        self.photos.remove(dog_id);
        let mut inserted: Vec<Photo> = Vec::with_capacity(photos.len());
        for mut photo in photos {
            let taken = inserted.iter().any(|p| p.id == photo.id)
                || self
                    .photos
                    .values()
                    .flatten()
                    .any(|p| p.id == photo.id);
            if taken {
                return Err(StoreError::Constraint(format!(
                    "duplicate photos.id {}",
                    photo.id
                )));
            }
            photo.dog_id = dog_id.to_string();
            inserted.push(photo);
        }
        self.photos.insert(dog_id.to_string(), inserted);
        Ok(())
    }

    fn link(&mut self, link: SearchResultLink) -> Result<(), StoreError> {
        if !self.runs.contains_key(&link.search_run_id) {
            return Err(StoreError::UnknownRun(link.search_run_id));
        }
        let exists = self
            .links
            .iter()
            .any(|l| l.search_run_id == link.search_run_id && l.dog_id == link.dog_id);
        if !exists {
            self.links.push(link);
        }
        Ok(())
    }

    fn view(&self, dog: &Dog) -> DogView {
        let photos = self.photos.get(&dog.id).map(Vec::as_slice).unwrap_or(&[]);
        DogView::assemble(dog.clone(), self.shelters.get(&dog.shelter_id), photos)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn dog_count(&self) -> usize {
        self.read().dogs.len()
    }

    pub fn shelter_count(&self) -> usize {
        self.read().shelters.len()
    }

    pub fn dog(&self, id: &str) -> Option<Dog> {
        self.read().dogs.get(id).cloned()
    }

    pub fn photos_for(&self, dog_id: &str) -> Vec<Photo> {
        self.read().photos.get(dog_id).cloned().unwrap_or_default()
    }

    pub fn run(&self, run_id: &str) -> Option<SearchRun> {
        self.read().runs.get(run_id).cloned()
    }

    pub fn links_for(&self, run_id: &str) -> Vec<SearchResultLink> {
        self.read()
            .links
            .iter()
            .filter(|l| l.search_run_id == run_id)
            .cloned()
            .collect()
    }

    /// Raw link insert, exposed so the insert-if-absent rule can be exercised directly.
    pub fn insert_link(&self, link: SearchResultLink) -> Result<(), StoreError> {
        self.write().link(link)
    }
}

#[async_trait]
impl ListingStore for MemoryStore {
    async fn start_run(&self, run: &SearchRun) -> Result<(), StoreError> {
        let mut state = self.write();
        if state.runs.contains_key(&run.id) {
            return Err(StoreError::Constraint(format!("duplicate search_runs.id {}", run.id)));
        }
        state.runs.insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn complete_run(&self, run_id: &str, completed_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.write();
        let run = state
            .runs
            .get_mut(run_id)
            .ok_or_else(|| StoreError::UnknownRun(run_id.to_string()))?;
        run.completed_at = Some(completed_at);
        Ok(())
    }

    async fn persist_listing(
        &self,
        run_id: &str,
        listing: NormalizedListing,
    ) -> Result<String, StoreError> {
        let NormalizedListing {
            mut dog,
            shelter,
            photos,
        } = listing;

        let mut live = self.write();
        let mut staged = live.clone();

        let shelter_id = staged.upsert_shelter(shelter);
        dog.shelter_id = shelter_id;
        let source_animal_id = dog.source_animal_id.clone();
        let client_id = dog.client_id.clone();
        let dog_id = staged.upsert_dog(dog)?;
        staged.replace_photos(&dog_id, photos)?;
        staged.link(SearchResultLink {
            search_run_id: run_id.to_string(),
            dog_id: dog_id.clone(),
            source_animal_id,
            client_id,
            ingested_at: Utc::now(),
        })?;

        *live = staged;
        Ok(dog_id)
    }
}

fn contains_ci(haystack: Option<&str>, needle_lower: &str) -> bool {
    haystack
        .map(|h| h.to_lowercase().contains(needle_lower))
        .unwrap_or(false)
}

fn eq_filter(value: Option<&str>, wanted: &Option<String>) -> bool {
    match wanted {
        Some(w) => value == Some(w.as_str()),
        None => true,
    }
}

#[async_trait]
impl DogCatalog for MemoryStore {
    async fn list_dogs(&self, query: &DogQuery) -> Result<Vec<DogView>, StoreError> {
        let state = self.read();
        let q = query.q.as_deref().map(str::to_lowercase);
        let breed = query.breed.as_deref().map(str::to_lowercase);

        let mut matches = state
            .dogs
            .values()
            .filter(|d| {
                let Some(q) = &q else { return true };
                let shelter_name = state.shelters.get(&d.shelter_id).map(|s| s.name.as_str());
                contains_ci(Some(d.name.as_str()), q)
                    || contains_ci(d.primary_breed.as_deref(), q)
                    || contains_ci(d.secondary_breed.as_deref(), q)
                    || contains_ci(d.description_html.as_deref(), q)
                    || contains_ci(shelter_name, q)
            })
            .filter(|d| match &breed {
                Some(b) => contains_ci(d.primary_breed.as_deref(), b),
                None => true,
            })
            .filter(|d| eq_filter(d.age.as_deref(), &query.age))
            .filter(|d| eq_filter(d.gender.as_deref(), &query.gender))
            .filter(|d| eq_filter(d.size_category.as_deref(), &query.size))
            .filter(|d| eq_filter(d.status.as_deref(), &query.status))
            .filter(|d| eq_filter(Some(d.client_id.as_str()), &query.client_id))
            .filter(|d| eq_filter(Some(d.source_animal_id.as_str()), &query.source_animal_id))
            .collect::<Vec<_>>();

        matches.sort_by(|a, b| b.ingested_at.cmp(&a.ingested_at).then_with(|| a.id.cmp(&b.id)));

        Ok(matches
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .map(|d| state.view(d))
            .collect())
    }

    async fn get_dog(&self, id: &str) -> Result<Option<DogView>, StoreError> {
        let state = self.read();
        Ok(state.dogs.get(id).map(|d| state.view(d)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use dobie_core::{dog_id, photo_id, shelter_id, DogFilters};

    fn ts(sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 24, 12, 0, sec).single().unwrap()
    }

    fn listing(animal: &str, name: &str, urls: &[&str], at: DateTime<Utc>) -> NormalizedListing {
        let dog_id = dog_id("petplace", animal, "CCST");
        let shelter_id = shelter_id("petplace", "CCST");
        NormalizedListing {
            dog: Dog {
                id: dog_id.clone(),
                source: "petplace".into(),
                source_animal_id: animal.into(),
                client_id: "CCST".into(),
                name: name.into(),
                full_name: Some(format!("{name} ({animal})")),
                animal_type: "Dog".into(),
                primary_breed: Some("Doberman Pinscher".into()),
                secondary_breed: None,
                breed1: None,
                breed2: None,
                breed_display: None,
                age: Some("Adult".into()),
                age_display: None,
                gender: Some("Female".into()),
                size_category: Some("Large".into()),
                description_html: None,
                bio_html: None,
                more_info_html: None,
                placement_info: None,
                weight_lbs: Some(68.0),
                status: Some("available".into()),
                shelter_id: shelter_id.clone(),
                cover_image_url: None,
                located_at: None,
                brought_to_shelter: None,
                city: None,
                state: None,
                lat: None,
                lon: None,
                filter_breed_group: None,
                client_sort: None,
                listing_url: format!("https://www.petplace.com/pet-adoption/dogs/{animal}/CCST"),
                source_api_url: format!("https://api.petplace.com/animal/{animal}/client/CCST"),
                data_updated_note: None,
                filters: DogFilters::default(),
                ingested_at: at,
                source_updated_at: None,
                raw_payload: serde_json::json!({ "name": name }),
            },
            shelter: Shelter {
                id: shelter_id,
                source: "petplace".into(),
                client_id: "CCST".into(),
                name: "Contra Costa County Animal Services".into(),
                address_line1: None,
                city: Some("Martinez".into()),
                state: Some("CA".into()),
                zip: None,
                phone: None,
                email: None,
                website_url: None,
                location_label: None,
                location_address_html: None,
                ingested_at: at,
            },
            photos: urls
                .iter()
                .enumerate()
                .map(|(i, url)| Photo {
                    id: photo_id(&dog_id, url),
                    dog_id: dog_id.clone(),
                    url: url.to_string(),
                    is_primary: i == 0,
                    position: i as i32,
                    source: "petplace".into(),
                    ingested_at: at,
                })
                .collect(),
        }
    }

    async fn started(store: &MemoryStore) -> SearchRun {
        let run = SearchRun::begin("https://search", "94110", "DOBERMAN PINSCH", "Dog", ts(0));
        store.start_run(&run).await.unwrap();
        run
    }

    #[tokio::test]
    async fn reingestion_is_idempotent_and_replaces_photos() {
        let store = MemoryStore::new();
        let run = started(&store).await;

        let first = store
            .persist_listing(&run.id, listing("A1", "Mindy", &["a", "b", "c"], ts(1)))
            .await
            .unwrap();
        let second = store
            .persist_listing(&run.id, listing("A1", "Mindy", &["b"], ts(2)))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.dog_count(), 1);
        assert_eq!(store.shelter_count(), 1);
        let photos = store.photos_for(&first);
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].url, "b");
        assert!(photos[0].is_primary);
        assert_eq!(store.links_for(&run.id).len(), 1);
        assert_eq!(store.dog(&first).unwrap().ingested_at, ts(2));
    }

    #[tokio::test]
    async fn conflicting_natural_key_keeps_existing_id() {
        let store = MemoryStore::new();
        let run = started(&store).await;
        let original = store
            .persist_listing(&run.id, listing("A1", "Mindy", &[], ts(1)))
            .await
            .unwrap();

        let mut renamed = listing("A1", "Mindy II", &[], ts(2));
        renamed.dog.id = "someone-elses-id".into();
        renamed.shelter.id = "other-shelter-id".into();
        let resolved = store.persist_listing(&run.id, renamed).await.unwrap();

        assert_eq!(resolved, original);
        let dog = store.dog(&original).unwrap();
        assert_eq!(dog.name, "Mindy II");
        assert_eq!(dog.shelter_id, shelter_id("petplace", "CCST"));
        assert_eq!(store.shelter_count(), 1);
    }

    #[tokio::test]
    async fn failed_unit_of_work_rolls_back_everything() {
        let store = MemoryStore::new();
        let run = started(&store).await;
        store
            .persist_listing(&run.id, listing("A1", "Mindy", &["x"], ts(1)))
            .await
            .unwrap();

        let mut bad = listing("A1", "Changed", &["y", "y"], ts(2));
        bad.shelter.name = "Renamed Shelter".into();
        let err = store.persist_listing(&run.id, bad).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));

        let id = dog_id("petplace", "A1", "CCST");
        assert_eq!(store.dog(&id).unwrap().name, "Mindy");
        assert_eq!(store.photos_for(&id)[0].url, "x");
        let view = store.get_dog(&id).await.unwrap().unwrap();
        assert_eq!(view.shelter.unwrap().name, "Contra Costa County Animal Services");
    }

    #[tokio::test]
    async fn unknown_run_is_rejected_without_side_effects() {
        let store = MemoryStore::new();
        let err = store
            .persist_listing("missing-run", listing("A1", "Mindy", &[], ts(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownRun(_)));
        assert_eq!(store.dog_count(), 0);
    }

    #[tokio::test]
    async fn run_links_are_insert_if_absent() {
        let store = MemoryStore::new();
        let run = started(&store).await;
        let link = SearchResultLink {
            search_run_id: run.id.clone(),
            dog_id: "dog".into(),
            source_animal_id: "A1".into(),
            client_id: "CCST".into(),
            ingested_at: ts(1),
        };
        store.insert_link(link.clone()).unwrap();
        store.insert_link(link).unwrap();
        assert_eq!(store.links_for(&run.id).len(), 1);
    }

    #[tokio::test]
    async fn completing_a_run_stamps_completion() {
        let store = MemoryStore::new();
        let run = started(&store).await;
        assert!(store.run(&run.id).unwrap().completed_at.is_none());
        store.complete_run(&run.id, ts(9)).await.unwrap();
        assert_eq!(store.run(&run.id).unwrap().completed_at, Some(ts(9)));
        assert!(matches!(
            store.complete_run("nope", ts(9)).await,
            Err(StoreError::UnknownRun(_))
        ));
    }

    #[tokio::test]
    async fn catalog_filters_orders_and_pages() {
        let store = MemoryStore::new();
        let run = started(&store).await;
        store
            .persist_listing(&run.id, listing("A1", "Mindy", &["m1", "m2"], ts(1)))
            .await
            .unwrap();
        let mut rex = listing("A2", "Rex", &[], ts(2));
        rex.dog.primary_breed = Some("Labrador Retriever".into());
        rex.dog.gender = Some("Male".into());
        store.persist_listing(&run.id, rex).await.unwrap();

        let all = store.list_dogs(&DogQuery::default()).await.unwrap();
        assert_eq!(
            all.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            vec!["Rex", "Mindy"]
        );

        let by_breed = store
            .list_dogs(&DogQuery {
                breed: Some("doberman".into()),
                ..DogQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(by_breed.len(), 1);
        assert_eq!(by_breed[0].photos.len(), 2);
        assert!(by_breed[0].photos[0].is_primary);

        let by_shelter_text = store
            .list_dogs(&DogQuery {
                q: Some("contra costa".into()),
                gender: Some("Male".into()),
                ..DogQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(by_shelter_text.len(), 1);
        assert_eq!(by_shelter_text[0].name, "Rex");

        let paged = store
            .list_dogs(&DogQuery {
                limit: 1,
                offset: 1,
                ..DogQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].name, "Mindy");
    }
}
