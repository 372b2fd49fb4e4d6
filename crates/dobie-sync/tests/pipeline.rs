use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dobie_adapters::{
    AdapterError, ListingSource, RecordMapper, SearchCandidate, SearchOutcome, SearchQuery,
};
use dobie_core::{dog_id, NormalizedListing};
use dobie_storage::{DogCatalog, DogQuery, FetchError, MemoryStore};
use dobie_sync::{dedup_candidates, CandidatePlan, RunOptions, SyncError, SyncPipeline};
use serde_json::{json, Value};

#[derive(Default)]
struct FakeSource {
    candidates: Vec<SearchCandidate>,
    payloads: HashMap<String, Value>,
    fetched: Mutex<Vec<String>>,
}

impl FakeSource {
    fn with(mut self, animal_id: &str, payload: Option<Value>) -> Self {
        self.candidates.push(candidate(animal_id));
        if let Some(payload) = payload {
            self.payloads.insert(animal_id.to_string(), payload);
        }
        self
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

fn candidate(animal_id: &str) -> SearchCandidate {
    SearchCandidate {
        animal_id: animal_id.to_string(),
        client_id: "CCST".to_string(),
        detail_url: format!("https://www.petplace.com/pet-adoption/dogs/{animal_id}/CCST"),
        summary: None,
    }
}

fn detail(animal_id: &str, name: &str) -> Value {
    json!({
        "ppRequired": [{
            "AnimalId": animal_id,
            "ClientId": "CCST",
            "Pet Name": format!("{name} ({animal_id})"),
            "Primary Breed": "Doberman Pinscher",
            "Shelter Name": "Contra Costa County Animal Services"
        }],
        "animalDetail": [{ "Weight": "60 lbs" }],
        "imageURL": [format!("https://img/{animal_id}.jpg")]
    })
}

#[async_trait]
impl ListingSource for FakeSource {
    fn source_name(&self) -> &'static str {
        "petplace"
    }

    async fn search(&self, _query: &SearchQuery) -> Result<SearchOutcome, AdapterError> {
        Ok(SearchOutcome {
            search_url: "https://www.petplace.com/pet-adoption/search?zipPostal=94110".into(),
            candidates: self.candidates.clone(),
        })
    }

    async fn fetch_detail(&self, candidate: &SearchCandidate) -> Result<Value, AdapterError> {
        self.fetched.lock().unwrap().push(candidate.animal_id.clone());
        self.payloads
            .get(&candidate.animal_id)
            .cloned()
            .ok_or_else(|| {
                AdapterError::Fetch(FetchError::HttpStatus {
                    status: 404,
                    url: candidate.detail_url.clone(),
                })
            })
    }

    fn normalize(
        &self,
        payload: &Value,
        candidate: &SearchCandidate,
        ingested_at: DateTime<Utc>,
    ) -> Result<NormalizedListing, AdapterError> {
        let mapper = RecordMapper::new("petplace", "https://www.petplace.com", "https://api.petplace.com");
        Ok(mapper.normalize(payload, Some(candidate), ingested_at)?)
    }
}

fn options(limit: usize, dry_run: bool) -> RunOptions {
    RunOptions {
        query: SearchQuery::default(),
        limit,
        delay: Duration::ZERO,
        dry_run,
    }
}

#[tokio::test]
async fn one_bad_record_does_not_abort_the_run() {
    let source = Arc::new(
        FakeSource::default()
            .with("A1", Some(detail("A1", "Mindy")))
            .with("A2", Some(json!("not an object")))
            .with("A3", Some(detail("A3", "Rex"))),
    );
    let store = Arc::new(MemoryStore::new());
    let pipeline = SyncPipeline::new(source.clone()).with_store(store.clone());

    let summary = pipeline.run_once(&options(25, false)).await.unwrap();

    assert_eq!(summary.upserted, 2);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].animal_id, "A2");
    assert_eq!(summary.failures[0].stage, "normalize");
    assert_eq!(source.fetched(), vec!["A1", "A2", "A3"]);

    let run_id = summary.run_id.unwrap();
    assert!(store.run(&run_id).unwrap().completed_at.is_some());
    assert_eq!(store.links_for(&run_id).len(), 2);
    assert!(store.dog(&dog_id("petplace", "A1", "CCST")).is_some());
    assert!(store.dog(&dog_id("petplace", "A2", "CCST")).is_none());
    assert!(store.dog(&dog_id("petplace", "A3", "CCST")).is_some());
}

#[tokio::test]
async fn fetch_failures_are_recorded_and_skipped() {
    let source = Arc::new(
        FakeSource::default()
            .with("A1", None)
            .with("A2", Some(detail("A2", "Duke"))),
    );
    let store = Arc::new(MemoryStore::new());
    let summary = SyncPipeline::new(source)
        .with_store(store.clone())
        .run_once(&options(25, false))
        .await
        .unwrap();

    assert_eq!(summary.upserted, 1);
    assert_eq!(summary.failures[0].stage, "fetch");
    assert!(summary.failures[0].error.contains("404"));
    assert_eq!(store.dog_count(), 1);
}

#[tokio::test]
async fn duplicates_are_dropped_before_the_limit_applies() {
    let source = Arc::new(
        FakeSource::default()
            .with("A1", Some(detail("A1", "Mindy")))
            .with("A1", Some(detail("A1", "Mindy")))
            .with("A2", Some(detail("A2", "Rex")))
            .with("A3", Some(detail("A3", "Duke"))),
    );
    let store = Arc::new(MemoryStore::new());
    let summary = SyncPipeline::new(source.clone())
        .with_store(store.clone())
        .run_once(&options(2, false))
        .await
        .unwrap();

    assert_eq!(summary.found, 4);
    assert_eq!(summary.unique, 3);
    assert_eq!(summary.selected, 2);
    assert_eq!(source.fetched(), vec!["A1", "A2"]);
    assert_eq!(store.dog_count(), 2);
}

#[tokio::test]
async fn rerunning_is_idempotent() {
    let source = Arc::new(FakeSource::default().with("A1", Some(detail("A1", "Mindy"))));
    let store = Arc::new(MemoryStore::new());
    let pipeline = SyncPipeline::new(source).with_store(store.clone());

    pipeline.run_once(&options(25, false)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2)).await;
    pipeline.run_once(&options(25, false)).await.unwrap();

    assert_eq!(store.dog_count(), 1);
    assert_eq!(store.shelter_count(), 1);
    let id = dog_id("petplace", "A1", "CCST");
    assert_eq!(store.photos_for(&id).len(), 1);
    let listed = store.list_dogs(&DogQuery::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "Mindy");
}

#[tokio::test]
async fn dry_run_touches_nothing() {
    let source = Arc::new(
        FakeSource::default()
            .with("A1", Some(detail("A1", "Mindy")))
            .with("A2", Some(detail("A2", "Rex"))),
    );
    let summary = SyncPipeline::new(source.clone())
        .run_once(&options(1, true))
        .await
        .unwrap();

    assert!(summary.dry_run);
    assert!(summary.run_id.is_none());
    assert_eq!(summary.selected, 1);
    assert!(source.fetched().is_empty());
}

#[tokio::test]
async fn empty_search_is_fatal_before_any_persistence() {
    let store = Arc::new(MemoryStore::new());
    let err = SyncPipeline::new(Arc::new(FakeSource::default()))
        .with_store(store.clone())
        .run_once(&options(25, false))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::NoListings { .. }));
    assert_eq!(store.dog_count(), 0);
}

#[tokio::test]
async fn real_run_without_store_is_a_config_error() {
    let source = Arc::new(FakeSource::default().with("A1", Some(detail("A1", "Mindy"))));
    let err = SyncPipeline::new(source)
        .run_once(&options(25, false))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
}

#[tokio::test]
async fn multi_zip_runs_record_the_searched_zips() {
    let source = Arc::new(FakeSource::default().with("A1", Some(detail("A1", "Mindy"))));
    let store = Arc::new(MemoryStore::new());
    let mut opts = options(25, false);
    opts.query.zips = vec!["10001".into(), "60601".into()];

    let summary = SyncPipeline::new(source)
        .with_store(store.clone())
        .run_once(&opts)
        .await
        .unwrap();

    let run = store.run(&summary.run_id.unwrap()).unwrap();
    assert_eq!(run.zip_postal, "10001,60601");
}

#[tokio::test]
async fn single_zip_runs_record_the_zip() {
    let source = Arc::new(FakeSource::default().with("A1", Some(detail("A1", "Mindy"))));
    let store = Arc::new(MemoryStore::new());
    let mut opts = options(25, false);
    opts.query.zip = "10001".into();

    let summary = SyncPipeline::new(source)
        .with_store(store.clone())
        .run_once(&opts)
        .await
        .unwrap();

    assert_eq!(store.run(&summary.run_id.unwrap()).unwrap().zip_postal, "10001");
}

#[tokio::test]
async fn plan_counts_found_unique_and_selected() {
    let source = Arc::new(
        FakeSource::default()
            .with("A1", None)
            .with("A1", None)
            .with("A2", None)
            .with("A3", None),
    );
    let plan = SyncPipeline::new(source.clone())
        .plan(&options(2, false))
        .await
        .unwrap();

    assert_eq!(
        plan,
        CandidatePlan {
            search_url: "https://www.petplace.com/pet-adoption/search?zipPostal=94110".into(),
            found: 4,
            unique: 3,
            candidates: vec![candidate("A1"), candidate("A2")],
        }
    );
    assert!(source.fetched().is_empty());
}

#[test]
fn dedup_keeps_first_occurrence_in_order() {
    let mut other_client = candidate("A1");
    other_client.client_id = "SFSPCA".into();
    let deduped = dedup_candidates(vec![
        candidate("A2"),
        candidate("A1"),
        candidate("A2"),
        other_client,
    ]);
    assert_eq!(
        deduped.iter().map(|c| c.key()).collect::<Vec<_>>(),
        vec![("A2", "CCST"), ("A1", "CCST"), ("A1", "SFSPCA")]
    );
}
