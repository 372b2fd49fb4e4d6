//! Run bookkeeping: one `search_runs` row per sync, one link per processed dog.

use chrono::{DateTime, Utc};
use dobie_core::{NormalizedListing, SearchRun};
use dobie_storage::{ListingStore, StoreError};
use serde::Serialize;
use tracing::info;

/// A candidate that did not make it into the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateFailure {
    pub animal_id: String,
    pub client_id: String,
    pub stage: &'static str,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub upserted: Vec<String>,
    pub failures: Vec<CandidateFailure>,
}

/// Started before the candidate loop and completed after it, however many
/// candidates failed in between.
pub struct RunTracker<'a> {
    store: &'a dyn ListingStore,
    run: SearchRun,
    upserted: Vec<String>,
    failures: Vec<CandidateFailure>,
}

impl<'a> RunTracker<'a> {
    pub async fn start(store: &'a dyn ListingStore, run: SearchRun) -> Result<Self, StoreError> {
        store.start_run(&run).await?;
        info!(run_id = %run.id, search_url = %run.search_url, "search run started");
        Ok(Self {
            store,
            run,
            upserted: Vec::new(),
            failures: Vec::new(),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run.id
    }

    /// Persists one listing and links it to this run in the same unit of work.
    pub async fn persist(&mut self, listing: NormalizedListing) -> Result<String, StoreError> {
        let dog_id = self.store.persist_listing(&self.run.id, listing).await?;
        self.upserted.push(dog_id.clone());
        Ok(dog_id)
    }

    pub fn record_failure(&mut self, failure: CandidateFailure) {
        self.failures.push(failure);
    }

    pub async fn complete(self) -> Result<RunReport, StoreError> {
        let completed_at = Utc::now();
        self.store.complete_run(&self.run.id, completed_at).await?;
        info!(
            run_id = %self.run.id,
            upserted = self.upserted.len(),
            failed = self.failures.len(),
            "search run completed"
        );
        Ok(RunReport {
            run_id: self.run.id,
            started_at: self.run.started_at,
            completed_at,
            upserted: self.upserted,
            failures: self.failures,
        })
    }
}
