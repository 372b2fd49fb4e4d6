//! Listing source contract plus the PetPlace implementation.

pub mod fields;
pub mod mapper;
pub mod payload;
pub mod petplace;
pub mod search;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dobie_core::NormalizedListing;
use dobie_storage::FetchError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

pub use mapper::{MapError, RecordMapper};
pub use payload::{DetailFields, DetailPayload, RequiredFields, SearchSummary};
pub use petplace::{PetPlaceAdapter, PetPlaceEndpoints, PETPLACE_SOURCE};

pub const CRATE_NAME: &str = "dobie-adapters";

/// One animal found by a search, before its detail payload is fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub animal_id: String,
    pub client_id: String,
    pub detail_url: String,
    /// Raw search-API entry when the candidate came from the structured path.
    pub summary: Option<JsonValue>,
}

impl SearchCandidate {
    pub fn key(&self) -> (&str, &str) {
        (&self.animal_id, &self.client_id)
    }
}

/// Search parameters for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Site base for the HTML search page; the source's own site when unset.
    pub target_url: Option<String>,
    /// Full search URL, used verbatim.
    pub search_url: Option<String>,
    pub zip: String,
    /// Non-empty switches to one structured search per zip.
    pub zips: Vec<String>,
    pub breed: String,
    pub radius: String,
    pub start_index: u32,
    pub animal_type: String,
}

impl SearchQuery {
    /// Zip stored on the run: the comma-joined list in multi-zip mode.
    pub fn recorded_zip(&self) -> String {
        if self.zips.is_empty() {
            self.zip.clone()
        } else {
            self.zips.join(",")
        }
    }
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            target_url: None,
            search_url: None,
            zip: "94110".to_string(),
            zips: Vec::new(),
            breed: "DOBERMAN PINSCH".to_string(),
            radius: "100".to_string(),
            start_index: 0,
            animal_type: "Dog".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// The URL recorded on the run.
    pub search_url: String,
    /// Flattened, not yet deduplicated.
    pub candidates: Vec<SearchCandidate>,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("invalid url {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error(transparent)]
    Map(#[from] MapError),
}

#[async_trait]
pub trait ListingSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn search(&self, query: &SearchQuery) -> Result<SearchOutcome, AdapterError>;

    async fn fetch_detail(&self, candidate: &SearchCandidate) -> Result<JsonValue, AdapterError>;

    fn normalize(
        &self,
        payload: &JsonValue,
        candidate: &SearchCandidate,
        ingested_at: DateTime<Utc>,
    ) -> Result<NormalizedListing, AdapterError>;
}
