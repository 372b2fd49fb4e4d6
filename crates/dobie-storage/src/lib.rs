//! Persistence and outbound HTTP for dobie.
//!
//! The write side ([`ListingStore`]) persists one normalized listing per atomic
//! unit of work; the read side ([`DogCatalog`]) backs the HTTP API. Both are
//! implemented for Postgres ([`PgStore`]) and in memory ([`MemoryStore`]).

pub mod http;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dobie_core::{DogView, NormalizedListing, SearchRun};
use thiserror::Error;

pub use http::{FetchError, FetchedResponse, HttpClientConfig, HttpFetcher, DEFAULT_USER_AGENT};
pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const CRATE_NAME: &str = "dobie-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("constraint violated: {0}")]
    Constraint(String),
    #[error("unknown search run {0}")]
    UnknownRun(String),
}

/// Write side: run bookkeeping plus the per-animal upsert unit of work.
#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn start_run(&self, run: &SearchRun) -> Result<(), StoreError>;

    async fn complete_run(&self, run_id: &str, completed_at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Upserts shelter then dog, replaces the dog's photos wholesale and links
    /// the dog to `run_id`, all in one transaction. Returns the persisted dog id.
    async fn persist_listing(
        &self,
        run_id: &str,
        listing: NormalizedListing,
    ) -> Result<String, StoreError>;
}

/// Filters accepted by [`DogCatalog::list_dogs`]. `None` means unfiltered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DogQuery {
    pub q: Option<String>,
    pub breed: Option<String>,
    pub age: Option<String>,
    pub gender: Option<String>,
    pub size: Option<String>,
    pub status: Option<String>,
    pub client_id: Option<String>,
    pub source_animal_id: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for DogQuery {
    fn default() -> Self {
        Self {
            q: None,
            breed: None,
            age: None,
            gender: None,
            size: None,
            status: None,
            client_id: None,
            source_animal_id: None,
            limit: 50,
            offset: 0,
        }
    }
}

/// Read side used by the HTTP API. Results are ordered newest ingestion first.
#[async_trait]
pub trait DogCatalog: Send + Sync {
    async fn list_dogs(&self, query: &DogQuery) -> Result<Vec<DogView>, StoreError>;

    async fn get_dog(&self, id: &str) -> Result<Option<DogView>, StoreError>;
}
