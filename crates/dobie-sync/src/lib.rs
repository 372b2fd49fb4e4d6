//! Sync pipeline orchestration: search, dedup, then fetch/normalize/persist
//! one candidate at a time.

pub mod config;
pub mod run;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dobie_adapters::{
    AdapterError, ListingSource, PetPlaceAdapter, PetPlaceEndpoints, SearchCandidate,
};
use dobie_core::SearchRun;
use dobie_storage::{HttpClientConfig, HttpFetcher, ListingStore, PgStore, StoreError};
use serde::Serialize;
use thiserror::Error;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

pub use config::{ConfigError, RunOptions, SyncConfig};
pub use run::{CandidateFailure, RunReport, RunTracker};

pub const CRATE_NAME: &str = "dobie-sync";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no listings found at {search_url}; verify PETPLACE_ZIP, PETPLACE_RADIUS and PETPLACE_BREED")]
    NoListings { search_url: String },
    #[error("search failed: {0}")]
    Search(#[from] AdapterError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-candidate failure; caught by the loop and never fatal.
#[derive(Debug, Error)]
pub enum CandidateError {
    #[error("detail fetch failed: {0}")]
    Fetch(#[source] AdapterError),
    #[error("normalization failed: {0}")]
    Normalize(#[source] AdapterError),
    #[error("persist failed: {0}")]
    Persist(#[source] StoreError),
}

impl CandidateError {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch",
            Self::Normalize(_) => "normalize",
            Self::Persist(_) => "persist",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePlan {
    pub search_url: String,
    pub found: usize,
    pub unique: usize,
    pub candidates: Vec<SearchCandidate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Option<String>,
    pub search_url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub found: usize,
    pub unique: usize,
    pub selected: usize,
    pub upserted: usize,
    pub failures: Vec<CandidateFailure>,
    pub dry_run: bool,
}

/// Keeps the first candidate per `(animal_id, client_id)`, preserving order.
pub fn dedup_candidates(candidates: Vec<SearchCandidate>) -> Vec<SearchCandidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert((c.animal_id.clone(), c.client_id.clone())))
        .collect()
}

pub struct SyncPipeline {
    source: Arc<dyn ListingSource>,
    store: Option<Arc<dyn ListingStore>>,
}

impl SyncPipeline {
    pub fn new(source: Arc<dyn ListingSource>) -> Self {
        Self {
            source,
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ListingStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Search, dedup, fail on an empty search, then cap at `limit`.
    pub async fn plan(&self, options: &RunOptions) -> Result<CandidatePlan, SyncError> {
        let outcome = self.source.search(&options.query).await?;
        let found = outcome.candidates.len();
        info!(search_url = %outcome.search_url, found, "loaded search");
        if found == 0 {
            return Err(SyncError::NoListings {
                search_url: outcome.search_url,
            });
        }

        let mut candidates = dedup_candidates(outcome.candidates);
        let unique = candidates.len();
        candidates.truncate(options.limit);
        Ok(CandidatePlan {
            search_url: outcome.search_url,
            found,
            unique,
            candidates,
        })
    }

    pub async fn run_once(&self, options: &RunOptions) -> Result<SyncRunSummary, SyncError> {
        let started_at = Utc::now();
        let plan = self.plan(options).await?;

        if options.dry_run {
            info!(selected = plan.candidates.len(), "dry run: skipping detail fetches");
            return Ok(SyncRunSummary {
                run_id: None,
                search_url: plan.search_url,
                started_at,
                finished_at: Utc::now(),
                found: plan.found,
                unique: plan.unique,
                selected: plan.candidates.len(),
                upserted: 0,
                failures: Vec::new(),
                dry_run: true,
            });
        }

        let store = self
            .store
            .as_deref()
            .ok_or(SyncError::Config(ConfigError::MissingDatabaseUrl))?;

        let run = SearchRun::begin(
            plan.search_url.clone(),
            options.query.recorded_zip(),
            options.query.breed.clone(),
            options.query.animal_type.clone(),
            started_at,
        );
        let mut tracker = RunTracker::start(store, run).await?;

        for candidate in &plan.candidates {
            if let Err(err) = self.process_candidate(&mut tracker, candidate).await {
                error!(
                    animal_id = %candidate.animal_id,
                    client_id = %candidate.client_id,
                    stage = err.stage(),
                    error = %err,
                    "failed to process candidate"
                );
                tracker.record_failure(CandidateFailure {
                    animal_id: candidate.animal_id.clone(),
                    client_id: candidate.client_id.clone(),
                    stage: err.stage(),
                    error: err.to_string(),
                });
            }
            pause(options.delay).await;
        }

        let report = tracker.complete().await?;
        info!(upserted = report.upserted.len(), "sync finished");

        Ok(SyncRunSummary {
            run_id: Some(report.run_id),
            search_url: plan.search_url,
            started_at,
            finished_at: report.completed_at,
            found: plan.found,
            unique: plan.unique,
            selected: plan.candidates.len(),
            upserted: report.upserted.len(),
            failures: report.failures,
            dry_run: false,
        })
    }

    async fn process_candidate(
        &self,
        tracker: &mut RunTracker<'_>,
        candidate: &SearchCandidate,
    ) -> Result<String, CandidateError> {
        let payload = self
            .source
            .fetch_detail(candidate)
            .await
            .map_err(CandidateError::Fetch)?;
        let listing = self
            .source
            .normalize(&payload, candidate, Utc::now())
            .map_err(CandidateError::Normalize)?;
        tracker.persist(listing).await.map_err(CandidateError::Persist)
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

pub fn build_source(config: &SyncConfig) -> Result<PetPlaceAdapter> {
    let http = HttpFetcher::new(HttpClientConfig {
        timeout: config.http_timeout_secs.map(Duration::from_secs),
        user_agent: Some(config.user_agent.clone()),
        global_concurrency: config.search_concurrency,
    })?;
    PetPlaceAdapter::new(http, PetPlaceEndpoints::default()).context("configuring PetPlace source")
}

/// One full sync from a resolved config. Dry runs never touch the database.
pub async fn run_sync_once(config: &SyncConfig) -> Result<SyncRunSummary> {
    config.validate()?;
    let source = Arc::new(build_source(config)?);
    let pipeline = SyncPipeline::new(source);
    let options = config.run_options();

    if config.dry_run {
        return Ok(pipeline.run_once(&options).await?);
    }

    let database_url = config.require_database_url()?;
    let store = PgStore::connect(database_url)
        .await
        .context("connecting to database")?;
    store.migrate().await.context("applying migrations")?;
    let store = Arc::new(store);

    let result = pipeline
        .with_store(store.clone())
        .run_once(&options)
        .await;
    store.close().await;
    Ok(result?)
}

pub async fn build_scheduler(config: SyncConfig) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let cron = config.sync_cron.clone();
    let config = Arc::new(config);
    let job = Job::new_async(cron.as_str(), move |_uuid, _l| {
        let config = Arc::clone(&config);
        Box::pin(async move {
            match run_sync_once(&config).await {
                Ok(summary) => info!(
                    run_id = summary.run_id.as_deref().unwrap_or("-"),
                    upserted = summary.upserted,
                    failed = summary.failures.len(),
                    "scheduled sync finished"
                ),
                Err(err) => error!(error = %format!("{err:#}"), "scheduled sync failed"),
            }
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))?;
    sched.add(job).await.context("adding scheduler job")?;
    Ok(sched)
}
