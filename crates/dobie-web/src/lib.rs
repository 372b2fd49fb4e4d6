//! Read-only JSON API over stored dog listings.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use dobie_core::DogView;
use dobie_storage::{DogCatalog, DogQuery, PgStore, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info};

pub const CRATE_NAME: &str = "dobie-web";

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 200;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn DogCatalog>,
    /// `None` makes every guarded route answer 500.
    pub api_key: Option<String>,
}

impl AppState {
    pub fn new(catalog: Arc<dyn DogCatalog>, api_key: Option<String>) -> Self {
        Self { catalog, api_key }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebConfig {
    pub port: u16,
    pub api_key: Option<String>,
    pub database_url: Option<String>,
}

impl WebConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        Self {
            port: get("PORT").and_then(|v| v.parse().ok()).unwrap_or(3000),
            api_key: get("API_KEY"),
            database_url: ["DATABASE_URL", "POSTGRES_URL", "POSTGRES_URL_NON_POOLING"]
                .into_iter()
                .find_map(get),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    q: Option<String>,
    breed: Option<String>,
    age: Option<String>,
    gender: Option<String>,
    size: Option<String>,
    status: Option<String>,
    client_id: Option<String>,
    source_animal_id: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
    view: Option<String>,
}

fn given(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl ListParams {
    fn into_query(self) -> DogQuery {
        DogQuery {
            limit: parse_limit(self.limit.as_deref(), DEFAULT_LIMIT),
            offset: parse_offset(self.offset.as_deref()),
            q: given(self.q),
            breed: given(self.breed),
            age: given(self.age),
            gender: given(self.gender),
            size: given(self.size),
            status: given(self.status),
            client_id: given(self.client_id),
            source_animal_id: given(self.source_animal_id),
        }
    }
}

/// Positive numbers are capped at [`MAX_LIMIT`]; anything else is `fallback`.
pub fn parse_limit(value: Option<&str>, fallback: i64) -> i64 {
    let Some(parsed) = value.and_then(|v| v.trim().parse::<f64>().ok()) else {
        return fallback;
    };
    if !parsed.is_finite() || parsed <= 0.0 {
        return fallback;
    }
    let limit = parsed.min(MAX_LIMIT as f64).trunc() as i64;
    if limit > 0 {
        limit
    } else {
        fallback
    }
}

/// Same clamp as [`parse_limit`] with a fallback of 0.
pub fn parse_offset(value: Option<&str>) -> i64 {
    parse_limit(value, 0)
}

#[derive(Debug, Serialize)]
struct ListResponse<T> {
    count: usize,
    dogs: Vec<T>,
}

#[derive(Debug, Serialize)]
struct ShelterSummary {
    name: String,
    city: Option<String>,
    state: Option<String>,
}

/// Compact projection for `view=summary`.
#[derive(Debug, Serialize)]
struct DogSummary {
    id: String,
    name: String,
    breed_primary: Option<String>,
    age: Option<String>,
    gender: Option<String>,
    size_category: Option<String>,
    status: Option<String>,
    cover_image_url: Option<String>,
    listing_url: String,
    source_animal_id: String,
    client_id: String,
    shelter: Option<ShelterSummary>,
}

impl From<DogView> for DogSummary {
    fn from(dog: DogView) -> Self {
        Self {
            id: dog.id,
            name: dog.name,
            breed_primary: dog.primary_breed,
            age: dog.age,
            gender: dog.gender,
            size_category: dog.size_category,
            status: dog.status,
            cover_image_url: dog.cover_image_url,
            listing_url: dog.listing_url,
            source_animal_id: dog.source_animal_id,
            client_id: dog.client_id,
            shelter: dog.shelter.map(|s| ShelterSummary {
                name: s.name,
                city: s.city,
                state: s.state,
            }),
        }
    }
}

pub fn app(state: AppState) -> Router {
    let state = Arc::new(state);
    Router::new()
        .route("/health", get(health_handler))
        .route("/dogs", get(list_dogs_handler))
        .route("/dogs/{id}", get(get_dog_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state)
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    serve(WebConfig::from_env()).await
}

pub async fn serve(config: WebConfig) -> anyhow::Result<()> {
    let api_key = config
        .api_key
        .ok_or_else(|| anyhow::anyhow!("API_KEY is required to serve the API"))?;
    let database_url = config
        .database_url
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required to serve the API"))?;

    let store = Arc::new(PgStore::connect(&database_url).await?);
    let state = AppState::new(store.clone(), Some(api_key));
    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(port = config.port, "serving read API");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    store.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for ctrl-c");
    }
}

fn provided_key(headers: &HeaderMap) -> Option<String> {
    if let Some(key) = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return Some(key.to_string());
    }
    let auth = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let scheme = auth.get(..6)?;
    let rest = auth.get(6..)?;
    if !scheme.eq_ignore_ascii_case("bearer") || !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim_start().to_string()).filter(|token| !token.is_empty())
}

async fn require_api_key(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    if req.uri().path() == "/health" {
        return next.run(req).await;
    }
    let Some(expected) = state.api_key.as_deref() else {
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "API_KEY not configured");
    };
    match provided_key(req.headers()) {
        Some(key) if key == expected => next.run(req).await,
        _ => json_error(StatusCode::UNAUTHORIZED, "Unauthorized"),
    }
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn list_dogs_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Response {
    let summary = params.view.as_deref() == Some("summary");
    let query = params.into_query();
    let dogs = match state.catalog.list_dogs(&query).await {
        Ok(dogs) => dogs,
        Err(err) => return store_error(err),
    };

    if summary {
        let dogs = dogs.into_iter().map(DogSummary::from).collect::<Vec<_>>();
        Json(ListResponse {
            count: dogs.len(),
            dogs,
        })
        .into_response()
    } else {
        Json(ListResponse {
            count: dogs.len(),
            dogs,
        })
        .into_response()
    }
}

async fn get_dog_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.catalog.get_dog(&id).await {
        Ok(Some(dog)) => Json(dog).into_response(),
        Ok(None) => json_error(StatusCode::NOT_FOUND, "Not found"),
        Err(err) => store_error(err),
    }
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn store_error(err: StoreError) -> Response {
    error!(error = %err, "catalog query failed");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
}
