//! PetPlace: HTML search with structured-API fallback, JSON detail endpoint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dobie_core::NormalizedListing;
use dobie_storage::HttpFetcher;
use futures_util::stream::{self, StreamExt};
use reqwest::Url;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::mapper::RecordMapper;
use crate::search::{
    api_search_body, build_search_url, extract_api_candidates, extract_html_candidates,
    is_api_search_url, parse_url,
};
use crate::{AdapterError, ListingSource, SearchCandidate, SearchOutcome, SearchQuery};

pub const PETPLACE_SOURCE: &str = "petplace";

const HTML_ACCEPT: &str = "text/html,application/xhtml+xml";
const JSON_ACCEPT: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PetPlaceEndpoints {
    pub site_base: String,
    pub api_base: String,
}

impl Default for PetPlaceEndpoints {
    fn default() -> Self {
        Self {
            site_base: "https://www.petplace.com".to_string(),
            api_base: "https://api.petplace.com".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PetPlaceAdapter {
    http: HttpFetcher,
    site: Url,
    api: Url,
    mapper: RecordMapper,
}

impl PetPlaceAdapter {
    pub fn new(http: HttpFetcher, endpoints: PetPlaceEndpoints) -> Result<Self, AdapterError> {
        let site = parse_url(&endpoints.site_base)?;
        let api = parse_url(&endpoints.api_base)?;
        let mapper = RecordMapper::new(PETPLACE_SOURCE, &endpoints.site_base, &endpoints.api_base);
        Ok(Self {
            http,
            site,
            api,
            mapper,
        })
    }

    pub fn mapper(&self) -> &RecordMapper {
        &self.mapper
    }

    fn api_search_url(&self) -> String {
        format!("{}/animal", self.api.as_str().trim_end_matches('/'))
    }

    fn browser_headers(&self) -> Vec<(&'static str, String)> {
        let origin = self.site.as_str().trim_end_matches('/').to_string();
        vec![("Origin", origin.clone()), ("Referer", format!("{origin}/"))]
    }

    async fn search_api(
        &self,
        query: &SearchQuery,
        zip: &str,
    ) -> Result<Vec<SearchCandidate>, AdapterError> {
        let body = api_search_body(query, zip);
        let resp = self
            .http
            .post_json(&self.api_search_url(), &body, &self.browser_headers())
            .await?;
        let payload: JsonValue = resp.json()?;
        let found = extract_api_candidates(&payload, &self.site);
        info!(zip, count = found.len(), "structured search");
        Ok(found)
    }

    /// One API search per zip, issued together and flattened in zip order.
    async fn search_zips(&self, query: &SearchQuery) -> Result<SearchOutcome, AdapterError> {
        let searches: Vec<_> = query
            .zips
            .iter()
            .map(|zip| self.search_api(query, zip))
            .collect();
        let results: Vec<_> = stream::iter(searches)
            .buffered(query.zips.len().max(1))
            .collect()
            .await;
        let mut candidates = Vec::new();
        for result in results {
            candidates.extend(result?);
        }
        Ok(SearchOutcome {
            search_url: self.api_search_url(),
            candidates,
        })
    }
}

#[async_trait]
impl ListingSource for PetPlaceAdapter {
    fn source_name(&self) -> &'static str {
        PETPLACE_SOURCE
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchOutcome, AdapterError> {
        if !query.zips.is_empty() {
            return self.search_zips(query).await;
        }

        let url = build_search_url(query, self.site.as_str())?;
        let search_url = url.to_string();

        if is_api_search_url(&url, &self.api) {
            let resp = self.http.get(&search_url, JSON_ACCEPT).await?;
            let payload: JsonValue = resp.json()?;
            return Ok(SearchOutcome {
                candidates: extract_api_candidates(&payload, &url),
                search_url,
            });
        }

        let resp = self.http.get(&search_url, HTML_ACCEPT).await?;
        let mut candidates = extract_html_candidates(&resp.text(), &url);
        if candidates.is_empty() {
            warn!(url = %search_url, "no listing links in search page, falling back to search API");
            candidates = self.search_api(query, &query.zip).await?;
        }
        Ok(SearchOutcome {
            search_url,
            candidates,
        })
    }

    async fn fetch_detail(&self, candidate: &SearchCandidate) -> Result<JsonValue, AdapterError> {
        let url = self
            .mapper
            .detail_api_url(&candidate.animal_id, &candidate.client_id);
        let resp = self.http.get(&url, JSON_ACCEPT).await?;
        Ok(resp.json()?)
    }

    fn normalize(
        &self,
        payload: &JsonValue,
        candidate: &SearchCandidate,
        ingested_at: DateTime<Utc>,
    ) -> Result<NormalizedListing, AdapterError> {
        Ok(self.mapper.normalize(payload, Some(candidate), ingested_at)?)
    }
}
