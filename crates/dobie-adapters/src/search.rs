//! Search URL construction and candidate extraction (HTML and JSON paths).

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;
use serde_json::{json, Value as JsonValue};

use crate::fields::to_string_or_null;
use crate::{AdapterError, SearchCandidate, SearchQuery};

static LISTING_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/pet-adoption/dogs/([A-Za-z0-9]+)/([A-Za-z0-9_-]+)").expect("listing path regex")
});

pub fn parse_url(raw: &str) -> Result<Url, AdapterError> {
    Url::parse(raw).map_err(|e| AdapterError::InvalidUrl {
        url: raw.to_string(),
        message: e.to_string(),
    })
}

/// The override wins verbatim; otherwise `/pet-adoption/search` on `base`.
pub fn build_search_url(query: &SearchQuery, default_base: &str) -> Result<Url, AdapterError> {
    if let Some(url) = query.search_url.as_deref().filter(|u| !u.is_empty()) {
        return parse_url(url);
    }
    let base = query
        .target_url
        .as_deref()
        .filter(|u| !u.is_empty())
        .unwrap_or(default_base);
    let mut url = parse_url(base)?.join("/pet-adoption/search").map_err(|e| {
        AdapterError::InvalidUrl {
            url: base.to_string(),
            message: e.to_string(),
        }
    })?;
    url.query_pairs_mut()
        .append_pair("milesRadius", &query.radius)
        .append_pair("filterGender", "")
        .append_pair("filterAge", "")
        .append_pair("filterAnimalType", &query.animal_type)
        .append_pair("filterBreed", &query.breed)
        .append_pair("filterShelter", "")
        .append_pair("zipPostal", &query.zip)
        .append_pair("filterSize", "");
    Ok(url)
}

/// True when `url` already targets the structured search API.
pub fn is_api_search_url(url: &Url, api_base: &Url) -> bool {
    url.host_str() == api_base.host_str() && url.path().starts_with("/animal")
}

fn listing_url(base: &Url, animal_id: &str, client_id: &str) -> String {
    let path = format!("/pet-adoption/dogs/{animal_id}/{client_id}");
    base.join(&path)
        .map(|u| u.to_string())
        .unwrap_or(path)
}

/// Best-effort scan of a search page for listing links; first occurrence wins.
pub fn extract_html_candidates(html: &str, base: &Url) -> Vec<SearchCandidate> {
    let mut seen = HashSet::new();
    LISTING_PATH_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let animal_id = caps.get(1)?.as_str().to_string();
            let client_id = caps.get(2)?.as_str().to_string();
            if !seen.insert((animal_id.clone(), client_id.clone())) {
                return None;
            }
            Some(SearchCandidate {
                detail_url: listing_url(base, &animal_id, &client_id),
                animal_id,
                client_id,
                summary: None,
            })
        })
        .collect()
}

/// Reads the `animal` array; entries without both ids are skipped.
pub fn extract_api_candidates(payload: &JsonValue, base: &Url) -> Vec<SearchCandidate> {
    let Some(animals) = payload.get("animal").and_then(JsonValue::as_array) else {
        return Vec::new();
    };
    animals
        .iter()
        .filter(|item| item.is_object())
        .filter_map(|item| {
            let animal_id = item
                .get("animalId")
                .and_then(to_string_or_null)
                .filter(|s| !s.is_empty())?;
            let client_id = item
                .get("clientId")
                .and_then(to_string_or_null)
                .filter(|s| !s.is_empty())?;
            Some(SearchCandidate {
                detail_url: listing_url(base, &animal_id, &client_id),
                animal_id,
                client_id,
                summary: Some(item.clone()),
            })
        })
        .collect()
}

/// POST body for the structured search API.
pub fn api_search_body(query: &SearchQuery, zip: &str) -> JsonValue {
    json!({
        "locationInformation": {
            "clientId": null,
            "zipPostal": zip,
            "milesRadius": query.radius,
        },
        "animalFilters": {
            "startIndex": query.start_index,
            "filterAnimalType": query.animal_type,
            "filterBreed": [query.breed],
            "filterGender": "",
            "filterAge": null,
            "filterSize": null,
        }
    })
}
