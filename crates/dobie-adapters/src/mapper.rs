//! Detail payload (+ optional search summary) to Dog, Shelter and Photos.

use chrono::{DateTime, Utc};
use dobie_core::{dog_id, photo_id, shelter_id, Dog, DogFilters, NormalizedListing, Photo, Shelter};
use serde_json::{json, Value as JsonValue};
use thiserror::Error;

use crate::fields::{display_name, infer_status, parse_date, parse_weight, parse_website_url};
use crate::payload::{DetailPayload, SearchSummary};
use crate::SearchCandidate;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapError {
    #[error("detail payload is not a JSON object")]
    NotAnObject,
    #[error("detail payload carries no animal/client id")]
    MissingNaturalKey,
}

#[derive(Debug, Clone)]
pub struct RecordMapper {
    source: String,
    site_base: String,
    api_base: String,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn dedup_preserving_order(urls: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(urls.len());
    for url in urls {
        if !out.contains(&url) {
            out.push(url);
        }
    }
    out
}

impl RecordMapper {
    pub fn new(
        source: impl Into<String>,
        site_base: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            site_base: site_base.into().trim_end_matches('/').to_string(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn listing_url(&self, animal_id: &str, client_id: &str) -> String {
        format!("{}/pet-adoption/dogs/{animal_id}/{client_id}", self.site_base)
    }

    pub fn detail_api_url(&self, animal_id: &str, client_id: &str) -> String {
        format!("{}/animal/{animal_id}/client/{client_id}", self.api_base)
    }

    /// The natural key comes from the payload itself; the candidate's ids are
    /// used only when the payload omits them.
    pub fn normalize(
        &self,
        payload: &JsonValue,
        candidate: Option<&SearchCandidate>,
        ingested_at: DateTime<Utc>,
    ) -> Result<NormalizedListing, MapError> {
        if !payload.is_object() {
            return Err(MapError::NotAnObject);
        }
        let decoded = DetailPayload::from_value(payload);
        let pp = &decoded.required;
        let detail = &decoded.detail;
        let raw_summary = candidate.and_then(|c| c.summary.as_ref());
        let summary = raw_summary.map(SearchSummary::from_value).unwrap_or_default();

        let animal_id = present(pp.animal_id.clone())
            .or_else(|| candidate.map(|c| c.animal_id.clone()))
            .filter(|id| !id.is_empty())
            .ok_or(MapError::MissingNaturalKey)?;
        let client_id = present(pp.client_id.clone())
            .or_else(|| candidate.map(|c| c.client_id.clone()))
            .filter(|id| !id.is_empty())
            .ok_or(MapError::MissingNaturalKey)?;

        let shelter_id = shelter_id(&self.source, &client_id);
        let dog_id = dog_id(&self.source, &animal_id, &client_id);

        let shelter = Shelter {
            id: shelter_id.clone(),
            source: self.source.clone(),
            client_id: client_id.clone(),
            name: pp.shelter_name.clone().unwrap_or_default(),
            address_line1: pp.shelter_address.clone(),
            city: pp.city.clone(),
            state: pp.state.clone(),
            zip: pp.zip.clone(),
            phone: present(pp.phone_number.clone()).or_else(|| pp.pet_location_phone.clone()),
            email: pp.email.clone(),
            website_url: parse_website_url(pp.website.as_deref()),
            location_label: pp.pet_location.clone(),
            location_address_html: pp.pet_location_address.clone(),
            ingested_at,
        };

        let detail_urls = dedup_preserving_order(decoded.image_urls.clone());
        let mut urls = Vec::with_capacity(detail_urls.len() + 1);
        if let Some(cover) = present(summary.cover_image_path.clone()) {
            if !detail_urls.contains(&cover) {
                urls.push(cover);
            }
        }
        urls.extend(detail_urls);

        let photos = urls
            .iter()
            .enumerate()
            .map(|(index, url)| Photo {
                id: photo_id(&dog_id, url),
                dog_id: dog_id.clone(),
                url: url.clone(),
                is_primary: index == 0,
                position: index as i32,
                source: self.source.clone(),
                ingested_at,
            })
            .collect::<Vec<_>>();

        let breed1 = summary.breed1.clone().or_else(|| pp.primary_breed.clone());
        let breed2 = summary.breed2.clone().or_else(|| pp.secondary_breed.clone());
        let breed_display = summary.breed_display.clone().or_else(|| {
            pp.primary_breed.as_ref().map(|primary| match &pp.secondary_breed {
                Some(secondary) if !secondary.is_empty() => format!("{primary} / {secondary}"),
                _ => primary.clone(),
            })
        });

        let raw_payload = match raw_summary {
            Some(search_result) => json!({ "detail": payload, "search_result": search_result }),
            None => payload.clone(),
        };

        let dog = Dog {
            id: dog_id,
            source: self.source.clone(),
            listing_url: self.listing_url(&animal_id, &client_id),
            source_api_url: self.detail_api_url(&animal_id, &client_id),
            source_animal_id: animal_id,
            client_id,
            name: display_name(pp.pet_name.as_deref()),
            full_name: pp.pet_name.clone(),
            animal_type: pp.animal_type.clone().unwrap_or_else(|| "Dog".to_string()),
            primary_breed: pp.primary_breed.clone(),
            secondary_breed: pp.secondary_breed.clone(),
            breed1,
            breed2,
            breed_display,
            age: pp.age.clone(),
            age_display: summary.age_display.clone().or_else(|| pp.age.clone()),
            gender: pp.gender.clone(),
            size_category: pp.size_category.clone(),
            description_html: pp.description.clone(),
            bio_html: detail.bio.clone(),
            more_info_html: detail.more_info.clone(),
            placement_info: detail.placement_info.clone(),
            weight_lbs: parse_weight(detail.weight.as_deref()),
            status: infer_status(detail.more_info.as_deref()),
            shelter_id,
            cover_image_url: photos.first().map(|p| p.url.clone()),
            located_at: summary.located_at.clone().or_else(|| pp.pet_location.clone()),
            brought_to_shelter: summary.brought_to_shelter.clone(),
            city: summary.city.clone().or_else(|| shelter.city.clone()),
            state: summary.state.clone().or_else(|| shelter.state.clone()),
            lat: summary.lat,
            lon: summary.lon,
            filter_breed_group: summary.filter_breed_group.clone(),
            client_sort: summary.client_sort,
            data_updated_note: detail.data_updated.clone(),
            filters: DogFilters {
                filter_age: pp.filter_age.clone(),
                filter_gender: pp.filter_gender.clone(),
                filter_size: pp.filter_size.clone(),
                filter_dob: parse_date(pp.filter_dob.as_deref()),
                filter_days_out: pp.filter_days_out,
                filter_primary_breed: pp.filter_primary_breed.clone(),
            },
            ingested_at,
            source_updated_at: None,
            raw_payload,
        };

        Ok(NormalizedListing {
            dog,
            shelter,
            photos,
        })
    }
}
