//! Core domain model for the dobie adoption-listing collector.

pub mod identity;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub use identity::{composite_id, dog_id, hash_id, photo_id, search_run_id, shelter_id};

pub const CRATE_NAME: &str = "dobie-core";

/// Status literal emitted when the listing text advertises the animal as adoptable.
pub const STATUS_AVAILABLE: &str = "available";

/// Mirror of the upstream site's own search-filter vocabulary.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DogFilters {
    pub filter_age: Option<String>,
    pub filter_gender: Option<String>,
    pub filter_size: Option<String>,
    /// Calendar date, `YYYY-MM-DD`.
    pub filter_dob: Option<String>,
    pub filter_days_out: Option<i32>,
    pub filter_primary_breed: Option<String>,
}

/// One adoptable animal listing, keyed by `(source, source_animal_id, client_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dog {
    pub id: String,
    pub source: String,
    pub source_animal_id: String,
    pub client_id: String,
    pub name: String,
    pub full_name: Option<String>,
    pub animal_type: String,
    pub primary_breed: Option<String>,
    pub secondary_breed: Option<String>,
    pub breed1: Option<String>,
    pub breed2: Option<String>,
    pub breed_display: Option<String>,
    pub age: Option<String>,
    pub age_display: Option<String>,
    pub gender: Option<String>,
    pub size_category: Option<String>,
    pub description_html: Option<String>,
    pub bio_html: Option<String>,
    pub more_info_html: Option<String>,
    pub placement_info: Option<String>,
    pub weight_lbs: Option<f64>,
    pub status: Option<String>,
    pub shelter_id: String,
    pub cover_image_url: Option<String>,
    pub located_at: Option<String>,
    pub brought_to_shelter: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub filter_breed_group: Option<String>,
    pub client_sort: Option<i64>,
    pub listing_url: String,
    pub source_api_url: String,
    pub data_updated_note: Option<String>,
    pub filters: DogFilters,
    pub ingested_at: DateTime<Utc>,
    /// Never populated by the current source; kept for schema stability.
    pub source_updated_at: Option<DateTime<Utc>>,
    pub raw_payload: JsonValue,
}

/// The organization holding an animal, keyed by `(source, client_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shelter {
    pub id: String,
    pub source: String,
    pub client_id: String,
    pub name: String,
    pub address_line1: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website_url: Option<String>,
    pub location_label: Option<String>,
    pub location_address_html: Option<String>,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: String,
    pub dog_id: String,
    pub url: String,
    pub is_primary: bool,
    pub position: i32,
    pub source: String,
    pub ingested_at: DateTime<Utc>,
}

/// Mapper output: the three entities produced from one detail payload.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedListing {
    pub dog: Dog,
    pub shelter: Shelter,
    pub photos: Vec<Photo>,
}

/// One collector execution with a given parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRun {
    pub id: String,
    pub zip_postal: String,
    pub breed: String,
    pub animal_type: String,
    pub search_url: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SearchRun {
    pub fn begin(
        search_url: impl Into<String>,
        zip_postal: impl Into<String>,
        breed: impl Into<String>,
        animal_type: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let search_url = search_url.into();
        Self {
            id: search_run_id(&search_url, started_at),
            zip_postal: zip_postal.into(),
            breed: breed.into(),
            animal_type: animal_type.into(),
            search_url,
            started_at,
            completed_at: None,
        }
    }
}

/// Join row between a run and every animal it processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultLink {
    pub search_run_id: String,
    pub dog_id: String,
    pub source_animal_id: String,
    pub client_id: String,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShelterView {
    pub name: String,
    pub address_line1: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website_url: Option<String>,
    pub location_label: Option<String>,
    pub location_address_html: Option<String>,
}

impl From<&Shelter> for ShelterView {
    fn from(shelter: &Shelter) -> Self {
        Self {
            name: shelter.name.clone(),
            address_line1: shelter.address_line1.clone(),
            city: shelter.city.clone(),
            state: shelter.state.clone(),
            zip: shelter.zip.clone(),
            phone: shelter.phone.clone(),
            email: shelter.email.clone(),
            website_url: shelter.website_url.clone(),
            location_label: shelter.location_label.clone(),
            location_address_html: shelter.location_address_html.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoView {
    pub url: String,
    pub is_primary: bool,
    pub position: i32,
}

/// Read-side projection served by the HTTP API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DogView {
    pub id: String,
    pub source: String,
    pub source_animal_id: String,
    pub client_id: String,
    pub name: String,
    pub full_name: Option<String>,
    pub animal_type: String,
    pub primary_breed: Option<String>,
    pub secondary_breed: Option<String>,
    pub breed1: Option<String>,
    pub breed2: Option<String>,
    pub breed_display: Option<String>,
    pub age: Option<String>,
    pub age_display: Option<String>,
    pub gender: Option<String>,
    pub size_category: Option<String>,
    pub description_html: Option<String>,
    pub bio_html: Option<String>,
    pub more_info_html: Option<String>,
    pub placement_info: Option<String>,
    pub weight_lbs: Option<f64>,
    pub status: Option<String>,
    pub cover_image_url: Option<String>,
    pub located_at: Option<String>,
    pub brought_to_shelter: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub filter_breed_group: Option<String>,
    pub client_sort: Option<i64>,
    pub listing_url: String,
    pub source_api_url: String,
    pub data_updated_note: Option<String>,
    pub filters: DogFilters,
    pub shelter: Option<ShelterView>,
    pub photos: Vec<PhotoView>,
    pub raw_payload: JsonValue,
    pub ingested_at: DateTime<Utc>,
    pub source_updated_at: Option<DateTime<Utc>>,
}

impl DogView {
    /// Photos are emitted in `position` order regardless of input order.
    pub fn assemble(dog: Dog, shelter: Option<&Shelter>, photos: &[Photo]) -> Self {
        let mut photos = photos
            .iter()
            .map(|p| PhotoView {
                url: p.url.clone(),
                is_primary: p.is_primary,
                position: p.position,
            })
            .collect::<Vec<_>>();
        photos.sort_by_key(|p| p.position);

        Self {
            id: dog.id,
            source: dog.source,
            source_animal_id: dog.source_animal_id,
            client_id: dog.client_id,
            name: dog.name,
            full_name: dog.full_name,
            animal_type: dog.animal_type,
            primary_breed: dog.primary_breed,
            secondary_breed: dog.secondary_breed,
            breed1: dog.breed1,
            breed2: dog.breed2,
            breed_display: dog.breed_display,
            age: dog.age,
            age_display: dog.age_display,
            gender: dog.gender,
            size_category: dog.size_category,
            description_html: dog.description_html,
            bio_html: dog.bio_html,
            more_info_html: dog.more_info_html,
            placement_info: dog.placement_info,
            weight_lbs: dog.weight_lbs,
            status: dog.status,
            cover_image_url: dog.cover_image_url,
            located_at: dog.located_at,
            brought_to_shelter: dog.brought_to_shelter,
            city: dog.city,
            state: dog.state,
            lat: dog.lat,
            lon: dog.lon,
            filter_breed_group: dog.filter_breed_group,
            client_sort: dog.client_sort,
            listing_url: dog.listing_url,
            source_api_url: dog.source_api_url,
            data_updated_note: dog.data_updated_note,
            filters: dog.filters,
            shelter: shelter.map(ShelterView::from),
            photos,
            raw_payload: dog.raw_payload,
            ingested_at: dog.ingested_at,
            source_updated_at: dog.source_updated_at,
        }
    }
}
