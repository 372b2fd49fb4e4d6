//! Typed views over the upstream detail payload and search summary.
//!
//! The upstream dictionaries are keyed by human-readable names and carry
//! whatever JSON type the site happened to emit. Every known key decodes
//! loosely into an optional value; unknown keys are ignored and a missing or
//! malformed section decodes to its default.

use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;

use crate::fields::to_string_or_null;

fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = JsonValue::deserialize(deserializer)?;
    Ok(to_string_or_null(&value))
}

/// Like [`loose_string`], but a numeric zero or `false` counts as absent.
fn loose_truthy_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = JsonValue::deserialize(deserializer)?;
    Ok(match &value {
        JsonValue::Bool(false) => None,
        JsonValue::Number(n) if n.as_f64() == Some(0.0) => None,
        other => to_string_or_null(other),
    })
}

fn loose_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = JsonValue::deserialize(deserializer)?;
    Ok(match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

fn loose_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(loose_f64(deserializer)?
        .filter(|n| n.is_finite())
        .map(|n| n.trunc() as i64))
}

fn loose_i32<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(loose_i64(deserializer)?.and_then(|n| i32::try_from(n).ok()))
}

fn loose_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = JsonValue::deserialize(deserializer)?;
    Ok(match value {
        JsonValue::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                JsonValue::String(s) if !s.is_empty() => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

fn decode_or_default<T>(value: Option<&JsonValue>) -> T
where
    T: for<'de> Deserialize<'de> + Default,
{
    match value {
        Some(v @ JsonValue::Object(_)) => T::deserialize(v).unwrap_or_default(),
        _ => T::default(),
    }
}

/// `ppRequired[0]`: identity, breed, shelter and filter fields.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RequiredFields {
    #[serde(rename = "AnimalId", default, deserialize_with = "loose_string")]
    pub animal_id: Option<String>,
    #[serde(rename = "ClientId", default, deserialize_with = "loose_string")]
    pub client_id: Option<String>,
    #[serde(rename = "Pet Name", default, deserialize_with = "loose_string")]
    pub pet_name: Option<String>,
    #[serde(rename = "Animal Type", default, deserialize_with = "loose_string")]
    pub animal_type: Option<String>,
    #[serde(rename = "Primary Breed", default, deserialize_with = "loose_string")]
    pub primary_breed: Option<String>,
    #[serde(rename = "Secondary Breed", default, deserialize_with = "loose_string")]
    pub secondary_breed: Option<String>,
    #[serde(rename = "Age", default, deserialize_with = "loose_string")]
    pub age: Option<String>,
    #[serde(rename = "Gender", default, deserialize_with = "loose_string")]
    pub gender: Option<String>,
    #[serde(rename = "Size Category", default, deserialize_with = "loose_string")]
    pub size_category: Option<String>,
    #[serde(rename = "Description", default, deserialize_with = "loose_string")]
    pub description: Option<String>,
    #[serde(rename = "Shelter Name", default, deserialize_with = "loose_string")]
    pub shelter_name: Option<String>,
    #[serde(rename = "Shelter Address", default, deserialize_with = "loose_string")]
    pub shelter_address: Option<String>,
    #[serde(rename = "City", default, deserialize_with = "loose_string")]
    pub city: Option<String>,
    #[serde(rename = "State", default, deserialize_with = "loose_string")]
    pub state: Option<String>,
    #[serde(rename = "Zip", default, deserialize_with = "loose_string")]
    pub zip: Option<String>,
    #[serde(rename = "Phone Number", default, deserialize_with = "loose_string")]
    pub phone_number: Option<String>,
    #[serde(rename = "Pet Location Phone", default, deserialize_with = "loose_string")]
    pub pet_location_phone: Option<String>,
    #[serde(rename = "Email", default, deserialize_with = "loose_string")]
    pub email: Option<String>,
    #[serde(rename = "Website", default, deserialize_with = "loose_string")]
    pub website: Option<String>,
    #[serde(rename = "Pet Location", default, deserialize_with = "loose_string")]
    pub pet_location: Option<String>,
    #[serde(rename = "Pet Location Address", default, deserialize_with = "loose_string")]
    pub pet_location_address: Option<String>,
    #[serde(rename = "filterAge", default, deserialize_with = "loose_string")]
    pub filter_age: Option<String>,
    #[serde(rename = "filterGender", default, deserialize_with = "loose_string")]
    pub filter_gender: Option<String>,
    #[serde(rename = "filterSize", default, deserialize_with = "loose_string")]
    pub filter_size: Option<String>,
    #[serde(rename = "filterDOB", default, deserialize_with = "loose_string")]
    pub filter_dob: Option<String>,
    #[serde(rename = "filterDaysOut", default, deserialize_with = "loose_i32")]
    pub filter_days_out: Option<i32>,
    #[serde(rename = "filterPrimaryBreed", default, deserialize_with = "loose_string")]
    pub filter_primary_breed: Option<String>,
}

/// `animalDetail[0]`: long-form text and weight.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DetailFields {
    #[serde(rename = "Bio", default, deserialize_with = "loose_string")]
    pub bio: Option<String>,
    #[serde(rename = "More Info", default, deserialize_with = "loose_string")]
    pub more_info: Option<String>,
    #[serde(rename = "Placement Info", default, deserialize_with = "loose_string")]
    pub placement_info: Option<String>,
    #[serde(rename = "Weight", default, deserialize_with = "loose_truthy_string")]
    pub weight: Option<String>,
    #[serde(rename = "Data Updated", default, deserialize_with = "loose_string")]
    pub data_updated: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
struct ImageList {
    #[serde(rename = "imageURL", default, deserialize_with = "loose_string_list")]
    image_urls: Vec<String>,
}

/// Decoded detail payload. Construction never fails.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailPayload {
    pub required: RequiredFields,
    pub detail: DetailFields,
    pub image_urls: Vec<String>,
}

impl DetailPayload {
    pub fn from_value(value: &JsonValue) -> Self {
        let first = |key: &str| value.get(key).and_then(|section| section.get(0));
        let images: ImageList = decode_or_default(Some(value));
        Self {
            required: decode_or_default(first("ppRequired")),
            detail: decode_or_default(first("animalDetail")),
            image_urls: images.image_urls,
        }
    }
}

/// One entry of the search API's `animal` array.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchSummary {
    #[serde(rename = "animalId", default, deserialize_with = "loose_string")]
    pub animal_id: Option<String>,
    #[serde(rename = "clientId", default, deserialize_with = "loose_string")]
    pub client_id: Option<String>,
    #[serde(rename = "coverImagePath", default, deserialize_with = "loose_string")]
    pub cover_image_path: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub breed1: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub breed2: Option<String>,
    #[serde(rename = "breedDisplay", default, deserialize_with = "loose_string")]
    pub breed_display: Option<String>,
    #[serde(rename = "ageDisplay", default, deserialize_with = "loose_string")]
    pub age_display: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "loose_f64")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "loose_f64")]
    pub lon: Option<f64>,
    #[serde(rename = "locatedAt", default, deserialize_with = "loose_string")]
    pub located_at: Option<String>,
    #[serde(rename = "broughtToShelter", default, deserialize_with = "loose_string")]
    pub brought_to_shelter: Option<String>,
    #[serde(rename = "filterBreedGroup", default, deserialize_with = "loose_string")]
    pub filter_breed_group: Option<String>,
    #[serde(rename = "clientSort", default, deserialize_with = "loose_i64")]
    pub client_sort: Option<i64>,
}

impl SearchSummary {
    pub fn from_value(value: &JsonValue) -> Self {
        decode_or_default(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_known_keys_and_ignores_the_rest() {
        let payload = json!({
            "ppRequired": [{
                "AnimalId": "A1042472",
                "ClientId": 77,
                "Pet Name": "Mindy (A1042472)",
                "filterDaysOut": "12",
                "Unrecognized": {"nested": true}
            }],
            "animalDetail": [{ "Weight": 68, "More Info": null }],
            "imageURL": ["https://img/1.jpg", 5, "", "https://img/2.jpg"]
        });
        let decoded = DetailPayload::from_value(&payload);
        assert_eq!(decoded.required.animal_id.as_deref(), Some("A1042472"));
        assert_eq!(decoded.required.client_id.as_deref(), Some("77"));
        assert_eq!(decoded.required.filter_days_out, Some(12));
        assert_eq!(decoded.required.primary_breed, None);
        assert_eq!(decoded.detail.weight.as_deref(), Some("68"));
        assert_eq!(decoded.detail.more_info, None);
        assert_eq!(decoded.image_urls, vec!["https://img/1.jpg", "https://img/2.jpg"]);
    }

    #[test]
    fn missing_or_malformed_sections_decode_to_defaults() {
        let decoded = DetailPayload::from_value(&json!({
            "ppRequired": "oops",
            "animalDetail": [],
            "imageURL": "not-a-list"
        }));
        assert_eq!(decoded, DetailPayload::default());
        assert_eq!(DetailPayload::from_value(&json!(null)), DetailPayload::default());
    }

    #[test]
    fn summary_coerces_numbers_from_strings() {
        let summary = SearchSummary::from_value(&json!({
            "animalId": "A1",
            "clientId": "CCST",
            "lat": "37.75",
            "lon": -122.41,
            "clientSort": "3",
            "filterDaysOut": "ignored"
        }));
        assert_eq!(summary.lat, Some(37.75));
        assert_eq!(summary.lon, Some(-122.41));
        assert_eq!(summary.client_sort, Some(3));
        assert_eq!(summary.cover_image_path, None);
    }

    #[test]
    fn numeric_zero_weight_is_absent() {
        let zero = DetailPayload::from_value(&json!({ "animalDetail": [{ "Weight": 0 }] }));
        assert_eq!(zero.detail.weight, None);

        let numeric = DetailPayload::from_value(&json!({ "animalDetail": [{ "Weight": 42.5 }] }));
        assert_eq!(numeric.detail.weight.as_deref(), Some("42.5"));

        let text = DetailPayload::from_value(&json!({ "animalDetail": [{ "Weight": "0 lbs" }] }));
        assert_eq!(text.detail.weight.as_deref(), Some("0 lbs"));
    }
}
