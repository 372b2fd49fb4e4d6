//! Content-addressed identifiers.
//!
//! Every id in the system is a SHA-256 hex digest over the colon-joined natural
//! key, so re-ingesting the same source record always lands on the same row.

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

/// Length of every id produced by [`hash_id`].
pub const ID_HEX_LEN: usize = 64;

pub fn hash_id(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn composite_id(parts: &[&str]) -> String {
    hash_id(&parts.join(":"))
}

pub fn shelter_id(source: &str, client_id: &str) -> String {
    composite_id(&[source, client_id])
}

pub fn dog_id(source: &str, source_animal_id: &str, client_id: &str) -> String {
    composite_id(&[source, source_animal_id, client_id])
}

pub fn photo_id(dog_id: &str, url: &str) -> String {
    composite_id(&[dog_id, url])
}

/// Run ids key on the search URL plus the millisecond start instant.
pub fn search_run_id(search_url: &str, started_at: DateTime<Utc>) -> String {
    composite_id(&[
        search_url,
        &started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    ])
}
