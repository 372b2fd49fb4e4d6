//! Total coercion helpers for loosely-typed listing fields.
//!
//! None of these fail: absent or malformed input yields `None`.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use dobie_core::STATUS_AVAILABLE;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value as JsonValue;

static WEIGHT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]+(?:\.[0-9]+)?)").expect("weight regex"));
static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)href="([^"]+)""#).expect("href regex"));
static NAME_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^)]*\)\s*$").expect("name suffix regex"));

const AVAILABLE_PHRASE: &str = "available for adoption";

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%B %d, %Y", "%b %d, %Y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
];

/// Strings pass through, other scalars are stringified, null stays null.
pub fn to_string_or_null(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn non_empty(text: Option<&str>) -> Option<&str> {
    text.filter(|t| !t.is_empty())
}

/// First integer or decimal number in the text: `"68 lbs"` is `68.0`.
pub fn parse_weight(text: Option<&str>) -> Option<f64> {
    let text = non_empty(text)?;
    WEIGHT_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Normalizes a loosely formatted date to `YYYY-MM-DD`, discarding time and zone.
pub fn parse_date(text: Option<&str>) -> Option<String> {
    let text = non_empty(text)?.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc().date().to_string());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.naive_utc().date().to_string());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt.date().to_string());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return Some(date.to_string());
        }
    }
    None
}

/// Pulls the `href` out of an anchor fragment; plain text comes back unchanged.
pub fn parse_website_url(text: Option<&str>) -> Option<String> {
    let text = non_empty(text)?;

    if let Ok(sel) = Selector::parse("a[href]") {
        let fragment = Html::parse_fragment(text);
        if let Some(href) = fragment
            .select(&sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .filter(|h| !h.is_empty())
        {
            return Some(href.to_string());
        }
    }
    if let Some(m) = HREF_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
    {
        return Some(m.as_str().to_string());
    }
    Some(text.to_string())
}

pub fn infer_status(text: Option<&str>) -> Option<String> {
    let text = non_empty(text)?;
    if text.to_lowercase().contains(AVAILABLE_PHRASE) {
        Some(STATUS_AVAILABLE.to_string())
    } else {
        None
    }
}

/// `"Mindy (A1042472)"` becomes `"Mindy"`; an absent name becomes `""`.
pub fn display_name(full_name: Option<&str>) -> String {
    match full_name {
        Some(full) => NAME_SUFFIX_RE.replace(full, "").trim().to_string(),
        None => String::new(),
    }
}
