//! Environment-driven sync settings.

use std::time::Duration;

use dobie_adapters::SearchQuery;
use dobie_storage::DEFAULT_USER_AGENT;
use thiserror::Error;

pub const DATABASE_URL_KEYS: [&str; 3] = ["DATABASE_URL", "POSTGRES_URL", "POSTGRES_URL_NON_POOLING"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("TARGET_URL is required (or set PETPLACE_SEARCH_URL or PETPLACE_ZIPS)")]
    MissingSearchTarget,
    #[error("DATABASE_URL is required (or POSTGRES_URL / POSTGRES_URL_NON_POOLING)")]
    MissingDatabaseUrl,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database_url: Option<String>,
    pub query: SearchQuery,
    pub limit: usize,
    pub delay_ms: u64,
    pub dry_run: bool,
    pub user_agent: String,
    pub http_timeout_secs: Option<u64>,
    pub search_concurrency: usize,
    pub sync_cron: String,
}

/// What one `run_once` call does with its candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub query: SearchQuery,
    pub limit: usize,
    pub delay: Duration,
    pub dry_run: bool,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub fn split_zips(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|z| !z.is_empty())
        .map(ToString::to_string)
        .collect()
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; unparseable numbers fall back to defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| non_empty(get(key));
        let defaults = SearchQuery::default();

        Self {
            database_url: DATABASE_URL_KEYS.iter().find_map(|key| get(*key)),
            query: SearchQuery {
                target_url: get("TARGET_URL"),
                search_url: get("PETPLACE_SEARCH_URL"),
                zip: get("PETPLACE_ZIP").unwrap_or(defaults.zip),
                zips: get("PETPLACE_ZIPS").map(|z| split_zips(&z)).unwrap_or_default(),
                breed: get("PETPLACE_BREED").unwrap_or(defaults.breed),
                radius: get("PETPLACE_RADIUS").unwrap_or(defaults.radius),
                start_index: get("PETPLACE_START_INDEX")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.start_index),
                animal_type: defaults.animal_type,
            },
            limit: get("DOBIE_LIMIT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(25),
            delay_ms: get("DOBIE_DELAY_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(250),
            dry_run: false,
            user_agent: get("DOBIE_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            http_timeout_secs: get("DOBIE_HTTP_TIMEOUT_SECS").and_then(|v| v.parse().ok()),
            search_concurrency: get("DOBIE_SEARCH_CONCURRENCY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(8),
            sync_cron: get("SYNC_CRON").unwrap_or_else(|| "0 0 6 * * *".to_string()),
        }
    }

    /// Checks the settings a run needs before any network or database work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let has_target = self.query.target_url.is_some()
            || self.query.search_url.is_some()
            || !self.query.zips.is_empty();
        if !has_target {
            return Err(ConfigError::MissingSearchTarget);
        }
        if !self.dry_run && self.database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }
        Ok(())
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::MissingDatabaseUrl)
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            query: self.query.clone(),
            limit: self.limit,
            delay: Duration::from_millis(self.delay_ms),
            dry_run: self.dry_run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> SyncConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SyncConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_the_collector_conventions() {
        let cfg = config(&[]);
        assert_eq!(cfg.query.zip, "94110");
        assert_eq!(cfg.query.breed, "DOBERMAN PINSCH");
        assert_eq!(cfg.query.radius, "100");
        assert_eq!(cfg.query.start_index, 0);
        assert_eq!(cfg.limit, 25);
        assert_eq!(cfg.delay_ms, 250);
        assert_eq!(cfg.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(cfg.http_timeout_secs, None);
        assert_eq!(cfg.search_concurrency, 8);
        assert_eq!(cfg.sync_cron, "0 0 6 * * *");
        assert!(cfg.query.zips.is_empty());
    }

    #[test]
    fn first_database_url_wins_and_blanks_are_ignored() {
        let cfg = config(&[
            ("DATABASE_URL", "  "),
            ("POSTGRES_URL", "postgres://pooled"),
            ("POSTGRES_URL_NON_POOLING", "postgres://direct"),
        ]);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://pooled"));
    }

    #[test]
    fn parses_zip_lists_and_numbers() {
        let cfg = config(&[
            ("PETPLACE_ZIPS", "94110, 10001,,60601 "),
            ("DOBIE_LIMIT", "5"),
            ("DOBIE_DELAY_MS", "nope"),
            ("PETPLACE_START_INDEX", "40"),
        ]);
        assert_eq!(cfg.query.zips, vec!["94110", "10001", "60601"]);
        assert_eq!(cfg.limit, 5);
        assert_eq!(cfg.delay_ms, 250);
        assert_eq!(cfg.query.start_index, 40);
        assert_eq!(cfg.run_options().delay, Duration::from_millis(250));
    }

    #[test]
    fn validation_requires_target_and_database() {
        let mut cfg = config(&[]);
        assert_eq!(cfg.validate(), Err(ConfigError::MissingSearchTarget));

        cfg.query.target_url = Some("https://www.petplace.com".into());
        assert_eq!(cfg.validate(), Err(ConfigError::MissingDatabaseUrl));

        cfg.dry_run = true;
        assert_eq!(cfg.validate(), Ok(()));

        let multi = config(&[("PETPLACE_ZIPS", "94110"), ("DATABASE_URL", "postgres://x")]);
        assert_eq!(multi.validate(), Ok(()));
    }
}
