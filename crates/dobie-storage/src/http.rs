//! Outbound HTTP for search and detail fetches.
//!
//! Requests are never retried: a failed detail fetch is recorded against its
//! candidate and the run moves on.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info_span, Instrument};

pub const DEFAULT_USER_AGENT: &str = "dobiefetch/0.1 (+https://example.local)";

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// `None` leaves the transport default in place.
    pub timeout: Option<Duration>,
    pub user_agent: Option<String>,
    /// Upper bound on requests in flight at once (the multi-zip burst).
    pub global_concurrency: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            global_concurrency: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, FetchError> {
        serde_json::from_slice(&self.body).map_err(|source| FetchError::Decode {
            url: self.final_url.clone(),
            source,
        })
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("invalid JSON body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    global_limit: Arc<Semaphore>,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().gzip(true).brotli(true);

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            global_limit: Arc::new(Semaphore::new(config.global_concurrency.max(1))),
        })
    }

    pub async fn get(&self, url: &str, accept: &str) -> Result<FetchedResponse, FetchError> {
        let request = self.client.get(url).header(ACCEPT, accept);
        self.send(request, "GET", url).await
    }

    pub async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        extra_headers: &[(&'static str, String)],
    ) -> Result<FetchedResponse, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        for (name, value) in extra_headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }
        let request = self.client.post(url).headers(headers).json(body);
        self.send(request, "POST", url).await
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        method: &'static str,
        url: &str,
    ) -> Result<FetchedResponse, FetchError> {
        // The semaphore is never closed.
        let _permit = self.global_limit.acquire().await.ok();
        let span = info_span!("http_fetch", method, url);

        async move {
            let resp = request.send().await?;
            let status = resp.status();
            let final_url = resp.url().to_string();
            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: final_url,
                });
            }
            let body = resp.bytes().await?.to_vec();
            debug!(status = status.as_u16(), bytes = body.len(), "fetched");
            Ok(FetchedResponse {
                status,
                final_url,
                body,
            })
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_keeps_transport_timeout() {
        let config = HttpClientConfig::default();
        assert!(config.timeout.is_none());
        assert_eq!(config.user_agent.as_deref(), Some(DEFAULT_USER_AGENT));
        assert!(HttpFetcher::new(config).is_ok());
    }

    #[test]
    fn response_json_reports_decode_errors_with_url() {
        let resp = FetchedResponse {
            status: StatusCode::OK,
            final_url: "https://api.example/animal".into(),
            body: b"<html>".to_vec(),
        };
        let err = resp.json::<serde_json::Value>().unwrap_err();
        assert!(err.to_string().contains("https://api.example/animal"));

        let ok = FetchedResponse {
            body: br#"{"animal":[]}"#.to_vec(),
            ..resp
        };
        let value: serde_json::Value = ok.json().unwrap();
        assert!(value["animal"].as_array().unwrap().is_empty());
    }
}
