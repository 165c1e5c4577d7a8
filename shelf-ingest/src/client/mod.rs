//! Rate-limited client for the bibliographic API
//!
//! Every request goes through one shared token bucket and one retry loop:
//! - Network errors, HTTP 429 and HTTP 5xx are retried with exponential
//!   backoff (1s, 2s, 4s, ...) up to `max_retries` times
//! - Any other non-success status fails immediately
//! - Both the limiter wait and the backoff sleep end early when the
//!   caller's cancellation token fires
//!
//! Endpoints:
//! - `GET /search.json?subject=<s>&limit=<n>`
//! - `GET /api/books?bibkeys=ISBN:<id1>,ISBN:<id2>&format=json&jscmd=data`
//! - `GET /authors/<key>.json`

pub mod rate_limit;
pub mod retry;
pub mod types;

use async_trait::async_trait;
use reqwest::Url;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ApiSettings;
pub use rate_limit::RequestLimiter;
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use types::{AuthorDetail, AuthorRef, BookDetail, CoverLinks, Fetched, SearchDoc, SearchResponse, TextBlock};

/// Prefix the books endpoint expects on each bibkey
const BIBKEY_PREFIX: &str = "ISBN:";

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Request failed after {retries} retries: {last}")]
    RetriesExhausted { retries: u32, last: Box<ClientError> },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl ClientError {
    /// Network failures, 429 and 5xx are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Network(_) => true,
            ClientError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

/// The three lookups the sync controller needs from the provider
#[async_trait]
pub trait BookSource: Send + Sync {
    /// Subject search. Documents are returned as-is, including ones without identifiers.
    async fn search(
        &self,
        subject: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchDoc>, ClientError>;

    /// Batched detail lookup. Only identifiers the provider knows appear in the map.
    async fn hydrate(
        &self,
        isbns: &[String],
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, Fetched<BookDetail>>, ClientError>;

    /// Single author lookup by provider key (e.g. `OL23919A`)
    async fn author_detail(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<Fetched<AuthorDetail>, ClientError>;
}

/// HTTP client for the Open Library API
pub struct OpenLibraryClient {
    http: reqwest::Client,
    base_url: String,
    limiter: RequestLimiter,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl OpenLibraryClient {
    pub fn new(settings: &ApiSettings) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(shelf_common::config::user_agent())
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ClientError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            limiter: RequestLimiter::per_second(settings.requests_per_second)?,
            retry: RetryPolicy::new(settings.max_retries),
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replace the backoff sleeper (tests observe delays through this)
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch `url` and return the exact response bytes.
    ///
    /// This is the single path every endpoint takes, so it owns rate limiting
    /// and the retry loop.
    pub async fn raw_get(&self, url: &str, cancel: &CancellationToken) -> Result<Vec<u8>, ClientError> {
        let mut retries = 0u32;

        loop {
            self.limiter.acquire(cancel).await?;

            debug!(url = %url, attempt = retries + 1, "GET");

            let err = match self.send_once(url).await {
                Ok(body) => return Ok(body),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => err,
            };

            if retries >= self.retry.max_retries {
                return Err(ClientError::RetriesExhausted {
                    retries,
                    last: Box::new(err),
                });
            }

            retries += 1;
            let delay = self.retry.delay_for(retries);
            warn!(
                url = %url,
                attempt = retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retryable API failure, backing off"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                _ = self.sleeper.sleep(delay) => {}
            }
        }
    }

    async fn send_once(&self, url: &str) -> Result<Vec<u8>, ClientError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(bytes.to_vec())
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, ClientError> {
        let base = format!("{}{}", self.base_url, path);
        let parsed = if params.is_empty() {
            Url::parse(&base)
        } else {
            Url::parse_with_params(&base, params)
        };
        parsed.map_err(|e| ClientError::InvalidConfig(format!("Bad URL {}: {}", base, e)))
    }
}

#[async_trait]
impl BookSource for OpenLibraryClient {
    async fn search(
        &self,
        subject: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchDoc>, ClientError> {
        let limit = limit.to_string();
        let url = self.endpoint("/search.json", &[("subject", subject), ("limit", limit.as_str())])?;

        let body = self.raw_get(url.as_str(), cancel).await?;
        let response: SearchResponse =
            serde_json::from_slice(&body).map_err(|e| ClientError::Decode(e.to_string()))?;

        debug!(subject = %subject, docs = response.docs.len(), found = response.num_found, "Search complete");

        Ok(response.docs)
    }

    async fn hydrate(
        &self,
        isbns: &[String],
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, Fetched<BookDetail>>, ClientError> {
        if isbns.is_empty() {
            return Ok(HashMap::new());
        }

        let bibkeys = isbns
            .iter()
            .map(|isbn| format!("{}{}", BIBKEY_PREFIX, isbn))
            .collect::<Vec<_>>()
            .join(",");
        let url = self.endpoint(
            "/api/books",
            &[("bibkeys", bibkeys.as_str()), ("format", "json"), ("jscmd", "data")],
        )?;

        let body = self.raw_get(url.as_str(), cancel).await?;
        let entries: HashMap<String, serde_json::Value> =
            serde_json::from_slice(&body).map_err(|e| ClientError::Decode(e.to_string()))?;

        let mut details = HashMap::with_capacity(entries.len());
        for (bibkey, raw) in entries {
            let isbn = bibkey.strip_prefix(BIBKEY_PREFIX).unwrap_or(&bibkey).to_string();
            match serde_json::from_value::<BookDetail>(raw.clone()) {
                Ok(value) => {
                    details.insert(isbn, Fetched { value, raw });
                }
                Err(e) => warn!(isbn = %isbn, error = %e, "Undecodable book detail, dropping"),
            }
        }

        debug!(requested = isbns.len(), returned = details.len(), "Hydration complete");

        Ok(details)
    }

    async fn author_detail(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<Fetched<AuthorDetail>, ClientError> {
        let url = self.endpoint(&format!("/authors/{}.json", key), &[])?;

        let body = self.raw_get(url.as_str(), cancel).await?;
        let raw: serde_json::Value =
            serde_json::from_slice(&body).map_err(|e| ClientError::Decode(e.to_string()))?;
        let value: AuthorDetail =
            serde_json::from_value(raw.clone()).map_err(|e| ClientError::Decode(e.to_string()))?;

        Ok(Fetched { value, raw })
    }
}
