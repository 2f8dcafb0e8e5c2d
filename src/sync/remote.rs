//! HTTP client for the remote pattern service
//!
//! `GET {endpoint}/patterns?since=<rfc3339>` returns a JSON array of pattern
//! records; `POST {endpoint}/patterns` accepts one. Both carry a bearer
//! token. Rate limiting and timeouts are retried with exponential backoff.

use super::RemotePatternClient;
use crate::error::{PatternCacheError, Result};
use crate::storage::PatternRecord;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Response, StatusCode};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Maximum retry attempts for rate limiting and timeouts
const MAX_RETRIES: usize = 3;

/// Backoff base duration in milliseconds
const BACKOFF_BASE_MS: u64 = 1000;

/// Request timeout duration
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// reqwest-backed [`RemotePatternClient`]
#[derive(Debug, Clone)]
pub struct HttpPatternClient {
    client: Client,
    endpoint: String,
    backoff_base: Duration,
}

impl HttpPatternClient {
    /// Create a client for `endpoint` (e.g. `https://patterns.example.com/api`)
    pub fn new(endpoint: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let endpoint = endpoint.into().trim().trim_end_matches('/').to_string();
        if endpoint.is_empty() {
            return Err(PatternCacheError::ValidationError(
                "Sync endpoint cannot be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(timeout.unwrap_or(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
            .build()
            .map_err(|e| PatternCacheError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            backoff_base: Duration::from_millis(BACKOFF_BASE_MS),
        })
    }

    /// Override the first retry delay
    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn patterns_url(&self) -> String {
        format!("{}/patterns", self.endpoint)
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0;

        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if retries >= MAX_RETRIES || !e.is_retryable() {
                        return Err(e);
                    }

                    // Exponential backoff
                    let backoff = self.backoff_base * 2_u32.pow(retries as u32);
                    warn!(
                        "Pattern {} failed ({}), retrying after {:?} (attempt {}/{})",
                        operation,
                        e,
                        backoff,
                        retries + 1,
                        MAX_RETRIES
                    );

                    sleep(backoff).await;
                    retries += 1;
                }
            }
        }
    }

    async fn download_once(&self, token: &str, since: Option<DateTime<Utc>>) -> Result<Vec<PatternRecord>> {
        let mut request = self.client.get(self.patterns_url()).bearer_auth(token);
        if let Some(since) = since {
            request = request.query(&[("since", since.to_rfc3339_opts(SecondsFormat::Micros, true))]);
        }

        let response = request.send().await.map_err(network_error)?;
        let response = check_status(response).await?;

        let values: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| PatternCacheError::RemoteError(format!("Invalid pattern payload: {}", e)))?;

        let records = parse_remote_records(values);
        debug!("Downloaded {} pattern records from {}", records.len(), self.endpoint);
        Ok(records)
    }

    async fn upload_once(&self, token: &str, records: &[PatternRecord]) -> Result<()> {
        let response = self
            .client
            .post(self.patterns_url())
            .bearer_auth(token)
            .json(records)
            .send()
            .await
            .map_err(network_error)?;

        check_status(response).await?;
        debug!("Uploaded {} pattern records to {}", records.len(), self.endpoint);
        Ok(())
    }
}

#[async_trait]
impl RemotePatternClient for HttpPatternClient {
    async fn download(&self, token: &str, since: Option<DateTime<Utc>>) -> Result<Vec<PatternRecord>> {
        self.with_retry("download", || self.download_once(token, since)).await
    }

    async fn upload(&self, token: &str, records: &[PatternRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.with_retry("upload", || self.upload_once(token, records)).await
    }
}

/// Keep the records that decode; malformed ones are logged and dropped
fn parse_remote_records(values: Vec<serde_json::Value>) -> Vec<PatternRecord> {
    values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value::<PatternRecord>(value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping malformed remote pattern #{}: {}", index, e);
                None
            }
        })
        .collect()
}

fn network_error(e: reqwest::Error) -> PatternCacheError {
    if e.is_timeout() {
        PatternCacheError::NetworkError(format!("request timed out: {}", e))
    } else {
        PatternCacheError::NetworkError(e.to_string())
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();

    match status {
        s if s.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(PatternCacheError::AuthenticationError(
            "Invalid or missing sync token".to_string(),
        )),
        StatusCode::TOO_MANY_REQUESTS => Err(PatternCacheError::RateLimitExceeded(
            "Pattern service rate limit exceeded".to_string(),
        )),
        _ => {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            Err(PatternCacheError::RemoteError(format!(
                "Pattern service error (status {}): {}",
                status, error_text
            )))
        }
    }
}
