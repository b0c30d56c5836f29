//! HTTP client for the similarity registry with retry and backoff.
//!
//! ## Endpoints
//!
//! - `GET {base}/alex/match?hash={hex}&threshold={int}&limit={int}` →
//!   `{ "matches": [...] }`
//! - `GET {base}/alex/stats` → `{ "total_artworks": n }`
//!
//! Transient failures (timeouts, connection errors, 429/502/503/504) are
//! retried with exponential backoff; everything else fails immediately.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use backoff::{future::retry_notify, ExponentialBackoff};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::{MatchQuery, RegistryMatch, RegistryStats, SimilarityRegistry};
use crate::error::{CodexError, Result};

/// Default registry base URL.
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";

/// Default timeout for registry requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of retry attempts.
const DEFAULT_MAX_RETRIES: u32 = 2;

/// Initial retry interval.
const INITIAL_INTERVAL: Duration = Duration::from_millis(100);

/// Maximum retry interval.
const MAX_INTERVAL: Duration = Duration::from_secs(2);

/// Configuration for the registry client.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Base URL, without the `/alex/...` suffix.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Retry budget for transient errors; `0` disables retries.
    pub max_retries: u32,
    /// Initial retry interval.
    pub initial_interval: Duration,
    /// Maximum retry interval.
    pub max_interval: Duration,
}

impl Default for RegistryConfig {
    /// Read `CODEX_REGISTRY_URL`, `CODEX_REGISTRY_TIMEOUT_SECS` and
    /// `CODEX_REGISTRY_RETRIES`, falling back to built-in defaults.
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl RegistryConfig {
    /// Build a config from `lookup`, which maps a variable name to its value.
    ///
    /// Values that are absent or do not parse fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            base_url: lookup("CODEX_REGISTRY_URL")
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout: lookup("CODEX_REGISTRY_TIMEOUT_SECS")
                .and_then(|v| v.trim().parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
            max_retries: lookup("CODEX_REGISTRY_RETRIES")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_MAX_RETRIES),
            initial_interval: INITIAL_INTERVAL,
            max_interval: MAX_INTERVAL,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MatchResponse {
    #[serde(default)]
    matches: Vec<Value>,
}

/// Registry client over HTTP.
///
/// ## Example
///
/// ```no_run
/// use codex_core::registry::{HttpRegistry, RegistryConfig, SimilarityRegistry};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = HttpRegistry::with_config(RegistryConfig {
///     base_url: "https://registry.example".to_string(),
///     ..Default::default()
/// })?;
/// let stats = registry.stats().await?;
/// println!("{} artworks indexed", stats.total_artworks);
/// # Ok(())
/// # }
/// ```
pub struct HttpRegistry {
    client: Client,
    base_url: Url,
    config: RegistryConfig,
}

impl HttpRegistry {
    /// Create a client configured from the environment.
    pub fn new() -> Result<Self> {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a client with explicit configuration.
    #[instrument(level = "debug", skip_all, fields(
        base_url = %config.base_url,
        timeout_ms = config.timeout.as_millis() as u64,
        max_retries = config.max_retries
    ))]
    pub fn with_config(config: RegistryConfig) -> Result<Self> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/')).map_err(|e| {
            CodexError::RegistryUnavailable(format!(
                "invalid registry URL {:?}: {e}",
                config.base_url
            ))
        })?;

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("codex-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                warn!(error = %e, "Failed to create HTTP client");
                CodexError::RegistryUnavailable(format!("Failed to create HTTP client: {e}"))
            })?;

        debug!("Registry client created");
        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.as_str().trim_end_matches('/'))
    }

    /// GET `url` with retry, decoding the JSON body as `R`.
    async fn get_json<R>(&self, url: &str, params: &[(&str, String)]) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let start = Instant::now();

        let result = retry_notify(
            self.build_backoff(),
            || async { self.get_once::<R>(url, params).await },
            |err: CodexError, duration: Duration| {
                warn!(
                    error = %err,
                    retry_after_ms = duration.as_millis() as u64,
                    "Retry scheduled"
                );
            },
        )
        .await;

        let total_latency_ms = start.elapsed().as_millis() as u64;
        if let Err(e) = &result {
            warn!(error = %e, total_latency_ms, "Registry request failed after all retries");
        }
        result
    }

    async fn get_once<R>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> std::result::Result<R, backoff::Error<CodexError>>
    where
        R: DeserializeOwned,
    {
        let start = Instant::now();

        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| {
                let latency_ms = start.elapsed().as_millis() as u64;
                let err = CodexError::RegistryUnavailable(format!("request failed: {e}"));
                if is_transient_error(&e) {
                    warn!(error = %e, latency_ms, "Transient error, will retry");
                    backoff::Error::transient(err)
                } else {
                    warn!(error = %e, latency_ms, "Permanent error, aborting");
                    backoff::Error::permanent(err)
                }
            })?;

        let status = response.status();
        debug!(status = %status, "Received HTTP response");

        if !status.is_success() {
            let latency_ms = start.elapsed().as_millis() as u64;
            let err =
                CodexError::RegistryUnavailable(format!("registry returned status: {status}"));
            return if is_transient_status(status) {
                warn!(status = %status, latency_ms, "Transient HTTP status, will retry");
                Err(backoff::Error::transient(err))
            } else {
                warn!(status = %status, latency_ms, "Permanent HTTP error");
                Err(backoff::Error::permanent(err))
            };
        }

        let parsed: R = response.json().await.map_err(|e| {
            warn!(error = %e, "Failed to parse JSON response");
            backoff::Error::permanent(CodexError::RegistryUnavailable(format!(
                "Failed to parse registry response: {e}"
            )))
        })?;

        debug!(
            latency_ms = start.elapsed().as_millis() as u64,
            "Request completed successfully"
        );
        Ok(parsed)
    }

    fn build_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_interval,
            max_interval: self.config.max_interval,
            max_elapsed_time: Some(self.config.timeout * self.config.max_retries),
            ..Default::default()
        }
    }
}

#[async_trait]
impl SimilarityRegistry for HttpRegistry {
    #[instrument(
        level = "info",
        skip_all,
        fields(threshold = query.threshold, limit = query.limit)
    )]
    async fn find_matches(&self, query: &MatchQuery) -> Result<Vec<RegistryMatch>> {
        let url = self.endpoint("alex/match");
        let params = [
            ("hash", query.hash.clone()),
            ("threshold", query.threshold.to_string()),
            ("limit", query.limit.to_string()),
        ];

        let response: MatchResponse = self.get_json(&url, &params).await?;
        let received = response.matches.len();

        let matches: Vec<RegistryMatch> = response
            .matches
            .into_iter()
            .filter_map(|value| match serde_json::from_value(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable registry match");
                    None
                }
            })
            .collect();

        info!(received, decoded = matches.len(), "Registry match query completed");
        Ok(matches)
    }

    #[instrument(level = "debug", skip_all)]
    async fn stats(&self) -> Result<RegistryStats> {
        let url = self.endpoint("alex/stats");
        self.get_json(&url, &[]).await
    }
}

/// Check if a reqwest error is transient and should be retried.
pub fn is_transient_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

/// Check if an HTTP status code indicates a transient error.
pub fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
            | StatusCode::BAD_GATEWAY
    )
}
