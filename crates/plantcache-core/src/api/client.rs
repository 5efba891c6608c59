//! HTTP client for the remote plant store.
//!
//! This module provides the `ApiClient` struct which reads the full plant
//! document for an owner from the realtime database REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode, Url};
use tracing::{debug, warn};

use super::ApiError;
use crate::models::Snapshot;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
/// Doubles after every 429.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Source of the authoritative plant snapshot for an owner.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch every plant the remote holds for `owner_id`.
    ///
    /// An owner with no plants yields an empty snapshot, never an error.
    async fn fetch_snapshot(&self, owner_id: &str) -> Result<Snapshot, ApiError>;
}

/// API client for the remote plant store.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
    initial_backoff: Duration,
}

impl ApiClient {
    /// Create a new API client for the database at `base_url`
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            token: None,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// Set the ID token sent as the `auth` query parameter
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
            initial_backoff: self.initial_backoff,
        }
    }

    /// Wait this long after the first 429 before retrying.
    pub fn with_rate_limit_backoff(mut self, initial: Duration) -> Self {
        self.initial_backoff = initial;
        self
    }

    /// URL of the plant document for one owner.
    /// The owner id is encoded as a single path segment.
    fn snapshot_url(&self, owner_id: &str) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?;
            segments.pop_if_empty().extend(["Users", owner_id, "Plants.json"]);
        }
        if let Some(ref token) = self.token {
            url.query_pairs_mut().append_pair("auth", token);
        }
        Ok(url)
    }

    /// GET `url`, retrying with exponential backoff while rate limited.
    async fn get_body(&self, url: Url) -> Result<Vec<u8>, ApiError> {
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let response = self
                .client
                .get(url.clone())
                .header(header::ACCEPT, "application/json")
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                return Ok(response.bytes().await?.to_vec());
            }

            if status == StatusCode::TOO_MANY_REQUESTS && retries < MAX_RATE_LIMIT_RETRIES {
                retries += 1;
                warn!(path = url.path(), retry = retries, backoff = ?backoff, "Rate limited, backing off");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_response(status, url.path(), &body));
        }
    }

    /// Decode a plant document body.
    ///
    /// An empty body or a JSON `null` means the owner has no plants. Anything
    /// that is not a map of complete plant objects is rejected rather than
    /// read as empty, so a garbled response can never wipe the local cache.
    pub fn decode_snapshot(body: &[u8]) -> Result<Snapshot, ApiError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Snapshot::empty());
        }

        let snapshot: Option<Snapshot> = serde_json::from_slice(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Malformed plant document: {}", e)))?;
        let snapshot = snapshot.unwrap_or_default();

        for (remote_id, plant) in snapshot.entries() {
            plant
                .clone()
                .into_new_plant(remote_id.clone())
                .validate()
                .map_err(|field| {
                    ApiError::InvalidResponse(format!(
                        "Plant '{}' has an empty {}",
                        remote_id, field
                    ))
                })?;
        }

        Ok(snapshot)
    }
}

#[async_trait]
impl RemoteSource for ApiClient {
    async fn fetch_snapshot(&self, owner_id: &str) -> Result<Snapshot, ApiError> {
        let url = self.snapshot_url(owner_id)?;
        debug!(owner = owner_id, path = url.path(), "Fetching plant snapshot");

        let body = self.get_body(url).await?;
        let snapshot = Self::decode_snapshot(&body)?;

        debug!(owner = owner_id, plants = snapshot.len(), "Fetched plant snapshot");
        Ok(snapshot)
    }
}

// ============================================================================
// Tests
// ============================================================================
