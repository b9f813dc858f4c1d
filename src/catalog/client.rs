use crate::catalog::types::{MovieDetail, MovieSummary, ResponseMarker, SearchEnvelope};
use crate::util::{read_limited_bytes, BodyError, RetryPolicy, MAX_SEARCH_QUERY_LENGTH};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

const MAX_RESPONSE_SIZE: usize = 2 * 1024 * 1024; // 2MB

/// Error message the catalog API returns when a search has no hits.
const NO_MATCH_MESSAGE: &str = "movie not found";

/// Errors from the external catalog API.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Request timed out")]
    Timeout,
    /// Non-2xx response after retries were exhausted (or a 4xx, which is not retried)
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    #[error("Response too large")]
    ResponseTooLarge,
    #[error("Invalid response: {0}")]
    Decode(String),
    /// The API answered but reported an error of its own (bad key, too many results)
    #[error("Catalog API error: {0}")]
    Api(String),
    /// Detail lookup for an unknown id
    #[error("Movie not found: {0}")]
    NotFound(String),
    /// Request rejected before reaching the network
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Duplicate category label: {0}")]
    DuplicateCategory(String),
}

impl CatalogError {
    /// Whether the failure is transient and the request may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            CatalogError::Timeout | CatalogError::Network(_) => true,
            CatalogError::HttpStatus(status) => *status >= 500 || *status == 429,
            CatalogError::RateLimited(_)
            | CatalogError::ResponseTooLarge
            | CatalogError::Decode(_)
            | CatalogError::Api(_)
            | CatalogError::NotFound(_)
            | CatalogError::Validation(_)
            | CatalogError::DuplicateCategory(_) => false,
        }
    }
}

impl From<BodyError> for CatalogError {
    fn from(err: BodyError) -> Self {
        match err {
            BodyError::Network(e) => CatalogError::Network(e),
            BodyError::TooLarge => CatalogError::ResponseTooLarge,
            incomplete @ BodyError::Incomplete { .. } => CatalogError::Decode(incomplete.to_string()),
        }
    }
}

/// Client for the catalog search and detail endpoints.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: Arc<SecretString>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"[REDACTED]")
            .field("retry", &self.retry)
            .finish()
    }
}

impl CatalogClient {
    pub fn new(
        http: reqwest::Client,
        base_url: Url,
        api_key: SecretString,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http,
            base_url,
            api_key: Arc::new(api_key),
            retry,
        }
    }

    /// Searches the catalog by title term.
    ///
    /// A "no match" answer from the API is a successful empty result; any
    /// other API-reported error is returned as [`CatalogError::Api`] so that
    /// callers can tell an empty category from a failed one.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::Validation`] for an empty or oversized term; no
    ///   request is made
    /// - [`CatalogError::Network`], [`CatalogError::Timeout`],
    ///   [`CatalogError::HttpStatus`], [`CatalogError::RateLimited`] after the
    ///   retry budget is spent
    /// - [`CatalogError::Decode`] when the body is not a search envelope
    pub async fn search(&self, term: &str) -> Result<Vec<MovieSummary>, CatalogError> {
        let term = term.trim();
        if term.is_empty() {
            return Err(CatalogError::Validation("search term is empty".into()));
        }
        if term.chars().count() > MAX_SEARCH_QUERY_LENGTH {
            return Err(CatalogError::Validation(format!(
                "search term exceeds {} characters",
                MAX_SEARCH_QUERY_LENGTH
            )));
        }

        let bytes = self.get(("s", term)).await?;
        let envelope: SearchEnvelope =
            serde_json::from_slice(&bytes).map_err(|e| CatalogError::Decode(e.to_string()))?;

        if let Some(items) = envelope.search {
            tracing::debug!(term = %term, hits = items.len(), "Catalog search returned");
            return Ok(items);
        }

        let is_false = envelope
            .response
            .as_deref()
            .is_some_and(|r| r.eq_ignore_ascii_case("false"));
        match envelope.error {
            Some(msg) if msg.to_lowercase().contains(NO_MATCH_MESSAGE) => Ok(Vec::new()),
            Some(msg) => Err(CatalogError::Api(msg)),
            None if is_false => Ok(Vec::new()),
            None => Err(CatalogError::Decode("missing Search field".into())),
        }
    }

    /// Fetches the full detail record for one movie id.
    ///
    /// # Errors
    ///
    /// [`CatalogError::NotFound`] when the API answers with its not-found
    /// marker, plus the transport errors listed on [`CatalogClient::search`].
    pub async fn detail(&self, movie_id: &str) -> Result<MovieDetail, CatalogError> {
        let movie_id = movie_id.trim();
        if movie_id.is_empty() {
            return Err(CatalogError::Validation("movie id is empty".into()));
        }

        let bytes = self.get(("i", movie_id)).await?;
        let marker: ResponseMarker =
            serde_json::from_slice(&bytes).map_err(|e| CatalogError::Decode(e.to_string()))?;
        if marker.is_false() {
            tracing::debug!(
                movie_id = %movie_id,
                error = marker.error.as_deref().unwrap_or(""),
                "Catalog has no record for id"
            );
            return Err(CatalogError::NotFound(movie_id.to_string()));
        }

        serde_json::from_slice(&bytes).map_err(|e| CatalogError::Decode(e.to_string()))
    }

    /// Issues a GET with one lookup parameter, retrying transient failures
    /// (timeouts, connection errors, 429, 5xx) with exponential backoff.
    ///
    /// The request URL carries the API key and is never logged.
    async fn get(&self, param: (&str, &str)) -> Result<Vec<u8>, CatalogError> {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair(param.0, param.1)
            .append_pair("apikey", self.api_key.expose_secret());

        let mut retry_count = 0;
        loop {
            match self.attempt(&url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_retryable() && self.retry.allows_retry(retry_count) => {
                    let delay = self.retry.delay_for(retry_count);
                    tracing::warn!(
                        lookup = %param.1,
                        error = %e,
                        retry = retry_count + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Catalog request failed, retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(CatalogError::HttpStatus(429)) => {
                    return Err(CatalogError::RateLimited(retry_count));
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(&self, url: &Url) -> Result<Vec<u8>, CatalogError> {
        let response = tokio::time::timeout(
            self.retry.request_timeout,
            self.http.get(url.as_str()).send(),
        )
        .await
        .map_err(|_| CatalogError::Timeout)??;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::HttpStatus(status.as_u16()));
        }

        Ok(read_limited_bytes(response, MAX_RESPONSE_SIZE).await?)
    }
}
