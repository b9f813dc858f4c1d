use crate::catalog::MovieSummary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors from the favorites store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The session is missing, expired or was rejected by the store.
    #[error("Sign-in required")]
    AuthRequired,
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Request timed out")]
    Timeout,
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Invalid store data: {0}")]
    Decode(String),
    /// A user or movie id that cannot be used as a path segment.
    #[error("Invalid key: {0:?}")]
    InvalidKey(String),
    /// The subscription backing a view has ended; its last-known value is stale.
    #[error("Subscription closed")]
    Closed,
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Timeout | StoreError::Network(_) => true,
            StoreError::HttpStatus(status) => *status >= 500 || *status == 429,
            StoreError::AuthRequired
            | StoreError::Decode(_)
            | StoreError::InvalidKey(_)
            | StoreError::Closed => false,
        }
    }
}

/// Characters the store does not allow inside a key segment.
const FORBIDDEN_KEY_CHARS: &[char] = &['/', '.', '#', '$', '[', ']'];

/// Rejects ids that would escape their `favorites/{user}/{movie}` slot.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() || key.contains(FORBIDDEN_KEY_CHARS) || key.chars().any(char::is_control) {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

// ============================================================================
// Records and Snapshots
// ============================================================================

/// A favorited movie as persisted under `favorites/{userId}/{movieId}`.
///
/// Written whole on every `set`; never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteRecord {
    pub movie_id: String,
    pub title: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub poster_url: String,
    #[serde(default)]
    pub kind: String,
}

impl From<&MovieSummary> for FavoriteRecord {
    fn from(movie: &MovieSummary) -> Self {
        Self {
            movie_id: movie.id.clone(),
            title: movie.title.clone(),
            year: movie.year.clone(),
            poster_url: movie.poster_url.clone(),
            kind: movie.kind.clone(),
        }
    }
}

impl FavoriteRecord {
    pub fn to_summary(&self) -> MovieSummary {
        MovieSummary {
            id: self.movie_id.clone(),
            title: self.title.clone(),
            year: self.year.clone(),
            poster_url: self.poster_url.clone(),
            kind: self.kind.clone(),
        }
    }
}

/// Current value of one favorite key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoriteSnapshot {
    pub movie_id: String,
    pub record: Option<FavoriteRecord>,
}

impl FavoriteSnapshot {
    pub fn exists(&self) -> bool {
        self.record.is_some()
    }
}

/// All favorites of one user, keyed by movie id.
pub type FavoriteSet = BTreeMap<String, FavoriteRecord>;
