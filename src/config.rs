//! Configuration file parser for ~/.config/marquee/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning when the file
//! contains potential typos.
use crate::catalog::CategorySpec;
use crate::util::{validate_endpoint, RetryPolicy};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Environment variable holding the catalog API key. Wins over the file.
pub const API_KEY_ENV: &str = "MARQUEE_API_KEY";

/// Environment variable holding the favorites store ID token.
pub const ID_TOKEN_ENV: &str = "MARQUEE_ID_TOKEN";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// Parsed fine but a value is unusable.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
///
/// Custom Debug impl masks `api_key`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Catalog API endpoint.
    pub catalog_url: String,

    /// Catalog API key (alternative to the MARQUEE_API_KEY env var).
    /// Env var takes precedence over config file.
    pub api_key: Option<String>,

    /// Favorites store base URL. Unset means favorites are kept in memory
    /// for the lifetime of the process.
    pub store_url: Option<String>,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Retries for transient failures (timeouts, 429, 5xx).
    pub max_retries: u32,

    /// First backoff delay; doubles per retry.
    pub retry_base_delay_ms: u64,

    /// Category fetches allowed in flight at once.
    pub max_concurrent_fetches: usize,

    /// How long a favorite toggle waits to see its own write.
    pub settle_timeout_ms: u64,

    /// Home page categories, in display order.
    pub categories: Vec<CategorySpec>,
}

impl Default for Config {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            catalog_url: "https://www.omdbapi.com/".to_string(),
            api_key: None,
            store_url: None,
            request_timeout_secs: retry.request_timeout.as_secs(),
            max_retries: retry.max_retries,
            retry_base_delay_ms: retry.base_delay.as_millis() as u64,
            max_concurrent_fetches: crate::catalog::DEFAULT_MAX_CONCURRENT,
            settle_timeout_ms: crate::favorites::DEFAULT_SETTLE_TIMEOUT.as_millis() as u64,
            categories: CategorySpec::defaults(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("catalog_url", &self.catalog_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("store_url", &self.store_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("max_concurrent_fetches", &self.max_concurrent_fetches)
            .field("settle_timeout_ms", &self.settle_timeout_ms)
            .field("categories", &self.categories)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 9] = [
        "catalog_url",
        "api_key",
        "store_url",
        "request_timeout_secs",
        "max_retries",
        "retry_base_delay_ms",
        "max_concurrent_fetches",
        "settle_timeout_ms",
        "categories",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    /// - Unusable values → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check size before reading so a huge file is never pulled into memory.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        let config = Self::parse(&content)?;
        tracing::info!(
            path = %path.display(),
            categories = config.categories.len(),
            remote_store = config.store_url.is_some(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parses and validates TOML content.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values serde cannot: endpoints, category labels, zero limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.catalog_endpoint()?;
        self.store_endpoint()?;

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_fetches must be at least 1".into(),
            ));
        }
        if self.categories.is_empty() {
            return Err(ConfigError::Invalid("no categories configured".into()));
        }

        let mut seen = HashSet::new();
        for category in &self.categories {
            if category.label.trim().is_empty() || category.query_term.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "category label and query must not be empty".into(),
                ));
            }
            if !seen.insert(category.label.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate category label '{}'",
                    category.label
                )));
            }
        }
        Ok(())
    }

    pub fn catalog_endpoint(&self) -> Result<Url, ConfigError> {
        validate_endpoint(&self.catalog_url)
            .map_err(|e| ConfigError::Invalid(format!("catalog_url: {e}")))
    }

    pub fn store_endpoint(&self) -> Result<Option<Url>, ConfigError> {
        self.store_url
            .as_deref()
            .map(|url| {
                validate_endpoint(url).map_err(|e| ConfigError::Invalid(format!("store_url: {e}")))
            })
            .transpose()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    /// Catalog API key from MARQUEE_API_KEY, falling back to the file.
    pub fn api_key(&self) -> Option<SecretString> {
        self.api_key_with(std::env::var(API_KEY_ENV).ok())
    }

    fn api_key_with(&self, from_env: Option<String>) -> Option<SecretString> {
        from_env
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_key.clone())
            .map(SecretString::from)
    }

    /// Store ID token. Only read from the environment; never from the file.
    pub fn id_token() -> Option<SecretString> {
        std::env::var(ID_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .map(SecretString::from)
    }
}

// ============================================================================
// Tests
// ============================================================================
