use futures::StreamExt;
use reqwest::redirect::Policy;
use std::time::Duration;
use thiserror::Error;

const MAX_REDIRECTS: usize = 3;

/// Timeout, retry and backoff settings shared by the catalog and store clients.
///
/// Delays double per attempt starting at `base_delay`: with the default 1s
/// base that is 1s, 2s, 4s before giving up after `max_retries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(20),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (0-based).
    ///
    /// # Arguments
    ///
    /// * `attempt` - Retries already made; 0 for the first retry
    ///
    /// # Returns
    ///
    /// `base_delay * 2^attempt`. The exponent is capped at 16 and the
    /// multiplication saturates, so large attempts never overflow.
    ///
    /// # Examples
    ///
    /// ```
    /// use marquee::util::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy {
    ///     base_delay: Duration::from_millis(100),
    ///     ..RetryPolicy::default()
    /// };
    /// assert_eq!(policy.delay_for(0), Duration::from_millis(100));
    /// assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    /// ```
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }

    /// Whether another attempt is allowed after `attempt` retries so far.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Redirect policy for credentialed endpoints.
///
/// API keys and store tokens ride in the query string, so a redirect is only
/// followed while it stays on the original host. Chains are capped and loops
/// rejected. URLs are never logged, only hosts.
fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        let origin = attempt.previous().first().and_then(|u| u.host_str());
        if origin != url.host_str() {
            return attempt.error("Refusing cross-host redirect");
        }

        tracing::debug!(
            host = url.host_str().unwrap_or(""),
            hop = attempt.previous().len(),
            "Following redirect"
        );
        attempt.follow()
    })
}

/// Shared HTTP client for the catalog and store clients.
///
/// No client-wide timeout: store subscriptions are long-lived streams, so
/// each request applies [`RetryPolicy::request_timeout`] itself.
pub fn build_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(concat!("marquee/", env!("CARGO_PKG_VERSION")))
        .redirect(redirect_policy())
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
}

#[derive(Debug, Error)]
pub enum BodyError {
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Response too large")]
    TooLarge,
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    Incomplete { expected: u64, received: usize },
}

/// Reads a response body with a size cap.
///
/// The advertised Content-Length is checked before any bytes are read; the
/// running total is checked again per chunk, since the header may be absent
/// or wrong.
///
/// # Arguments
///
/// * `response` - Response whose body to consume
/// * `limit` - Maximum body size in bytes
///
/// # Returns
///
/// The complete body.
///
/// # Errors
///
/// - [`BodyError::TooLarge`] when the header or the streamed total exceeds
///   `limit`
/// - [`BodyError::Incomplete`] when the connection closed before the
///   advertised length arrived
/// - [`BodyError::Network`] on a transport error mid-body
pub async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, BodyError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(BodyError::TooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(BodyError::TooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(BodyError::Incomplete {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
