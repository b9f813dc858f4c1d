use thiserror::Error;
use url::Url;

/// Errors returned when an endpoint URL from configuration is rejected.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// Plain http to a remote host would leak the API key or session token.
    #[error("Insecure endpoint {0}: HTTPS required (except localhost)")]
    Insecure(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
}

/// Validates a service endpoint (catalog API or favorites store).
///
/// Credentials travel in the query string for both services, so `https` is
/// mandatory. Plain `http` is accepted only for loopback hosts, which is what
/// local emulators and the HTTP mocks in tests use.
///
/// A trailing slash is stripped from the path so that callers can extend it
/// with `path_segments_mut()` without producing an empty segment.
///
/// # Examples
///
/// ```
/// use marquee::util::validate_endpoint;
///
/// assert!(validate_endpoint("https://www.omdbapi.com/").is_ok());
/// assert!(validate_endpoint("http://127.0.0.1:9000").is_ok());
/// assert!(validate_endpoint("http://example.com").is_err());
/// assert!(validate_endpoint("ftp://example.com").is_err());
/// ```
pub fn validate_endpoint(url_str: &str) -> Result<Url, UrlValidationError> {
    let mut url = Url::parse(url_str.trim())?;

    let host = url
        .host_str()
        .ok_or(UrlValidationError::MissingHost)?
        .to_owned();

    match url.scheme() {
        "https" => {}
        "http" if is_loopback(&host) => {
            tracing::warn!(endpoint = %url, "Using non-HTTPS endpoint (loopback only)");
        }
        "http" => return Err(UrlValidationError::Insecure(host)),
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    let trimmed = url.path().trim_end_matches('/').to_owned();
    url.set_path(&trimmed);
    Ok(url)
}

fn is_loopback(host: &str) -> bool {
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    host == "localhost"
        || host
            .parse::<std::net::IpAddr>()
            .is_ok_and(|ip| ip.is_loopback())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_https_accepted() {
        let url = validate_endpoint("https://movies.firebaseio.com").unwrap();
        assert_eq!(url.host_str(), Some("movies.firebaseio.com"));
    }

    #[test]
    fn test_http_loopback_accepted() {
        assert!(validate_endpoint("http://localhost:9000").is_ok());
        assert!(validate_endpoint("http://127.0.0.1:9000").is_ok());
        assert!(validate_endpoint("http://[::1]:9000").is_ok());
    }

    #[test]
    fn test_http_remote_rejected() {
        let err = validate_endpoint("http://www.omdbapi.com").unwrap_err();
        assert!(matches!(err, UrlValidationError::Insecure(_)));
    }

    #[test]
    fn test_other_schemes_rejected() {
        assert!(matches!(
            validate_endpoint("file:///etc/passwd"),
            Err(UrlValidationError::UnsupportedScheme(_) | UrlValidationError::MissingHost)
        ));
        assert!(matches!(
            validate_endpoint("ftp://example.com"),
            Err(UrlValidationError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_trailing_slash_stripped() {
        let url = validate_endpoint("https://example.com/api/").unwrap();
        assert_eq!(url.path(), "/api");
    }
}
