//! Utility functions shared by the catalog and favorites clients.
//!
//! - **HTTP**: client construction, retry policy and size-limited body reads
//! - **Endpoint validation**: https-only service URLs (loopback excepted)
//! - **Text**: width-aware truncation and control-character stripping for
//!   terminal output

mod http;
mod text;
mod url_validator;

pub use http::{build_client, read_limited_bytes, BodyError, RetryPolicy};
pub use text::{display_width, strip_control_chars, truncate_to_width};
pub use url_validator::{validate_endpoint, UrlValidationError};

/// Maximum accepted search query length, in characters.
pub const MAX_SEARCH_QUERY_LENGTH: usize = 256;
