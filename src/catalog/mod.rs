//! Catalog access: the external movie API and the views built on it.
//!
//! - `client` - HTTP client for search and detail lookups, with timeouts,
//!   retry and backoff
//! - `aggregator` - concurrent per-category fetches joined behind a single
//!   loading barrier
//! - `search` - on-demand search where the last submission wins
//! - `types` - movie summaries, detail records and category configuration
//!
//! # Example
//!
//! ```ignore
//! use marquee::catalog::{CatalogAggregator, CategorySpec};
//!
//! let aggregator = Arc::new(CatalogAggregator::new(source, CategorySpec::defaults(), 10)?);
//! let handle = aggregator.spawn();
//! handle.join().await;
//! for category in aggregator.state().results() { /* ... */ }
//! ```

mod aggregator;
mod client;
mod search;
mod source;
mod types;

pub use aggregator::{
    AggregationHandle, CatalogAggregator, CatalogState, CategoryOutcome, CategoryResult,
    DEFAULT_MAX_CONCURRENT,
};
pub use client::{CatalogClient, CatalogError};
pub use search::{SearchController, SearchOutcome, SearchState};
pub use source::MovieSource;
pub use types::{leading_year, CategorySpec, MovieDetail, MovieSummary, Rating, MISSING_VALUE};
