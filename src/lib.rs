//! Movie catalog browsing with favorites kept in sync through a realtime store.
//!
//! - [`catalog`] - catalog API client, category aggregation and search
//! - [`favorites`] - per-user favorites store, sync controllers and lists
//! - [`view`] - page-level composition (home, detail, expansion state)
//! - [`session`] - the explicit signed-in user passed to favorites operations
//! - [`config`] - optional TOML configuration
//! - [`util`] - HTTP, endpoint validation and terminal text helpers

pub mod catalog;
pub mod config;
pub mod favorites;
pub mod session;
pub mod util;
pub mod view;

pub use session::Session;
