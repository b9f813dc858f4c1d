//! Per-user favorites kept in a remote, push-notifying store.
//!
//! - `store` - the store contract and the [`Subscription`] handle
//! - `memory` - in-process store, used offline and in tests
//! - `rest` - HTTP store with `text/event-stream` subscriptions
//! - `sync` - one movie's favorite status plus toggling
//! - `list` - the whole favorite set with sorting and stats
//!
//! The store is the only shared state. Views hold subscriptions and render
//! whatever the store last delivered; nothing is updated optimistically.

mod event_stream;
mod list;
mod memory;
mod rest;
mod store;
mod sync;
mod types;

pub use list::{
    sort_records, FavoriteStats, FavoritesList, FavoritesState, SortOrder,
    RECENT_YEAR_THRESHOLD,
};
pub use memory::MemoryFavoritesStore;
pub use rest::RestFavoritesStore;
pub use store::{FavoritesStore, Subscription};
pub use sync::{FavoriteSyncController, ToggleOutcome, DEFAULT_SETTLE_TIMEOUT};
pub use types::{FavoriteRecord, FavoriteSet, FavoriteSnapshot, StoreError};
