use crate::catalog::leading_year;
use crate::favorites::store::FavoritesStore;
use crate::favorites::types::{FavoriteRecord, FavoriteSet, StoreError};
use crate::session::Session;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use unicase::UniCase;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Releases from this year on count as recent in [`FavoriteStats`].
pub const RECENT_YEAR_THRESHOLD: u32 = 2020;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Most recently added first; the initial set keeps store order.
    #[default]
    Recent,
    /// Title A-Z, ignoring case and accents.
    Alphabetical,
    /// Newest release year first; titles without a numeric year go last.
    Year,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "recent" => Ok(SortOrder::Recent),
            "alphabetical" | "title" => Ok(SortOrder::Alphabetical),
            "year" => Ok(SortOrder::Year),
            other => Err(format!(
                "unknown sort order '{other}' (expected recent, alphabetical or year)"
            )),
        }
    }
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SortOrder::Recent => "recent",
            SortOrder::Alphabetical => "alphabetical",
            SortOrder::Year => "year",
        })
    }
}

/// Primary collation key of a title: canonical decomposition with the
/// combining marks removed, so "Élite" files next to "Elite" instead of
/// after "Z".
///
/// # Edge Case Behavior
///
/// - Precomposed and decomposed spellings of the same title get equal keys
/// - Letters without a decomposition (`ø`, `ß`) are kept as they are and
///   ordered by case folding alone
fn collation_key(title: &str) -> UniCase<String> {
    UniCase::new(title.nfd().filter(|c| !is_combining_mark(*c)).collect())
}

/// Accent- and case-insensitive first; ties fall back to case-insensitive
/// with accents, then the raw title, then the id, so the order is total.
fn alphabetical(a: &FavoriteRecord, b: &FavoriteRecord) -> Ordering {
    collation_key(&a.title)
        .cmp(&collation_key(&b.title))
        .then_with(|| UniCase::new(a.title.as_str()).cmp(&UniCase::new(b.title.as_str())))
        .then_with(|| a.title.cmp(&b.title))
        .then_with(|| a.movie_id.cmp(&b.movie_id))
}

fn newest_first(a: &FavoriteRecord, b: &FavoriteRecord) -> Ordering {
    leading_year(&b.year).cmp(&leading_year(&a.year))
}

/// Sorts in place. Both comparators are stable; the alphabetical one is also
/// total, so its result does not depend on input order.
pub fn sort_records(records: &mut [FavoriteRecord], order: SortOrder) {
    match order {
        SortOrder::Recent => {}
        SortOrder::Alphabetical => records.sort_by(alphabetical),
        SortOrder::Year => records.sort_by(newest_first),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FavoriteStats {
    pub total: usize,
    /// Distinct raw year strings, so "2019" and "2019–2021" count apart.
    pub distinct_years: usize,
    pub recent: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoritesState {
    /// True until the first snapshot arrives.
    pub loading: bool,
    entries: Vec<FavoriteRecord>,
}

impl Default for FavoritesState {
    fn default() -> Self {
        Self {
            loading: true,
            entries: Vec::new(),
        }
    }
}

impl FavoritesState {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, movie_id: &str) -> bool {
        self.entries.iter().any(|r| r.movie_id == movie_id)
    }

    pub fn sorted(&self, order: SortOrder) -> Vec<FavoriteRecord> {
        let mut records = self.entries.clone();
        sort_records(&mut records, order);
        records
    }

    pub fn stats(&self) -> FavoriteStats {
        let years: HashSet<&str> = self.entries.iter().map(|r| r.year.as_str()).collect();
        FavoriteStats {
            total: self.entries.len(),
            distinct_years: years.len(),
            recent: self
                .entries
                .iter()
                .filter(|r| leading_year(&r.year).is_some_and(|y| y >= RECENT_YEAR_THRESHOLD))
                .count(),
        }
    }

    /// Replaces the contents with `set`. Keys not seen before go to the
    /// front; known keys keep their place with their latest value.
    fn apply(&mut self, mut set: FavoriteSet) {
        let kept: Vec<FavoriteRecord> = std::mem::take(&mut self.entries)
            .into_iter()
            .filter_map(|old| set.remove(&old.movie_id))
            .collect();
        self.entries = set.into_values().chain(kept).collect();
        self.loading = false;
    }
}

/// The signed-in user's whole favorite set, kept live.
///
/// Dropping the list releases its subscription.
pub struct FavoritesList {
    state: watch::Receiver<FavoritesState>,
    pump: Option<JoinHandle<()>>,
}

impl FavoritesList {
    /// Without a session the list is empty and not loading.
    pub async fn bind(
        store: Arc<dyn FavoritesStore>,
        session: Option<&Session>,
    ) -> Result<Self, StoreError> {
        let Some(session) = session else {
            let (_tx, rx) = watch::channel(FavoritesState {
                loading: false,
                entries: Vec::new(),
            });
            return Ok(Self {
                state: rx,
                pump: None,
            });
        };

        let mut subscription = store.subscribe_all(session).await?;
        let (tx, rx) = watch::channel(FavoritesState::default());
        let user_id = session.user_id().to_string();
        let pump = tokio::spawn(async move {
            while let Some(set) = subscription.next().await {
                tx.send_modify(|state| state.apply(set));
            }
            tracing::debug!(user_id = %user_id, "Favorites list subscription ended");
        });

        Ok(Self {
            state: rx,
            pump: Some(pump),
        })
    }

    pub fn state(&self) -> FavoritesState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FavoritesState> {
        self.state.clone()
    }

    /// Waits until the first snapshot has been applied.
    ///
    /// # Errors
    ///
    /// [`StoreError::Closed`] when the subscription ended first.
    pub async fn ready(&self) -> Result<FavoritesState, StoreError> {
        let mut state = self.state.clone();
        let ready = state
            .wait_for(|s| !s.loading)
            .await
            .map_err(|_| StoreError::Closed)?;
        Ok(ready.clone())
    }
}

impl Drop for FavoritesList {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}
