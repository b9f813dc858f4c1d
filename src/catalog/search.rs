use crate::catalog::source::MovieSource;
use crate::catalog::types::MovieSummary;
use std::sync::Arc;
use tokio::sync::watch;

/// How the most recently applied search ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Nothing submitted yet, or cleared.
    #[default]
    Idle,
    Loaded,
    Empty,
    Failed(String),
}

/// Published search state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchState {
    pub query: String,
    pub results: Vec<MovieSummary>,
    pub loading: bool,
    pub outcome: SearchOutcome,
    generation: u64,
}

impl SearchState {
    /// Generation of the latest submission; every submit or clear bumps it.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// On-demand search against the catalog.
///
/// Every submission takes the next generation number. A response is applied
/// only if its generation is still the latest when it arrives, so the
/// last-submitted query wins even when responses arrive out of order.
pub struct SearchController {
    source: Arc<dyn MovieSource>,
    state: watch::Sender<SearchState>,
}

impl SearchController {
    pub fn new(source: Arc<dyn MovieSource>) -> Self {
        let (state, _) = watch::channel(SearchState::default());
        Self { source, state }
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SearchState {
        self.state.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// Runs one search.
    ///
    /// An empty or whitespace-only query clears the results without touching
    /// the network. Returns the outcome that was applied, or `None` when a
    /// newer submission superseded this one before its response arrived.
    pub async fn submit(&self, query: &str) -> Option<SearchOutcome> {
        let query = query.trim();

        if query.is_empty() {
            self.state.send_modify(|state| {
                state.generation += 1;
                state.query.clear();
                state.results.clear();
                state.loading = false;
                state.outcome = SearchOutcome::Empty;
            });
            return Some(SearchOutcome::Empty);
        }

        let mut generation = 0;
        self.state.send_modify(|state| {
            state.generation += 1;
            generation = state.generation;
            state.query = query.to_string();
            state.loading = true;
        });

        let result = self.source.search(query).await;

        let (results, outcome) = match result {
            Ok(items) if items.is_empty() => (items, SearchOutcome::Empty),
            Ok(items) => (items, SearchOutcome::Loaded),
            Err(e) => {
                tracing::warn!(query = %query, error = %e, "Search failed");
                (Vec::new(), SearchOutcome::Failed(e.to_string()))
            }
        };

        let mut applied = false;
        self.state.send_if_modified(|state| {
            if state.generation != generation {
                return false;
            }
            state.results = results;
            state.loading = false;
            state.outcome = outcome.clone();
            applied = true;
            true
        });

        if applied {
            Some(outcome)
        } else {
            tracing::debug!(
                query = %query,
                generation = generation,
                "Discarding superseded search response"
            );
            None
        }
    }

    /// Resets the query and results, invalidating any in-flight request.
    pub fn clear(&self) {
        self.state.send_modify(|state| {
            state.generation += 1;
            state.query.clear();
            state.results.clear();
            state.loading = false;
            state.outcome = SearchOutcome::Idle;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::client::CatalogError;
    use crate::catalog::types::MovieDetail;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn movie(id: &str, title: &str) -> MovieSummary {
        MovieSummary {
            id: id.into(),
            title: title.into(),
            year: "1999".into(),
            poster_url: "N/A".into(),
            kind: "movie".into(),
        }
    }

    /// Answers `slow` after 500ms and anything else after 10ms; counts calls.
    #[derive(Default)]
    struct TimedSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MovieSource for TimedSource {
        async fn search(&self, term: &str) -> Result<Vec<MovieSummary>, CatalogError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match term {
                "slow" => {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok(vec![movie("s1", "Slow Burn")])
                }
                "broken" => Err(CatalogError::HttpStatus(502)),
                "nothing" => Ok(Vec::new()),
                _ => {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(vec![movie("f1", "Fast Five")])
                }
            }
        }

        async fn detail(&self, movie_id: &str) -> Result<MovieDetail, CatalogError> {
            Err(CatalogError::NotFound(movie_id.to_string()))
        }
    }

    #[tokio::test]
    async fn test_blank_query_skips_network() {
        let source = Arc::new(TimedSource::default());
        let controller = SearchController::new(source.clone());

        assert_eq!(controller.submit("   ").await, Some(SearchOutcome::Empty));
        assert_eq!(controller.submit("").await, Some(SearchOutcome::Empty));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert!(controller.state().results.is_empty());
        assert!(!controller.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_replace_previous() {
        let controller = SearchController::new(Arc::new(TimedSource::default()));
        assert_eq!(controller.submit("fast").await, Some(SearchOutcome::Loaded));
        let state = controller.state();
        assert_eq!(state.query, "fast");
        assert_eq!(state.results[0].title, "Fast Five");
        assert!(!state.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_submitted_query_wins() {
        let controller = Arc::new(SearchController::new(Arc::new(TimedSource::default())));

        let slow = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.submit("slow").await })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        let fast = controller.submit("fast").await;

        assert_eq!(fast, Some(SearchOutcome::Loaded));
        // The older request resolves last and must not overwrite the newer one.
        assert_eq!(slow.await.unwrap(), None);

        let state = controller.state();
        assert_eq!(state.query, "fast");
        assert_eq!(state.results[0].id, "f1");
        assert!(!state.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_renders_empty_but_is_distinguishable() {
        let controller = SearchController::new(Arc::new(TimedSource::default()));

        let failed = controller.submit("broken").await.unwrap();
        assert!(matches!(failed, SearchOutcome::Failed(_)));
        assert!(controller.state().results.is_empty());

        assert_eq!(controller.submit("nothing").await, Some(SearchOutcome::Empty));
        assert!(controller.state().results.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_discards_in_flight_response() {
        let controller = Arc::new(SearchController::new(Arc::new(TimedSource::default())));
        let pending = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.submit("slow").await })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(controller.is_loading());

        controller.clear();
        assert_eq!(pending.await.unwrap(), None);

        let state = controller.state();
        assert_eq!(state.outcome, SearchOutcome::Idle);
        assert!(state.results.is_empty());
        assert!(!state.loading);
    }
}
