use crate::catalog::client::CatalogError;
use crate::catalog::source::MovieSource;
use crate::catalog::types::{CategorySpec, MovieSummary};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default number of category fetches allowed in flight at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// How a category fetch ended.
///
/// Rendering treats `Empty` and `Failed` alike ("no movies found"); the
/// distinction exists for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryOutcome {
    Pending,
    Loaded,
    Empty,
    Failed(String),
}

/// Result slot for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryResult {
    pub label: String,
    pub items: Vec<MovieSummary>,
    pub settled: bool,
    pub outcome: CategoryOutcome,
}

impl CategoryResult {
    fn pending(label: &str) -> Self {
        Self {
            label: label.to_string(),
            items: Vec::new(),
            settled: false,
            outcome: CategoryOutcome::Pending,
        }
    }

    fn settle(label: String, result: Result<Vec<MovieSummary>, CatalogError>) -> Self {
        let (items, outcome) = match result {
            Ok(items) if items.is_empty() => (items, CategoryOutcome::Empty),
            Ok(items) => (items, CategoryOutcome::Loaded),
            Err(e) => (Vec::new(), CategoryOutcome::Failed(e.to_string())),
        };
        Self {
            label,
            items,
            settled: true,
            outcome,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, CategoryOutcome::Failed(_))
    }
}

/// Published state of one aggregation run.
///
/// `loading` is a barrier: it stays true until every category of the
/// current run has settled, even though individual `settled` flags flip as
/// fetches complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogState {
    pub loading: bool,
    /// Run that owns the slots. Writes from older runs are dropped.
    generation: u64,
    results: Vec<CategoryResult>,
}

impl CatalogState {
    fn pending(categories: &[CategorySpec], generation: u64) -> Self {
        Self {
            loading: true,
            generation,
            results: categories
                .iter()
                .map(|c| CategoryResult::pending(&c.label))
                .collect(),
        }
    }

    /// Number of runs started so far; 0 before the first.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Results in configured category order.
    pub fn results(&self) -> &[CategoryResult] {
        &self.results
    }

    pub fn get(&self, label: &str) -> Option<&CategoryResult> {
        self.results.iter().find(|r| r.label == label)
    }

    pub fn settled_count(&self) -> usize {
        self.results.iter().filter(|r| r.settled).count()
    }
}

/// Fans one search per category out to the catalog and joins the results.
///
/// Each category is fetched and stored independently: a failure in one never
/// touches another's slot. State is published through a `watch` channel;
/// observers see per-category progress and the overall barrier flag.
pub struct CatalogAggregator {
    source: Arc<dyn MovieSource>,
    categories: Vec<CategorySpec>,
    max_concurrent: usize,
    state: watch::Sender<CatalogState>,
}

impl CatalogAggregator {
    /// # Errors
    ///
    /// [`CatalogError::DuplicateCategory`] when two categories share a label.
    pub fn new(
        source: Arc<dyn MovieSource>,
        categories: Vec<CategorySpec>,
        max_concurrent: usize,
    ) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for category in &categories {
            if !seen.insert(category.label.as_str()) {
                return Err(CatalogError::DuplicateCategory(category.label.clone()));
            }
        }

        let (state, _) = watch::channel(CatalogState::pending(&categories, 0));
        Ok(Self {
            source,
            categories,
            max_concurrent: max_concurrent.max(1),
            state,
        })
    }

    pub fn categories(&self) -> &[CategorySpec] {
        &self.categories
    }

    /// Receiver that observes every state change of subsequent runs.
    pub fn subscribe(&self) -> watch::Receiver<CatalogState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> CatalogState {
        self.state.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// Fetches every category and returns the final state.
    ///
    /// All slots are reset to pending first, so a second run behaves like a
    /// refresh. Completes only when every fetch has settled.
    ///
    /// Starting a run supersedes any run still in progress: the older run
    /// stops issuing fetches, and its results and its final `loading` flip
    /// are discarded.
    pub async fn run(&self) -> CatalogState {
        let total = self.categories.len();
        let mut generation = 0;
        self.state.send_modify(|state| {
            generation = state.generation + 1;
            *state = CatalogState::pending(&self.categories, generation);
        });
        let is_current = || self.state.borrow().generation == generation;
        tracing::debug!(categories = total, generation, "Starting catalog aggregation");

        stream::iter(self.categories.iter().cloned().enumerate())
            .map(|(idx, category)| {
                let source = Arc::clone(&self.source);
                let current = is_current();
                async move {
                    if !current {
                        return None;
                    }
                    let result = source.search(&category.query_term).await;
                    Some((idx, category.label, result))
                }
            })
            .buffer_unordered(self.max_concurrent)
            .for_each(|settled| {
                if let Some((idx, label, result)) = settled {
                    if let Err(e) = &result {
                        tracing::warn!(category = %label, error = %e, "Category fetch failed");
                    }
                    let slot = CategoryResult::settle(label, result);
                    self.state.send_if_modified(|state| {
                        if state.generation != generation {
                            return false;
                        }
                        state.results[idx] = slot;
                        true
                    });
                }
                futures::future::ready(())
            })
            .await;

        let finished = self.state.send_if_modified(|state| {
            if state.generation != generation {
                return false;
            }
            state.loading = false;
            true
        });
        if !finished {
            tracing::debug!(generation, "Catalog aggregation superseded by a newer run");
            return self.state();
        }

        let state = self.state();
        let failed = state.results().iter().filter(|r| r.is_failed()).count();
        tracing::info!(
            categories = total,
            failed = failed,
            "Catalog aggregation complete"
        );
        state
    }

    /// Runs the aggregation on a background task.
    ///
    /// Dropping the returned handle aborts outstanding fetches.
    pub fn spawn(self: &Arc<Self>) -> AggregationHandle {
        let this = Arc::clone(self);
        AggregationHandle {
            task: tokio::spawn(async move {
                this.run().await;
            }),
        }
    }
}

/// Owns a background aggregation run; aborts it on drop.
pub struct AggregationHandle {
    task: JoinHandle<()>,
}

impl AggregationHandle {
    /// Waits for the run to settle every category.
    pub async fn join(mut self) {
        if let Err(e) = (&mut self.task).await {
            if !e.is_cancelled() {
                tracing::error!(error = %e, "Catalog aggregation task panicked");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for AggregationHandle {
    fn drop(&mut self) {
        if !self.task.is_finished() {
            self.task.abort();
            tracing::debug!("Aborted catalog aggregation on drop");
        }
    }
}
