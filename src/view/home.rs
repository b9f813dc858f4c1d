use crate::catalog::{
    AggregationHandle, CatalogAggregator, CatalogError, CatalogState, CategorySpec, MovieSummary,
    SearchController, SearchOutcome, SearchState,
};
use crate::favorites::{FavoriteSyncController, StoreError};
use crate::view::expansion::ExpansionView;
use crate::view::ViewContext;
use std::sync::Arc;
use tokio::sync::watch;

/// The catalog home page: category rows, a search box and per-row expansion.
///
/// Category fetches start when the view is mounted and are aborted when it
/// is dropped.
pub struct HomeView {
    ctx: ViewContext,
    aggregator: Arc<CatalogAggregator>,
    search: SearchController,
    expansion: ExpansionView,
    run: Option<AggregationHandle>,
}

impl HomeView {
    /// Builds the view and starts fetching every category in the background.
    ///
    /// # Errors
    ///
    /// [`CatalogError::DuplicateCategory`] when two categories share a label.
    pub fn mount(
        ctx: ViewContext,
        categories: Vec<CategorySpec>,
        max_concurrent: usize,
    ) -> Result<Self, CatalogError> {
        let aggregator = Arc::new(CatalogAggregator::new(
            Arc::clone(&ctx.source),
            categories,
            max_concurrent,
        )?);
        let search = SearchController::new(Arc::clone(&ctx.source));
        let run = Some(aggregator.spawn());

        Ok(Self {
            ctx,
            aggregator,
            search,
            expansion: ExpansionView::new(),
            run,
        })
    }

    pub fn context(&self) -> &ViewContext {
        &self.ctx
    }

    pub fn catalog(&self) -> CatalogState {
        self.aggregator.state()
    }

    pub fn subscribe_catalog(&self) -> watch::Receiver<CatalogState> {
        self.aggregator.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.aggregator.is_loading()
    }

    /// Waits until every category has settled.
    pub async fn loaded(&self) -> CatalogState {
        let mut rx = self.aggregator.subscribe();
        let state = match rx.wait_for(|state| !state.loading).await {
            Ok(state) => state.clone(),
            // the aggregator outlives this borrow, so the sender cannot be gone
            Err(_) => self.aggregator.state(),
        };
        state
    }

    /// Starts a fresh run, aborting the current one if it is still going.
    pub fn refresh(&mut self) {
        self.run = None;
        self.run = Some(self.aggregator.spawn());
    }

    pub async fn search(&self, query: &str) -> Option<SearchOutcome> {
        self.search.submit(query).await
    }

    pub fn search_state(&self) -> SearchState {
        self.search.state()
    }

    pub fn subscribe_search(&self) -> watch::Receiver<SearchState> {
        self.search.subscribe()
    }

    pub fn clear_search(&self) {
        self.search.clear();
    }

    pub fn expansion(&self) -> &ExpansionView {
        &self.expansion
    }

    pub fn toggle_expanded(&mut self, label: &str) -> bool {
        self.expansion.toggle(label)
    }

    /// Items of one category as currently rendered: capped unless expanded,
    /// empty for unknown, pending, empty and failed categories alike.
    pub fn visible_items(&self, label: &str) -> Vec<MovieSummary> {
        let state = self.aggregator.state();
        state
            .get(label)
            .map(|result| self.expansion.visible_items(label, &result.items).to_vec())
            .unwrap_or_default()
    }

    pub fn hidden_count(&self, label: &str) -> usize {
        let state = self.aggregator.state();
        state
            .get(label)
            .map(|result| self.expansion.hidden_count(label, &result.items))
            .unwrap_or(0)
    }

    /// A favorite controller for one rendered entry.
    pub async fn controller_for(
        &self,
        movie: &MovieSummary,
    ) -> Result<FavoriteSyncController, StoreError> {
        self.ctx.favorite_controller(movie.clone()).await
    }
}

impl std::fmt::Debug for HomeView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HomeView")
            .field("ctx", &self.ctx)
            .field("loading", &self.is_loading())
            .field("expansion", &self.expansion)
            .finish_non_exhaustive()
    }
}
