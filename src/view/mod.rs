//! Page-level state that ties the catalog and favorites together.
//!
//! A view owns everything it subscribes to. Dropping it aborts its catalog
//! fetches and releases its store subscriptions.

mod detail;
mod expansion;
mod home;

pub use detail::MovieDetailView;
pub use expansion::{ExpansionView, PREVIEW_LIMIT};
pub use home::HomeView;

use crate::catalog::{CatalogError, MovieSource, MovieSummary};
use crate::favorites::{FavoriteSyncController, FavoritesList, FavoritesStore, StoreError};
use crate::session::Session;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ViewError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ViewError::Catalog(CatalogError::NotFound(_)))
    }

    pub fn is_auth_required(&self) -> bool {
        matches!(self, ViewError::Store(StoreError::AuthRequired))
    }
}

/// Collaborators shared by every view of one signed-in (or anonymous) user.
#[derive(Clone)]
pub struct ViewContext {
    pub source: Arc<dyn MovieSource>,
    pub store: Arc<dyn FavoritesStore>,
    pub session: Option<Session>,
    pub settle_timeout: Duration,
}

impl std::fmt::Debug for ViewContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewContext")
            .field("session", &self.session)
            .field("settle_timeout", &self.settle_timeout)
            .finish_non_exhaustive()
    }
}

impl ViewContext {
    /// A controller bound to `movie` for this context's session.
    pub async fn favorite_controller(
        &self,
        movie: MovieSummary,
    ) -> Result<FavoriteSyncController, StoreError> {
        FavoriteSyncController::bind(
            Arc::clone(&self.store),
            self.session.clone(),
            movie,
            self.settle_timeout,
        )
        .await
    }

    pub async fn favorites(&self) -> Result<FavoritesList, StoreError> {
        FavoritesList::bind(Arc::clone(&self.store), self.session.as_ref()).await
    }
}
