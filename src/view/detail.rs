use crate::catalog::MovieDetail;
use crate::favorites::{FavoriteSyncController, StoreError, ToggleOutcome};
use crate::view::{ViewContext, ViewError};

/// One movie's detail record with its favorite control.
#[derive(Debug)]
pub struct MovieDetailView {
    detail: MovieDetail,
    favorite: FavoriteSyncController,
}

impl MovieDetailView {
    /// Looks the movie up, then binds its favorite status. Nothing is
    /// subscribed when the lookup fails.
    ///
    /// # Errors
    ///
    /// [`ViewError::Catalog`] with [`crate::catalog::CatalogError::NotFound`]
    /// for an unknown id; see [`ViewError::is_not_found`].
    pub async fn load(ctx: &ViewContext, movie_id: &str) -> Result<Self, ViewError> {
        let detail = ctx.source.detail(movie_id).await?;
        let favorite = ctx.favorite_controller(detail.summary()).await?;
        Ok(Self { detail, favorite })
    }

    pub fn detail(&self) -> &MovieDetail {
        &self.detail
    }

    pub fn favorite(&self) -> &FavoriteSyncController {
        &self.favorite
    }

    pub fn is_favorite(&self) -> bool {
        self.favorite.is_favorite()
    }

    pub async fn toggle_favorite(&self) -> Result<ToggleOutcome, StoreError> {
        self.favorite.toggle().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogError, MovieSource, MovieSummary};
    use crate::favorites::{FavoritesStore, MemoryFavoritesStore};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    struct OneMovie;

    #[async_trait]
    impl MovieSource for OneMovie {
        async fn search(&self, _term: &str) -> Result<Vec<MovieSummary>, CatalogError> {
            Ok(Vec::new())
        }

        async fn detail(&self, movie_id: &str) -> Result<MovieDetail, CatalogError> {
            if movie_id != "tt0113277" {
                return Err(CatalogError::NotFound(movie_id.to_string()));
            }
            let json = serde_json::json!({
                "imdbID": "tt0113277",
                "Title": "Heat",
                "Year": "1995",
                "Genre": "Action, Crime, Drama",
                "Poster": "N/A",
                "Type": "movie",
                "Response": "True"
            });
            Ok(serde_json::from_value(json).unwrap())
        }
    }

    fn context(store: &MemoryFavoritesStore) -> ViewContext {
        ViewContext {
            source: Arc::new(OneMovie),
            store: Arc::new(store.clone()) as Arc<dyn FavoritesStore>,
            session: Some(store.sign_in("u1")),
            settle_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_load_and_favorite() {
        let store = MemoryFavoritesStore::new();
        let view = MovieDetailView::load(&context(&store), "tt0113277")
            .await
            .unwrap();
        assert_eq!(view.detail().title, "Heat");
        assert_eq!(view.detail().genres(), vec!["Action", "Crime", "Drama"]);

        view.favorite().ready().await.unwrap();
        assert_eq!(view.toggle_favorite().await.unwrap(), ToggleOutcome::Added);
        assert!(view.is_favorite());

        let stored = store.contents("u1");
        assert_eq!(stored["tt0113277"].title, "Heat");
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let store = MemoryFavoritesStore::new();
        let err = MovieDetailView::load(&context(&store), "tt404")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.subscriber_count(), 0);
    }
}
