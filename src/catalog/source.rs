use async_trait::async_trait;

use crate::catalog::client::{CatalogClient, CatalogError};
use crate::catalog::types::{MovieDetail, MovieSummary};

/// The external catalog as seen by the aggregator, search and detail views.
///
/// [`CatalogClient`] is the production implementation; tests substitute
/// scripted sources to control timing and failures.
#[async_trait]
pub trait MovieSource: Send + Sync {
    async fn search(&self, term: &str) -> Result<Vec<MovieSummary>, CatalogError>;

    async fn detail(&self, movie_id: &str) -> Result<MovieDetail, CatalogError>;
}

#[async_trait]
impl MovieSource for CatalogClient {
    async fn search(&self, term: &str) -> Result<Vec<MovieSummary>, CatalogError> {
        CatalogClient::search(self, term).await
    }

    async fn detail(&self, movie_id: &str) -> Result<MovieDetail, CatalogError> {
        CatalogClient::detail(self, movie_id).await
    }
}
