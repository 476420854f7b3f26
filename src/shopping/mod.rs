pub mod serpapi;

pub use serpapi::SerpApiClient;

use crate::models::PriceRecord;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("empty search query")]
    EmptyQuery,
    #[error("search request failed: {0}")]
    Request(String),
    #[error("invalid search response: {0}")]
    Deserialize(String),
}

/// Shopping-search service. Listings come back in the service's own ranking.
#[async_trait]
pub trait ShoppingSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<PriceRecord>, SearchError>;
}
