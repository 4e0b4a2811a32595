use async_trait::async_trait;

use crate::models::Product;
use crate::plugins::Platform;
use crate::scraper::StoreClient;
use crate::utils::error::FetchError;

/// One storefront platform's way of turning a keyword into products.
///
/// An empty result is a normal outcome. Failures must be classified so the
/// retry policy can tell a rate limit from a dead page.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductExtractor: Send + Sync {
    fn platform(&self) -> Platform;

    async fn extract(&self, client: &StoreClient, keyword: &str)
    -> Result<Vec<Product>, FetchError>;
}
