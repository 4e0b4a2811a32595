use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use url::Url;

use super::parsers::{absolutize, first_id, first_str, next_data_items, price_at, render_path, size_label};
use super::{search_query, store_base_url};
use crate::config::StoreConfig;
use crate::models::{NewProduct, Product};
use crate::plugins::{Platform, ProductExtractor};
use crate::scraper::StoreClient;
use crate::utils::error::{AppError, FetchError};

pub const DEFAULT_BASE_URL: &str = "https://www.nike.com";
pub const DEFAULT_SEARCH_PATH: &str = "/w?q={query}";

const WALL_PRODUCTS: [&str; 6] = ["props", "pageProps", "initialState", "Wall", "products", "products"];

/// Nike search wall, read from the embedded `__NEXT_DATA__` payload.
#[derive(Debug, Clone)]
pub struct NikeExtractor {
    site: String,
    base_url: Url,
    search_path: String,
    fallback_query: Option<String>,
}

impl NikeExtractor {
    pub fn new(store: &StoreConfig) -> Result<Self, AppError> {
        Ok(Self {
            site: store.name.clone(),
            base_url: store_base_url(store, Some(DEFAULT_BASE_URL))?,
            search_path: store
                .search_path
                .clone()
                .unwrap_or_else(|| DEFAULT_SEARCH_PATH.to_string()),
            fallback_query: store.fallback_query.clone(),
        })
    }

    pub fn search_url(&self, query: &str) -> String {
        absolutize(&self.base_url, &render_path(&self.search_path, query))
    }

    /// Products on the wall that match `keyword`.
    ///
    /// A page without a readable wall payload is a permanent failure: the
    /// layout changed and retrying will not help.
    pub fn parse(&self, url: &str, html: &str, keyword: &str) -> Result<Vec<Product>, FetchError> {
        Ok(next_data_items(url, html, &WALL_PRODUCTS)?
            .iter()
            .filter_map(|item| self.product(item))
            .filter(|product| product.matches_keyword(keyword))
            .collect())
    }

    fn product(&self, item: &Value) -> Option<Product> {
        let title = first_str(item, &["title", "fullTitle"])?;
        let url = first_str(item, &["pdpUrl"])
            .map(|u| absolutize(&self.base_url, u))
            .unwrap_or_default();
        let product_id = first_id(item, &["productCode", "id"]);
        if url.is_empty() && product_id.is_none() {
            tracing::debug!("{}: skipping '{}' with no url or id", self.site, title);
            return None;
        }

        let (price, price_display) = item
            .get("price")
            .map(|price| price_at(price, &["currentRetailPrice", "msrp"]))
            .unwrap_or_default();

        let sizes: BTreeSet<String> = item
            .get("skus")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter(|sku| sku.get("available").and_then(Value::as_bool).unwrap_or(false))
            .filter_map(|sku| size_label(sku, &["nikeSize", "sizeDescription"]))
            .collect();

        Some(Product::new(NewProduct {
            title: title.to_string(),
            url,
            product_id,
            image: first_str(item, &["imageUrl"]).map(str::to_string),
            price,
            price_display,
            sizes,
            site: self.site.clone(),
            direct_link: None,
        }))
    }
}

#[async_trait]
impl ProductExtractor for NikeExtractor {
    fn platform(&self) -> Platform {
        Platform::Nike
    }

    async fn extract(&self, client: &StoreClient, keyword: &str) -> Result<Vec<Product>, FetchError> {
        let Some(query) = search_query(keyword, self.fallback_query.as_deref()) else {
            return Ok(Vec::new());
        };
        let url = self.search_url(&query);
        let html = client.get_text(&url).await?;
        let products = self.parse(&url, &html, keyword)?;
        tracing::debug!("{}: {} products for '{}'", self.site, products.len(), query);
        Ok(products)
    }
}
