use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use url::Url;

use super::parsers::{absolutize, first_id, first_str, json_items, price_at, render_path, size_label};
use super::{search_query, store_base_url};
use crate::config::StoreConfig;
use crate::models::{NewProduct, Product};
use crate::plugins::{Platform, ProductExtractor};
use crate::scraper::StoreClient;
use crate::utils::error::{AppError, FetchError};

pub const DEFAULT_BASE_URL: &str = "https://www.footlocker.com";
pub const DEFAULT_SEARCH_PATH: &str = "/api/products/search?query={query}&count=20";
pub const DEFAULT_FALLBACK_QUERY: &str = "jordan";
const ONE_SIZE: &str = "One Size";

/// Footlocker product search API.
#[derive(Debug, Clone)]
pub struct FootlockerExtractor {
    site: String,
    base_url: Url,
    search_path: String,
    fallback_query: String,
}

impl FootlockerExtractor {
    pub fn new(store: &StoreConfig) -> Result<Self, AppError> {
        Ok(Self {
            site: store.name.clone(),
            base_url: store_base_url(store, Some(DEFAULT_BASE_URL))?,
            search_path: store
                .search_path
                .clone()
                .unwrap_or_else(|| DEFAULT_SEARCH_PATH.to_string()),
            fallback_query: store
                .fallback_query
                .clone()
                .unwrap_or_else(|| DEFAULT_FALLBACK_QUERY.to_string()),
        })
    }

    pub fn search_url(&self, query: &str) -> String {
        absolutize(&self.base_url, &render_path(&self.search_path, query))
    }

    /// Matching products from a search response. A response without a
    /// `results` array is unparsable.
    pub fn parse(&self, url: &str, body: &Value, keyword: &str) -> Result<Vec<Product>, FetchError> {
        Ok(json_items(url, body, &["results"])?
            .iter()
            .filter_map(|item| self.product(item))
            .filter(|product| product.matches_keyword(keyword))
            .collect())
    }

    fn product(&self, item: &Value) -> Option<Product> {
        let product_id = first_id(item, &["id", "productId"]);
        let slug = first_str(item, &["urlKey"])
            .map(str::to_string)
            .or_else(|| product_id.clone())?;
        let url = absolutize(&self.base_url, &format!("/product/~/{}.html", slug));
        let title = first_str(item, &["name"]).unwrap_or("Footlocker Product");

        let sizes: BTreeSet<String> = item
            .get("skuInfo")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter(|sku| sku.get("available").and_then(Value::as_bool).unwrap_or(false))
            .map(|sku| size_label(sku, &["size"]).unwrap_or_else(|| ONE_SIZE.to_string()))
            .collect();

        let (price, price_display) = item
            .get("price")
            .map(|price| price_at(price, &["currentPrice"]))
            .unwrap_or_default();

        Some(Product::new(NewProduct {
            title: title.to_string(),
            url: url.clone(),
            product_id,
            image: first_str(item, &["imageUrl"]).map(|src| absolutize(&self.base_url, src)),
            price,
            price_display,
            sizes,
            site: self.site.clone(),
            direct_link: Some(url),
        }))
    }
}

#[async_trait]
impl ProductExtractor for FootlockerExtractor {
    fn platform(&self) -> Platform {
        Platform::Footlocker
    }

    async fn extract(&self, client: &StoreClient, keyword: &str) -> Result<Vec<Product>, FetchError> {
        let Some(query) = search_query(keyword, Some(self.fallback_query.as_str())) else {
            return Ok(Vec::new());
        };
        let url = self.search_url(&query);
        let body = client.get_json(&url).await?;
        let products = self.parse(&url, &body, keyword)?;
        tracing::debug!("{}: {} products for '{}'", self.site, products.len(), query);
        Ok(products)
    }
}
