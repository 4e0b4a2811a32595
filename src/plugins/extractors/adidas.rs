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

pub const DEFAULT_BASE_URL: &str = "https://www.adidas.com";
pub const DEFAULT_SEARCH_PATH: &str =
    "/api/plp/content-engine?sitePath=us&query={query}&start=0&count=48";
pub const DEFAULT_FALLBACK_QUERY: &str = "yeezy";

const GRID_ITEMS: [&str; 2] = ["grid", "items"];

/// Adidas product listing API.
#[derive(Debug, Clone)]
pub struct AdidasExtractor {
    site: String,
    base_url: Url,
    search_path: String,
    fallback_query: String,
}

impl AdidasExtractor {
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

    pub fn parse(&self, url: &str, body: &Value, keyword: &str) -> Result<Vec<Product>, FetchError> {
        Ok(json_items(url, body, &GRID_ITEMS)?
            .iter()
            .filter_map(|item| self.product(item))
            .filter(|product| product.matches_keyword(keyword))
            .collect())
    }

    fn product(&self, item: &Value) -> Option<Product> {
        let product_id = first_id(item, &["id", "model_number"]);
        let url = first_str(item, &["link"])
            .map(|link| absolutize(&self.base_url, link))
            .unwrap_or_default();
        if url.is_empty() && product_id.is_none() {
            return None;
        }

        // Variants report "IN_STOCK", "NOT_AVAILABLE" or "PREVIEW".
        let sizes: BTreeSet<String> = item
            .pointer("/availability/variation_list")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter(|variant| variant.get("availability").and_then(Value::as_str) == Some("IN_STOCK"))
            .map(|variant| size_label(variant, &["size", "sku"]).unwrap_or_else(|| "OS".to_string()))
            .collect();

        let (price, price_display) = item
            .get("price")
            .map(|price| price_at(price, &["current_price"]))
            .unwrap_or_default();

        Some(Product::new(NewProduct {
            title: first_str(item, &["name"]).unwrap_or("Adidas Product").to_string(),
            url: url.clone(),
            product_id,
            image: item
                .pointer("/image/src")
                .and_then(Value::as_str)
                .map(|src| absolutize(&self.base_url, src)),
            price,
            price_display,
            sizes,
            site: self.site.clone(),
            direct_link: Some(url),
        }))
    }
}

#[async_trait]
impl ProductExtractor for AdidasExtractor {
    fn platform(&self) -> Platform {
        Platform::Adidas
    }

    async fn extract(&self, client: &StoreClient, keyword: &str) -> Result<Vec<Product>, FetchError> {
        let Some(query) = search_query(keyword, Some(self.fallback_query.as_str())) else {
            return Ok(Vec::new());
        };
        let url = self.search_url(&query);
        let body = client.get_json(&url).await?;
        self.parse(&url, &body, keyword)
    }
}
