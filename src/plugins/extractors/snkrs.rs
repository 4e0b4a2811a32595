use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use url::Url;

use super::parsers::{absolutize, first_id, first_str, next_data_items, price_at, size_label};
use super::store_base_url;
use crate::config::StoreConfig;
use crate::models::{NewProduct, Product};
use crate::plugins::{Platform, ProductExtractor};
use crate::scraper::StoreClient;
use crate::utils::error::{AppError, FetchError};

pub const DEFAULT_BASE_URL: &str = "https://www.nike.com";
pub const DEFAULT_CATALOG_PATH: &str = "/launch";

const THREADS: [&str; 5] = ["props", "pageProps", "initialState", "threads", "objects"];

static NULL: Value = Value::Null;

/// SNKRS launch calendar. Every keyword reads the same feed page.
#[derive(Debug, Clone)]
pub struct SnkrsExtractor {
    site: String,
    base_url: Url,
    catalog_path: String,
}

impl SnkrsExtractor {
    pub fn new(store: &StoreConfig) -> Result<Self, AppError> {
        Ok(Self {
            site: store.name.clone(),
            base_url: store_base_url(store, Some(DEFAULT_BASE_URL))?,
            catalog_path: store
                .catalog_path
                .clone()
                .unwrap_or_else(|| DEFAULT_CATALOG_PATH.to_string()),
        })
    }

    pub fn catalog_url(&self) -> String {
        absolutize(&self.base_url, &self.catalog_path)
    }

    pub fn parse(&self, url: &str, html: &str, keyword: &str) -> Result<Vec<Product>, FetchError> {
        Ok(next_data_items(url, html, &THREADS)?
            .iter()
            .filter_map(|thread| self.product(thread))
            .filter(|product| product.matches_keyword(keyword))
            .collect())
    }

    fn product(&self, thread: &Value) -> Option<Product> {
        let info = thread.pointer("/productInfo/0").unwrap_or(&NULL);
        let merch = info.get("merchProduct").unwrap_or(&NULL);

        let title = first_str(merch, &["label"]).or_else(|| first_str(thread, &["title"]))?;
        let url = info
            .pointer("/launchView/productUrl")
            .and_then(Value::as_str)
            .or_else(|| first_str(thread, &["url"]))
            .map(|u| absolutize(&self.base_url, u))
            .unwrap_or_default();
        let product_id = first_id(merch, &["styleColor", "id"]);
        if url.is_empty() && product_id.is_none() {
            return None;
        }

        let (price, price_display) = merch
            .get("price")
            .map(|price| price_at(price, &["currentRetailPrice", "msrp"]))
            .unwrap_or_default();

        let sizes: BTreeSet<String> = info
            .get("skus")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter(|sku| sku.get("available").and_then(Value::as_bool).unwrap_or(false))
            .filter_map(|sku| size_label(sku, &["nikeSize", "localizedSize"]))
            .collect();

        Some(Product::new(NewProduct {
            title: title.to_string(),
            url,
            product_id,
            image: info
                .pointer("/imageUrls/productImageUrl")
                .and_then(Value::as_str)
                .map(str::to_string),
            price,
            price_display,
            sizes,
            site: self.site.clone(),
            direct_link: None,
        }))
    }
}

#[async_trait]
impl ProductExtractor for SnkrsExtractor {
    fn platform(&self) -> Platform {
        Platform::Snkrs
    }

    async fn extract(&self, client: &StoreClient, keyword: &str) -> Result<Vec<Product>, FetchError> {
        let url = self.catalog_url();
        let html = client.get_text(&url).await?;
        let products = self.parse(&url, &html, keyword)?;
        if products.is_empty() {
            tracing::debug!("{}: no launches match '{}'", self.site, keyword);
        }
        Ok(products)
    }
}
