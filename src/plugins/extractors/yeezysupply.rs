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

pub const DEFAULT_BASE_URL: &str = "https://www.yeezysupply.com";
pub const DEFAULT_CATALOG_PATH: &str = "/";

const PRODUCTS: [&str; 4] = ["props", "pageProps", "initialData", "products"];

#[derive(Debug, Clone)]
pub struct YeezySupplyExtractor {
    site: String,
    base_url: Url,
    catalog_path: String,
}

impl YeezySupplyExtractor {
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
        Ok(next_data_items(url, html, &PRODUCTS)?
            .iter()
            .filter_map(|item| self.product(item))
            .filter(|product| product.matches_keyword(keyword))
            .collect())
    }

    fn product(&self, item: &Value) -> Option<Product> {
        let title = first_str(item, &["name"])?;
        let url = first_str(item, &["pdpLink"])
            .map(|link| absolutize(&self.base_url, link))
            .unwrap_or_default();
        let product_id = first_id(item, &["id", "productId"]);
        if url.is_empty() && product_id.is_none() {
            return None;
        }

        let sizes: BTreeSet<String> = item
            .pointer("/availability/sizes")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter(|size| size.get("available").and_then(Value::as_bool).unwrap_or(false))
            .filter_map(|size| size_label(size, &["size", "displaySize"]))
            .collect();
        let (price, price_display) = price_at(item, &["price"]);

        Some(Product::new(NewProduct {
            title: title.to_string(),
            url,
            product_id,
            image: first_str(item, &["image"]).map(|src| absolutize(&self.base_url, src)),
            price,
            price_display,
            sizes,
            site: self.site.clone(),
            direct_link: None,
        }))
    }
}

#[async_trait]
impl ProductExtractor for YeezySupplyExtractor {
    fn platform(&self) -> Platform {
        Platform::YeezySupply
    }

    async fn extract(&self, client: &StoreClient, keyword: &str) -> Result<Vec<Product>, FetchError> {
        let url = self.catalog_url();
        let html = client.get_text(&url).await?;
        self.parse(&url, &html, keyword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::extractors::test_support::store;
    use crate::utils::error::FetchErrorKind;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::str::FromStr;

    fn fixture() -> String {
        let data = json!({"props": {"pageProps": {"initialData": {"products": [
            {
                "id": "HQ4540",
                "name": "YEEZY BOOST 350 V2 ONYX",
                "pdpLink": "/product/HQ4540",
                "image": "https://images.yeezysupply.com/onyx.png",
                "price": "230.00",
                "availability": {"sizes": [
                    {"size": "9", "available": true},
                    {"displaySize": "9.5", "available": true},
                    {"size": "10", "available": false},
                    "11"
                ]}
            },
            {"name": "YEEZY SLIDE BONE", "price": 70}
        ]}}}});
        format!(r#"<script id="__NEXT_DATA__" type="application/json">{}</script>"#, data)
    }

    fn extractor() -> YeezySupplyExtractor {
        YeezySupplyExtractor::new(&store(Platform::YeezySupply, None)).unwrap()
    }

    #[test]
    fn test_parse_products() {
        let products = extractor()
            .parse("https://www.yeezysupply.com/", &fixture(), "350")
            .unwrap();
        assert_eq!(products.len(), 1);

        let onyx = &products[0];
        assert_eq!(onyx.url(), "https://www.yeezysupply.com/product/HQ4540");
        assert_eq!(onyx.price(), Some(Decimal::from_str("230.00").unwrap()));
        let sizes: Vec<&str> = onyx.sizes().iter().map(String::as_str).collect();
        assert_eq!(sizes, vec!["9", "9.5"]);
    }

    #[test]
    fn test_product_without_link_or_id_is_skipped() {
        let products = extractor()
            .parse("https://www.yeezysupply.com/", &fixture(), "yeezy")
            .unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].title(), "YEEZY BOOST 350 V2 ONYX");
    }

    #[test]
    fn test_page_without_payload_is_permanent() {
        let err = extractor()
            .parse("https://www.yeezysupply.com/", "<html>queue</html>", "350")
            .unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Permanent);
    }
}
