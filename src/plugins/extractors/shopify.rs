use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::BTreeSet;
use url::Url;

use super::parsers::{absolutize, ld_products, parse_price, price_from_json, render_path};
use super::{search_query, store_base_url};
use crate::config::StoreConfig;
use crate::models::{NewProduct, Product};
use crate::plugins::{Platform, ProductExtractor};
use crate::scraper::StoreClient;
use crate::utils::error::{AppError, FetchError};

pub const DEFAULT_SEARCH_PATH: &str = "/search?q={query}&type=product";
pub const ONE_SIZE: &str = "OS";

/// Generic storefront search backed by the page's JSON-LD product data.
#[derive(Debug, Clone)]
pub struct ShopifyExtractor {
    site: String,
    base_url: Url,
    search_path: String,
    fallback_query: Option<String>,
}

impl ShopifyExtractor {
    pub fn new(store: &StoreConfig) -> Result<Self, AppError> {
        Ok(Self {
            site: store.name.clone(),
            base_url: store_base_url(store, None)?,
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

    /// Products on a search results page that match `keyword`.
    pub fn parse(&self, html: &str, keyword: &str) -> Vec<Product> {
        let document = Html::parse_document(html);
        ld_products(&document)
            .iter()
            .filter_map(|item| self.product(&document, item))
            .filter(|product| product.matches_keyword(keyword))
            .collect()
    }

    fn product(&self, document: &Html, item: &Value) -> Option<Product> {
        let title = item.get("name")?.as_str()?.trim();
        if title.is_empty() {
            return None;
        }

        let url = item
            .get("url")
            .and_then(Value::as_str)
            .map(|u| absolutize(&self.base_url, u))
            .unwrap_or_default();
        let product_id = ["productID", "sku", "@id"]
            .iter()
            .find_map(|field| item.get(*field).and_then(Value::as_str))
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        if url.is_empty() && product_id.is_none() {
            tracing::debug!("{}: skipping '{}' with no url or id", self.site, title);
            return None;
        }

        let offers = offers(item);
        let mut sizes: BTreeSet<String> = offers
            .iter()
            .filter(|offer| in_stock(offer))
            .filter_map(|offer| {
                offer
                    .get("name")
                    .or_else(|| offer.get("sku"))
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
            .collect();
        if sizes.is_empty() {
            sizes.insert(ONE_SIZE.to_string());
        }

        let raw_price = offers.iter().find_map(|offer| {
            ["price", "lowPrice", "highPrice"]
                .iter()
                .find_map(|field| offer.get(*field).filter(|v| !v.is_null()))
        });
        let price = raw_price.and_then(price_from_json);
        let price_display = match (price, raw_price) {
            (None, Some(Value::String(text))) => Some(text.clone()),
            (None, _) => markup_price(document, &url, &self.base_url),
            _ => None,
        };

        Some(Product::new(NewProduct {
            title: title.to_string(),
            url,
            product_id,
            image: first_image(item).map(|src| absolutize(&self.base_url, &src)),
            price: price.or_else(|| price_display.as_deref().and_then(parse_price)),
            price_display,
            sizes,
            site: self.site.clone(),
            direct_link: None,
        }))
    }
}

#[async_trait]
impl ProductExtractor for ShopifyExtractor {
    fn platform(&self) -> Platform {
        Platform::Shopify
    }

    async fn extract(&self, client: &StoreClient, keyword: &str) -> Result<Vec<Product>, FetchError> {
        let Some(query) = search_query(keyword, self.fallback_query.as_deref()) else {
            return Ok(Vec::new());
        };
        let url = self.search_url(&query);
        let html = client.get_text(&url).await?;
        let products = self.parse(&html, keyword);
        tracing::debug!("{}: {} products for '{}'", self.site, products.len(), query);
        Ok(products)
    }
}

/// Flattened offer list; `AggregateOffer` contributes its nested offers.
fn offers(item: &Value) -> Vec<&Value> {
    let mut out = Vec::new();
    let mut pending: Vec<&Value> = item.get("offers").into_iter().collect();
    while let Some(value) = pending.pop() {
        match value {
            Value::Array(list) => pending.extend(list.iter().rev()),
            Value::Object(map) => {
                out.push(value);
                if let Some(nested) = map.get("offers") {
                    pending.push(nested);
                }
            }
            _ => {}
        }
    }
    out
}

fn in_stock(offer: &Value) -> bool {
    offer
        .get("availability")
        .and_then(Value::as_str)
        .map(|a| !a.contains("OutOfStock") && !a.contains("SoldOut"))
        .unwrap_or(true)
}

fn first_image(item: &Value) -> Option<String> {
    match item.get("image")? {
        Value::String(src) => Some(src.clone()),
        Value::Array(list) => list.iter().find_map(|v| match v {
            Value::String(src) => Some(src.clone()),
            other => other.get("url")?.as_str().map(str::to_string),
        }),
        Value::Object(obj) => obj.get("url")?.as_str().map(str::to_string),
        _ => None,
    }
}

/// Price text from the product card linking to `url`, for sparse JSON-LD.
fn markup_price(document: &Html, url: &str, base: &Url) -> Option<String> {
    let anchors = Selector::parse("a[href]").ok()?;
    let price = Selector::parse(r#"[class*="price"]"#).ok()?;

    let anchor = document
        .select(&anchors)
        .find(|a| a.value().attr("href").is_some_and(|href| absolutize(base, href) == url))?;

    let within = |el: ElementRef| {
        el.select(&price)
            .map(|p| p.text().collect::<String>().trim().to_string())
            .find(|text| !text.is_empty())
    };
    within(anchor).or_else(|| anchor.parent().and_then(ElementRef::wrap).and_then(within))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::extractors::test_support::store;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SEARCH_PAGE: &str = r#"
        <html><head>
        <script type="application/ld+json">
        {"@type": "ItemList", "itemListElement": [
          {"@type": "ListItem", "item": {
            "@type": "Product", "name": "Nike Dunk Low Panda", "url": "/products/dunk-low-panda",
            "image": ["https://cdn.kith.com/panda.jpg"],
            "offers": [
              {"@type": "Offer", "name": "9", "price": "120.00", "availability": "https://schema.org/InStock"},
              {"@type": "Offer", "name": "10", "price": "120.00", "availability": "https://schema.org/InStock"},
              {"@type": "Offer", "name": "11", "price": "120.00", "availability": "https://schema.org/OutOfStock"}
            ]}},
          {"@type": "ListItem", "item": {
            "@type": "Product", "name": "Kith Box Logo Hoodie", "url": "/products/hoodie",
            "offers": {"@type": "Offer", "price": 165}}},
          {"@type": "ListItem", "item": {
            "@type": "Product", "name": "Dunk High Tote", "url": "https://kith.com/products/tote"}}
        ]}
        </script>
        </head><body>
          <div class="card"><a href="/products/tote">Dunk High Tote</a><span class="product-price">$45.00</span></div>
        </body></html>
    "#;

    fn extractor() -> ShopifyExtractor {
        ShopifyExtractor::new(&store(Platform::Shopify, Some("https://kith.com/".to_string()))).unwrap()
    }

    #[test]
    fn test_search_url() {
        assert_eq!(
            extractor().search_url("dunk low"),
            "https://kith.com/search?q=dunk+low&type=product"
        );
    }

    #[test]
    fn test_parse_filters_by_keyword_and_reads_offers() {
        let products = extractor().parse(SEARCH_PAGE, "dunk");
        assert_eq!(products.len(), 2);

        let panda = &products[0];
        assert_eq!(panda.title(), "Nike Dunk Low Panda");
        assert_eq!(panda.url(), "https://kith.com/products/dunk-low-panda");
        assert_eq!(panda.image(), Some("https://cdn.kith.com/panda.jpg"));
        assert_eq!(panda.price(), Some(Decimal::from_str("120.00").unwrap()));
        assert_eq!(
            panda.sizes().iter().cloned().collect::<Vec<_>>(),
            vec!["10".to_string(), "9".to_string()]
        );
        assert_eq!(panda.site(), "Test");
    }

    #[test]
    fn test_offerless_product_is_one_size_with_markup_price() {
        let products = extractor().parse(SEARCH_PAGE, "tote");
        assert_eq!(products.len(), 1);
        assert!(products[0].sizes().contains(ONE_SIZE));
        assert_eq!(products[0].price(), Some(Decimal::from_str("45.00").unwrap()));
        assert_eq!(products[0].formatted_price(), "$45.00");
    }

    #[test]
    fn test_page_without_json_ld_is_empty() {
        assert!(extractor().parse("<html><body>No results</body></html>", "dunk").is_empty());
    }

    #[test]
    fn test_requires_base_url() {
        assert!(ShopifyExtractor::new(&store(Platform::Shopify, None)).is_err());
    }

    #[tokio::test]
    async fn test_extract_fetches_search_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "dunk"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SEARCH_PAGE))
            .expect(1)
            .mount(&server)
            .await;

        let extractor = ShopifyExtractor::new(&store(Platform::Shopify, Some(server.uri()))).unwrap();
        let client = StoreClient::new(&Default::default()).unwrap();
        let products = extractor.extract(&client, "dunk").await.unwrap();
        assert_eq!(products.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_keyword_without_fallback_skips_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let extractor = ShopifyExtractor::new(&store(Platform::Shopify, Some(server.uri()))).unwrap();
        let client = StoreClient::new(&Default::default()).unwrap();
        assert!(extractor.extract(&client, "").await.unwrap().is_empty());
    }
}
