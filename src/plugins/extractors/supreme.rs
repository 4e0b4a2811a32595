use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use url::Url;

use super::parsers::{absolutize, parse_price};
use super::store_base_url;
use crate::config::StoreConfig;
use crate::models::{NewProduct, Product};
use crate::plugins::{Platform, ProductExtractor};
use crate::scraper::StoreClient;
use crate::utils::error::{AppError, FetchError};

pub const DEFAULT_BASE_URL: &str = "https://www.supremenewyork.com";
pub const DEFAULT_CATALOG_PATH: &str = "/shop/all";

// Catalog-based: the whole shop is fetched every time and filtered locally.
#[derive(Debug, Clone)]
pub struct SupremeExtractor {
    site: String,
    base_url: Url,
    catalog_path: String,
}

impl SupremeExtractor {
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

    pub fn parse(&self, html: &str, keyword: &str) -> Vec<Product> {
        let document = Html::parse_document(html);
        let (Ok(cards), Ok(image), Ok(price)) = (
            Selector::parse("ul#shop-scroller li a"),
            Selector::parse("img"),
            Selector::parse("span.price"),
        ) else {
            return Vec::new();
        };

        document
            .select(&cards)
            .filter_map(|card| {
                let title = card
                    .text()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ");
                let href = card.value().attr("href").map(str::trim).unwrap_or_default();
                if title.is_empty() || href.is_empty() {
                    return None;
                }

                let url = absolutize(&self.base_url, href);
                let image = card
                    .select(&image)
                    .find_map(|img| img.value().attr("src"))
                    .map(|src| absolutize(&self.base_url, src));
                let price_text = card
                    .select(&price)
                    .map(|p| p.text().collect::<String>().trim().to_string())
                    .find(|t| !t.is_empty());

                Some(Product::new(NewProduct {
                    title,
                    url,
                    product_id: None,
                    image,
                    price: price_text.as_deref().and_then(parse_price),
                    price_display: price_text,
                    sizes: BTreeSet::new(),
                    site: self.site.clone(),
                    direct_link: None,
                }))
            })
            .filter(|product| product.matches_keyword(keyword))
            .collect()
    }
}

#[async_trait]
impl ProductExtractor for SupremeExtractor {
    fn platform(&self) -> Platform {
        Platform::Supreme
    }

    async fn extract(&self, client: &StoreClient, keyword: &str) -> Result<Vec<Product>, FetchError> {
        let html = client.get_text(&self.catalog_url()).await?;
        let products = self.parse(&html, keyword);
        if products.is_empty() {
            tracing::debug!("{}: no catalog matches for '{}'", self.site, keyword);
        }
        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::extractors::test_support::store;
    use rust_decimal::Decimal;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CATALOG: &str = r#"
        <html><body>
        <ul id="shop-scroller">
          <li><a href="/shop/jackets/gore-tex">
            <img src="/images/gore-tex.jpg">
            <h2>GORE-TEX Shell Jacket</h2>
            <span class="price">$398</span>
          </a></li>
          <li><a href="/shop/tops/box-logo">
            <img src="https://cdn.supreme.com/box.jpg">
            <h2>Box Logo Hooded Sweatshirt</h2>
          </a></li>
          <li><a><h2>Shell Tote Placeholder</h2></a></li>
        </ul>
        <ul id="other"><li><a href="/shop/hidden">Shell Hidden</a></li></ul>
        </body></html>
    "#;

    fn extractor() -> SupremeExtractor {
        SupremeExtractor::new(&store(Platform::Supreme, None)).unwrap()
    }

    #[test]
    fn test_catalog_url_default() {
        assert_eq!(extractor().catalog_url(), "https://www.supremenewyork.com/shop/all");
    }

    #[test]
    fn test_parse_cards() {
        let products = extractor().parse(CATALOG, "shell");
        assert_eq!(products.len(), 1);

        let jacket = &products[0];
        assert_eq!(jacket.title(), "GORE-TEX Shell Jacket $398");
        assert_eq!(jacket.url(), "https://www.supremenewyork.com/shop/jackets/gore-tex");
        assert_eq!(jacket.image(), Some("https://www.supremenewyork.com/images/gore-tex.jpg"));
        assert_eq!(jacket.price(), Some(Decimal::from(398)));
        assert!(jacket.sizes().is_empty());
    }

    #[test]
    fn test_card_without_link_is_skipped() {
        let products = extractor().parse(CATALOG, "placeholder");
        assert!(products.is_empty());
    }

    #[test]
    fn test_empty_keyword_returns_whole_catalog() {
        let products = extractor().parse(CATALOG, "");
        assert_eq!(products.len(), 2);
        assert_eq!(products[1].price(), None);
        assert_eq!(products[1].image(), Some("https://cdn.supreme.com/box.jpg"));
    }

    #[tokio::test]
    async fn test_extract_reads_catalog_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/shop/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string(CATALOG))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = store(Platform::Supreme, Some(server.uri()));
        config.catalog_path = Some("/shop/new".to_string());
        let extractor = SupremeExtractor::new(&config).unwrap();
        let client = StoreClient::new(&Default::default()).unwrap();

        let products = extractor.extract(&client, "box logo").await.unwrap();
        assert_eq!(products.len(), 1);
        assert!(products[0].url().starts_with(&server.uri()));
    }
}
