use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A normalized storefront listing.
///
/// Fields are private so a product cannot change after construction; `key` is
/// derived once from the site and the product's URL (or platform id).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    title: String,
    url: String,
    image: Option<String>,
    price: Option<Decimal>,
    price_display: Option<String>,
    sizes: BTreeSet<String>,
    site: String,
    direct_link: Option<String>,
    #[serde(default)]
    product_id: Option<String>,
    key: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewProduct {
    pub title: String,
    pub url: String,
    pub product_id: Option<String>,
    pub image: Option<String>,
    pub price: Option<Decimal>,
    pub price_display: Option<String>,
    pub sizes: BTreeSet<String>,
    pub site: String,
    pub direct_link: Option<String>,
}

impl Product {
    pub fn new(new_product: NewProduct) -> Self {
        let identity = new_product
            .product_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(&new_product.url);
        let key = Self::derive_key(&new_product.site, identity);
        let product_id = new_product.product_id.filter(|id| !id.is_empty());

        Self {
            title: new_product.title,
            url: new_product.url,
            image: new_product.image.filter(|i| !i.is_empty()),
            price: new_product.price,
            price_display: new_product.price_display,
            sizes: new_product.sizes,
            site: new_product.site,
            direct_link: new_product.direct_link.filter(|l| !l.is_empty()),
            product_id,
            key,
        }
    }

    /// Stable identity for a listing: `site` and a case-folded, trimmed id or URL.
    pub fn derive_key(site: &str, identity: &str) -> String {
        let identity = identity.trim().trim_end_matches('/').to_lowercase();
        format!("{}:{}", site.to_lowercase(), identity)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    pub fn price(&self) -> Option<Decimal> {
        self.price
    }

    pub fn sizes(&self) -> &BTreeSet<String> {
        &self.sizes
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn product_id(&self) -> Option<&str> {
        self.product_id.as_deref()
    }

    /// Whether `keyword` names this listing.
    ///
    /// A keyword matches on case-insensitive title containment, or on an
    /// exact (case-insensitive) product id or URL. Empty keywords match
    /// everything.
    pub fn matches_keyword(&self, keyword: &str) -> bool {
        let keyword = keyword.trim();
        if keyword.is_empty() || self.title.to_lowercase().contains(&keyword.to_lowercase()) {
            return true;
        }
        let id_match = self
            .product_id
            .as_deref()
            .is_some_and(|id| id.trim().eq_ignore_ascii_case(keyword));
        let wanted_url = keyword.trim_end_matches('/');
        id_match
            || (!self.url.is_empty() && self.url.trim_end_matches('/').eq_ignore_ascii_case(wanted_url))
    }

    pub fn direct_link(&self) -> &str {
        self.direct_link.as_deref().unwrap_or(&self.url)
    }

    /// Human readable price, preferring the parsed amount.
    pub fn formatted_price(&self) -> String {
        match (self.price, &self.price_display) {
            (Some(price), _) => format!("${:.2}", price),
            (None, Some(display)) if !display.trim().is_empty() => display.trim().to_string(),
            _ => "N/A".to_string(),
        }
    }
}
