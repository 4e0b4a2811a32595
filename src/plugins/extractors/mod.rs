pub mod adidas;
pub mod footlocker;
pub mod nike;
pub mod parsers;
pub mod shopify;
pub mod snkrs;
pub mod supreme;
pub mod yeezysupply;

pub use adidas::AdidasExtractor;
pub use footlocker::FootlockerExtractor;
pub use nike::NikeExtractor;
pub use shopify::ShopifyExtractor;
pub use snkrs::SnkrsExtractor;
pub use supreme::SupremeExtractor;
pub use yeezysupply::YeezySupplyExtractor;

use url::Url;

use crate::config::StoreConfig;
use crate::utils::error::AppError;

/// Parse the store's `base_url`, falling back to the platform default.
pub(crate) fn store_base_url(store: &StoreConfig, default: Option<&str>) -> Result<Url, AppError> {
    let raw = store.base_url.as_deref().or(default).ok_or_else(|| {
        AppError::Validation(format!(
            "Store '{}': {} requires base_url",
            store.name, store.platform
        ))
    })?;
    Url::parse(raw.trim_end_matches('/'))
        .map_err(|e| AppError::Validation(format!("Store '{}': bad base_url: {}", store.name, e)))
}

/// The query to search for: the keyword, else the store's fallback query.
pub(crate) fn search_query(keyword: &str, fallback: Option<&str>) -> Option<String> {
    let keyword = keyword.trim();
    if !keyword.is_empty() {
        return Some(keyword.to_string());
    }
    fallback
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
}
