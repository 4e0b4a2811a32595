use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::extractors::{
    AdidasExtractor, FootlockerExtractor, NikeExtractor, ShopifyExtractor, SnkrsExtractor,
    SupremeExtractor, YeezySupplyExtractor, adidas, footlocker,
};
use super::traits::ProductExtractor;
use crate::config::StoreConfig;
use crate::utils::error::AppError;

/// Storefront platforms a store entry can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Shopify,
    Nike,
    Adidas,
    Footlocker,
    Supreme,
    YeezySupply,
    Snkrs,
}

impl Platform {
    pub const ALL: [Platform; 7] = [
        Platform::Shopify,
        Platform::Nike,
        Platform::Adidas,
        Platform::Footlocker,
        Platform::Supreme,
        Platform::YeezySupply,
        Platform::Snkrs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Shopify => "shopify",
            Platform::Nike => "nike",
            Platform::Adidas => "adidas",
            Platform::Footlocker => "footlocker",
            Platform::Supreme => "supreme",
            Platform::YeezySupply => "yeezysupply",
            Platform::Snkrs => "snkrs",
        }
    }

    /// Search platforms fetch one query per keyword; the rest fetch a whole
    /// catalog page and filter it locally.
    pub fn searches(&self) -> bool {
        !matches!(self, Platform::Supreme | Platform::YeezySupply | Platform::Snkrs)
    }

    /// Query used for an empty keyword when the store sets none.
    pub fn default_fallback_query(&self) -> Option<&'static str> {
        match self {
            Platform::Footlocker => Some(footlocker::DEFAULT_FALLBACK_QUERY),
            Platform::Adidas => Some(adidas::DEFAULT_FALLBACK_QUERY),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown platform '{0}'")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| UnknownPlatform(s.to_string()))
    }
}

pub type ExtractorBox = Arc<dyn ProductExtractor>;
pub type ExtractorFactory = fn(&StoreConfig) -> Result<ExtractorBox, AppError>;

/// Maps each platform to the constructor for its extractor.
pub struct ExtractorRegistry {
    factories: HashMap<Platform, ExtractorFactory>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Platform::Shopify, shopify);
        registry.register(Platform::Nike, nike);
        registry.register(Platform::Adidas, adidas_store);
        registry.register(Platform::Footlocker, footlocker_store);
        registry.register(Platform::Supreme, supreme);
        registry.register(Platform::YeezySupply, yeezysupply);
        registry.register(Platform::Snkrs, snkrs);
        registry
    }
}

impl ExtractorRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, platform: Platform, factory: ExtractorFactory) {
        self.factories.insert(platform, factory);
    }

    pub fn supports(&self, platform: Platform) -> bool {
        self.factories.contains_key(&platform)
    }

    /// Build the extractor for one store. Errors stop only that store.
    pub fn build(&self, store: &StoreConfig) -> Result<ExtractorBox, AppError> {
        let factory = self
            .factories
            .get(&store.platform)
            .ok_or_else(|| AppError::UnsupportedPlatform {
                store: store.name.clone(),
                platform: store.platform.to_string(),
            })?;
        factory(store)
    }
}

fn shopify(store: &StoreConfig) -> Result<ExtractorBox, AppError> {
    Ok(Arc::new(ShopifyExtractor::new(store)?))
}

fn nike(store: &StoreConfig) -> Result<ExtractorBox, AppError> {
    Ok(Arc::new(NikeExtractor::new(store)?))
}

fn adidas_store(store: &StoreConfig) -> Result<ExtractorBox, AppError> {
    Ok(Arc::new(AdidasExtractor::new(store)?))
}

fn footlocker_store(store: &StoreConfig) -> Result<ExtractorBox, AppError> {
    Ok(Arc::new(FootlockerExtractor::new(store)?))
}

fn supreme(store: &StoreConfig) -> Result<ExtractorBox, AppError> {
    Ok(Arc::new(SupremeExtractor::new(store)?))
}

fn yeezysupply(store: &StoreConfig) -> Result<ExtractorBox, AppError> {
    Ok(Arc::new(YeezySupplyExtractor::new(store)?))
}

fn snkrs(store: &StoreConfig) -> Result<ExtractorBox, AppError> {
    Ok(Arc::new(SnkrsExtractor::new(store)?))
}
