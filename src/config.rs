use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;
use validator::Validate;

use crate::models::Product;
use crate::plugins::Platform;
use crate::utils::error::{AppError, Result};

/// Lowest refresh interval any store may poll at, in seconds.
pub const MIN_REFRESH_INTERVAL_SECS: f64 = 3.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub defaults: StoreDefaults,
    #[serde(default)]
    pub stores: Vec<StoreSettings>,
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HttpConfig {
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
    #[validate(range(min = 1))]
    pub connect_timeout_secs: u64,
    #[validate(range(min = 1))]
    pub max_connections_per_host: usize,
    pub rotate_user_agent: bool,
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            connect_timeout_secs: 10,
            max_connections_per_host: 4,
            rotate_user_agent: true,
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RetryConfig {
    #[validate(range(min = 1))]
    pub base_delay_ms: u64,
    #[validate(range(max = 16))]
    pub max_exponent: u32,
    pub jitter_max_ms: u64,
    #[validate(range(min = 1))]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_exponent: 5,
            jitter_max_ms: 500,
            max_attempts: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DeliveryConfig {
    #[validate(range(max = 10))]
    pub max_retries: u32,
    #[validate(range(min = 1))]
    pub base_delay_ms: u64,
    #[validate(range(max = 16))]
    pub max_exponent: u32,
    pub jitter_max_ms: u64,
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_exponent: 3,
            jitter_max_ms: 250,
            timeout_secs: 10,
        }
    }
}

/// How a store decides which listings it reports on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    /// Listings whose title, id or URL match a keyword.
    #[default]
    Keywords,
    /// Only listings named by `product_ids` or `product_urls`.
    Url,
}

/// Values a store inherits when its own entry omits them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreDefaults {
    pub keywords: Vec<String>,
    pub refresh_interval: f64,
    pub jitter_min: f64,
    pub jitter_max: f64,
    pub monitor_mode: MonitorMode,
}

impl Default for StoreDefaults {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            refresh_interval: 15.0,
            jitter_min: 0.0,
            jitter_max: 2.0,
            monitor_mode: MonitorMode::Keywords,
        }
    }
}

/// A store entry as written in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StoreSettings {
    #[validate(length(min = 1, message = "store name must not be empty"))]
    pub name: String,
    pub platform: String,
    #[validate(url)]
    pub base_url: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub refresh_interval: Option<f64>,
    pub jitter_min: Option<f64>,
    pub jitter_max: Option<f64>,
    pub search_path: Option<String>,
    pub catalog_path: Option<String>,
    pub fallback_query: Option<String>,
    pub monitor_mode: Option<MonitorMode>,
    #[serde(default)]
    pub product_ids: Vec<String>,
    #[serde(default)]
    pub product_urls: Vec<String>,
}

/// A fully resolved store, read-only to the monitor.
///
/// `keywords` is never empty: a store with nothing to search for gets a
/// single empty keyword, which fetches the fallback query or whole catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub name: String,
    pub platform: Platform,
    pub keywords: Vec<String>,
    pub base_url: Option<String>,
    pub refresh_interval: Duration,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
    pub search_path: Option<String>,
    pub catalog_path: Option<String>,
    pub fallback_query: Option<String>,
    pub monitor_mode: MonitorMode,
    pub product_ids: Vec<String>,
    pub product_urls: Vec<String>,
}

impl StoreConfig {
    /// Whether a fetched listing is one this store reports on.
    ///
    /// Keyword mode accepts everything the extractor returned. Url mode
    /// accepts only allow-listed ids or URLs, or everything when both lists
    /// are empty.
    pub fn watches(&self, product: &Product) -> bool {
        if self.monitor_mode == MonitorMode::Keywords
            || (self.product_ids.is_empty() && self.product_urls.is_empty())
        {
            return true;
        }

        let id_listed = product.product_id().is_some_and(|id| {
            self.product_ids
                .iter()
                .any(|wanted| wanted.trim().eq_ignore_ascii_case(id.trim()))
        });
        let url = normalize_url(product.url());
        id_listed
            || self
                .product_urls
                .iter()
                .any(|wanted| normalize_url(wanted) == url)
    }
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_lowercase()
}

fn seconds(store: &str, field: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| AppError::Validation(format!("Store '{}': {} {}s: {}", store, field, value, e)))
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EndpointConfig {
    pub name: Option<String>,
    #[validate(url)]
    pub url: String,
    pub username: Option<String>,
    #[validate(url)]
    pub avatar_url: Option<String>,
}

impl EndpointConfig {
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub persist_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: Some(PathBuf::from("logs")),
            file_prefix: "monitor.log".to_string(),
            filter: "restock_monitor=info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub validate_endpoints: bool,
    pub check_connectivity: bool,
    pub send_startup_ping: bool,
    pub connectivity_url: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            validate_endpoints: true,
            check_connectivity: true,
            send_startup_ping: true,
            connectivity_url: "https://www.google.com/generate_204".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, then overlay `RESTOCK__*` environment variables.
    pub fn load(path: &Path) -> Result<Self> {
        let s = Config::builder()
            .add_source(File::from(path))
            .add_source(
                Environment::with_prefix("RESTOCK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.http.validate()?;
        self.retry.validate()?;
        self.delivery.validate()?;

        if self.stores.is_empty() {
            return Err(AppError::Validation(
                "Configuration must define at least one store entry".into(),
            ));
        }

        if self.endpoints.is_empty() {
            return Err(AppError::Validation(
                "Provide at least one notification endpoint".into(),
            ));
        }

        let mut names = HashSet::new();
        for store in &self.stores {
            store.validate()?;
            if !names.insert(store.name.as_str()) {
                return Err(AppError::Validation(format!(
                    "Duplicate store name '{}'",
                    store.name
                )));
            }
            self.resolve_store(store)?;
        }

        for endpoint in &self.endpoints {
            endpoint.validate()?;
            let parsed = Url::parse(&endpoint.url)
                .map_err(|e| AppError::Validation(format!("Endpoint '{}': {}", endpoint.url, e)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(AppError::Validation(format!(
                    "Endpoint '{}' must be http(s)",
                    endpoint.url
                )));
            }
        }

        Ok(())
    }

    /// Resolve every store against the global defaults.
    pub fn store_configs(&self) -> Result<Vec<StoreConfig>> {
        self.stores.iter().map(|s| self.resolve_store(s)).collect()
    }

    fn resolve_store(&self, store: &StoreSettings) -> Result<StoreConfig> {
        let platform: Platform = store.platform.parse().map_err(|_| AppError::UnsupportedPlatform {
            store: store.name.clone(),
            platform: store.platform.clone(),
        })?;

        let refresh = store.refresh_interval.unwrap_or(self.defaults.refresh_interval);
        if !refresh.is_finite() || refresh < MIN_REFRESH_INTERVAL_SECS {
            return Err(AppError::Validation(format!(
                "Store '{}': refresh_interval {}s is below the {}s minimum",
                store.name, refresh, MIN_REFRESH_INTERVAL_SECS
            )));
        }

        let jitter_min = store.jitter_min.unwrap_or(self.defaults.jitter_min);
        let jitter_max = store.jitter_max.unwrap_or(self.defaults.jitter_max);
        if !jitter_min.is_finite() || !jitter_max.is_finite() || jitter_min < 0.0 {
            return Err(AppError::Validation(format!(
                "Store '{}': jitter bounds must be non-negative numbers",
                store.name
            )));
        }
        if jitter_min > jitter_max {
            return Err(AppError::Validation(format!(
                "Store '{}': jitter_min cannot exceed jitter_max",
                store.name
            )));
        }

        // An explicit `keywords = []` opts out of the defaults.
        let mut keywords: Vec<String> = store
            .keywords
            .clone()
            .unwrap_or_else(|| self.defaults.keywords.clone())
            .into_iter()
            .map(|k| k.trim().to_string())
            .collect();
        if keywords.is_empty() {
            keywords.push(String::new());
        }

        let fallback_query = store
            .fallback_query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .or_else(|| platform.default_fallback_query());
        if platform.searches() && fallback_query.is_none() && keywords.iter().any(String::is_empty) {
            return Err(AppError::Validation(format!(
                "Store '{}': {} searches by keyword; set keywords or fallback_query",
                store.name, platform
            )));
        }

        let monitor_mode = store.monitor_mode.unwrap_or(self.defaults.monitor_mode);

        Ok(StoreConfig {
            name: store.name.clone(),
            platform,
            keywords,
            base_url: store.base_url.clone(),
            refresh_interval: seconds(&store.name, "refresh_interval", refresh)?,
            jitter_min: seconds(&store.name, "jitter_min", jitter_min)?,
            jitter_max: seconds(&store.name, "jitter_max", jitter_max)?,
            search_path: store.search_path.clone(),
            catalog_path: store.catalog_path.clone(),
            fallback_query: fallback_query.map(str::to_string),
            monitor_mode,
            product_ids: store.product_ids.clone(),
            product_urls: store.product_urls.clone(),
        })
    }
}
