pub mod config;
pub mod dispatcher;
pub mod health;
pub mod models;
pub mod monitor;
pub mod orchestrator;
pub mod plugins;
pub mod retry;
pub mod scraper;
pub mod seen_state;
pub mod utils;

// Re-export commonly used types
pub use config::{AppConfig, MonitorMode, StoreConfig};
pub use dispatcher::{DispatchReport, NotificationDispatcher};
pub use health::HealthCheck;
pub use models::{EventKind, NotificationEvent, Product};
pub use monitor::{CycleReport, MonitorContext, StoreMonitor};
pub use orchestrator::Orchestrator;
pub use plugins::{ExtractorRegistry, Platform, ProductExtractor};
pub use retry::RetryPolicy;
pub use scraper::StoreClient;
pub use seen_state::SeenStateStore;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
