use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported platform '{platform}' for store {store}")]
    UnsupportedPlatform { store: String, platform: String },

    #[error("Health check failed: {0}")]
    HealthCheck(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Errors that must abort startup before any monitor runs.
    pub fn is_config_invalid(&self) -> bool {
        matches!(
            self,
            AppError::Config(_) | AppError::Validation(_) | AppError::UnsupportedPlatform { .. }
        )
    }
}

// Implement conversion from validation errors
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("{}", err))
    }
}

/// Retry class of a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    RateLimited,
    Transient,
    Permanent,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("rate limited by {url} (HTTP {status})")]
    RateLimited {
        url: String,
        status: u16,
        retry_after: Option<Duration>,
    },

    #[error("transient failure fetching {url}: {message}")]
    Transient { url: String, message: String },

    #[error("permanent failure fetching {url}: {message}")]
    Permanent { url: String, message: String },
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::RateLimited { .. } => FetchErrorKind::RateLimited,
            FetchError::Transient { .. } => FetchErrorKind::Transient,
            FetchError::Permanent { .. } => FetchErrorKind::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() != FetchErrorKind::Permanent
    }

    /// Classify a non-2xx HTTP status.
    pub fn from_status(url: &str, status: u16, retry_after: Option<Duration>) -> Self {
        match status {
            403 | 429 => FetchError::RateLimited {
                url: url.to_string(),
                status,
                retry_after,
            },
            500..=599 => FetchError::Transient {
                url: url.to_string(),
                message: format!("HTTP {}", status),
            },
            _ => FetchError::Permanent {
                url: url.to_string(),
                message: format!("HTTP {}", status),
            },
        }
    }

    /// Classify a transport-level reqwest failure.
    pub fn from_transport(url: &str, err: &reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return FetchError::from_status(url, status.as_u16(), None);
        }
        if err.is_builder() {
            return FetchError::Permanent {
                url: url.to_string(),
                message: err.to_string(),
            };
        }
        FetchError::Transient {
            url: url.to_string(),
            message: err.to_string(),
        }
    }

    pub fn unparsable(url: &str, message: impl Into<String>) -> Self {
        FetchError::Permanent {
            url: url.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("endpoint {endpoint} answered HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("endpoint {endpoint} unreachable: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
}

impl DeliveryError {
    /// Rejections of the payload itself (other 4xx) are not worth repeating.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Status { status, .. } => {
                matches!(status, 408 | 429) || *status >= 500
            }
            DeliveryError::Transport { .. } => true,
        }
    }
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
