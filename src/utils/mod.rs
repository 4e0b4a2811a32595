pub mod error;
pub mod logging;
pub mod telemetry;
pub mod user_agent;

pub use error::{AppError, DeliveryError, FetchError, FetchErrorKind};
