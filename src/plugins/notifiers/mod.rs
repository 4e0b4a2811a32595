// Webhook payload formats
pub mod discord;

pub use discord::{event_payload, startup_payload};
