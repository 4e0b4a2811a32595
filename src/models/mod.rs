use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub mod product;

pub use product::*;

/// What a store has already shown us for one product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeenEntry {
    pub key: String,
    pub sizes_seen: BTreeSet<String>,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    New,
    Restock,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::New => write!(f, "new"),
            EventKind::Restock => write!(f, "restock"),
        }
    }
}

/// Output of a diff; handed to the dispatcher exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationEvent {
    pub product: Product,
    pub kind: EventKind,
    pub new_sizes: BTreeSet<String>,
}

/// Retry bookkeeping for one (store, keyword) fetch target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackoffState {
    pub attempt: u32,
    pub consecutive_failures: u32,
}

impl BackoffState {
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.consecutive_failures = 0;
    }
}
