use serde_json::{Value, json};
use std::collections::BTreeSet;

use crate::config::EndpointConfig;
use crate::models::{EventKind, NotificationEvent};

pub const FOOTER_TEXT: &str = "restock-monitor";

const NEW_COLOR: u32 = 0x2ecc71;
const RESTOCK_COLOR: u32 = 0x3498db;
const HEALTH_COLOR: u32 = 0x95a5a6;

// Discord rejects embeds past these lengths.
const TITLE_LIMIT: usize = 256;
const DESCRIPTION_LIMIT: usize = 4096;
const FIELD_LIMIT: usize = 1024;

/// Sizes in shoe-size order: numeric sizes ascending, then the rest.
pub fn format_sizes(sizes: &BTreeSet<String>) -> String {
    if sizes.is_empty() {
        return "N/A".to_string();
    }
    let mut ordered: Vec<&String> = sizes.iter().collect();
    ordered.sort_by(|a, b| {
        let (x, y) = (a.parse::<f64>().ok(), b.parse::<f64>().ok());
        match (x, y) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.cmp(b),
        }
    });
    ordered
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(limit.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

fn field(name: &str, value: &str, inline: bool) -> Value {
    json!({
        "name": name,
        "value": truncate(value, FIELD_LIMIT),
        "inline": inline,
    })
}

fn wrap(embed: Value, endpoint: &EndpointConfig) -> Value {
    let mut payload = json!({ "embeds": [embed] });
    if let Some(username) = &endpoint.username {
        payload["username"] = json!(username);
    }
    if let Some(avatar_url) = &endpoint.avatar_url {
        payload["avatar_url"] = json!(avatar_url);
    }
    payload
}

/// Webhook body announcing a new product or a restock.
pub fn event_payload(event: &NotificationEvent, endpoint: &EndpointConfig) -> Value {
    let product = &event.product;
    let sizes = format_sizes(&event.new_sizes);
    let (description, color) = match event.kind {
        EventKind::New => (format!("New product: {}", sizes), NEW_COLOR),
        EventKind::Restock => (format!("Restocked sizes: {}", sizes), RESTOCK_COLOR),
    };

    let mut embed = json!({
        "title": truncate(product.title(), TITLE_LIMIT),
        "url": product.url(),
        "description": truncate(&description, DESCRIPTION_LIMIT),
        "color": color,
        "fields": [
            field("Price", &product.formatted_price(), true),
            field("Sizes", &sizes, false),
            field("Direct Link", product.direct_link(), false),
        ],
        "footer": { "text": format!("{} | {}", product.site(), FOOTER_TEXT) },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    if let Some(image) = product.image() {
        embed["thumbnail"] = json!({ "url": image });
    }

    wrap(embed, endpoint)
}

/// Startup ping confirming the endpoint accepts deliveries.
pub fn startup_payload(endpoint: &EndpointConfig, stores: &[String]) -> Value {
    let embed = json!({
        "title": "Restock Monitor Startup",
        "description": "Startup health check completed successfully. Monitors will now begin polling.",
        "color": HEALTH_COLOR,
        "fields": [
            field("Stores", &stores.join(", "), false),
        ],
        "footer": { "text": "This message confirms webhook delivery." },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    wrap(embed, endpoint)
}
