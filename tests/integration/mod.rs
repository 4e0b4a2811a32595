// Shared fixtures for the integration suite: a fake storefront, a fake
// webhook and a config file pointing at both.

pub mod health_tests;
pub mod persistence_tests;
pub mod pipeline_tests;

use std::path::{Path, PathBuf};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const WEBHOOK_PATH: &str = "/api/webhooks/1/abc";

/// Search page with one JSON-LD product carrying `sizes`.
pub fn shopify_search_page(title: &str, sizes: &[&str]) -> String {
    let offers: Vec<serde_json::Value> = sizes
        .iter()
        .map(|size| {
            serde_json::json!({
                "@type": "Offer",
                "name": size,
                "price": "120.00",
                "availability": "https://schema.org/InStock"
            })
        })
        .collect();
    let product = serde_json::json!({
        "@type": "Product",
        "name": title,
        "url": "/products/dunk-low-panda",
        "image": "https://cdn.example.com/panda.jpg",
        "offers": offers,
    });
    format!(
        r#"<html><head><script type="application/ld+json">{}</script></head><body></body></html>"#,
        product
    )
}

/// A storefront answering every search with `page`.
pub async fn storefront(page: String) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .mount(&server)
        .await;
    server
}

/// A webhook endpoint that accepts everything.
pub async fn webhook() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(WEBHOOK_PATH))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    server
}

pub async fn request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|requests| requests.len())
        .unwrap_or(0)
}

/// Write a TOML config for one shopify store and one webhook.
pub fn write_config(
    dir: &Path,
    store_url: &str,
    webhook_url: &str,
    persist_path: Option<&Path>,
) -> PathBuf {
    let state = persist_path
        .map(|p| format!("[state]\npersist_path = {:?}\n", p.display().to_string()))
        .unwrap_or_default();

    let toml = format!(
        r#"
[defaults]
keywords = ["dunk"]
refresh_interval = 3.0
jitter_min = 0.0
jitter_max = 0.0

[retry]
base_delay_ms = 10
max_exponent = 1
jitter_max_ms = 0
max_attempts = 2

[delivery]
max_retries = 1
base_delay_ms = 10
max_exponent = 1
jitter_max_ms = 0
timeout_secs = 5

[health]
connectivity_url = "{store_url}/search"

{state}
[[stores]]
name = "Kith"
platform = "shopify"
base_url = "{store_url}"

[[endpoints]]
name = "drops"
url = "{webhook_url}{WEBHOOK_PATH}"
username = "Restock Bot"
"#
    );

    let path = dir.join("config.toml");
    std::fs::write(&path, toml).expect("write test config");
    path
}

/// Poll until `server` has seen at least `count` requests.
pub async fn wait_for_requests(server: &MockServer, count: usize) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < Duration::from_secs(5) {
        if request_count(server).await >= count {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}
