use super::*;
use restock_monitor::{AppConfig, HealthCheck};

#[tokio::test]
async fn test_health_check_against_local_services() -> anyhow::Result<()> {
    let store = storefront(shopify_search_page("Nike Dunk Low Panda", &["9"])).await;
    let hook = webhook().await;
    let dir = tempfile::tempdir()?;
    let config = AppConfig::load(&write_config(dir.path(), &store.uri(), &hook.uri(), None))?;

    HealthCheck::new(&config)?.run().await?;

    let requests = hook.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body)?;
    assert_eq!(body["embeds"][0]["title"], "Restock Monitor Startup");
    Ok(())
}

#[tokio::test]
async fn test_health_check_rejects_unreachable_webhook() -> anyhow::Result<()> {
    let store = storefront(shopify_search_page("Nike Dunk Low Panda", &["9"])).await;
    let dir = tempfile::tempdir()?;
    // Nothing listens on port 9.
    let config = AppConfig::load(&write_config(dir.path(), &store.uri(), "http://127.0.0.1:9", None))?;

    let err = HealthCheck::new(&config)?.run().await.unwrap_err();
    assert!(err.to_string().contains("startup ping failed"));
    Ok(())
}
