use super::*;
use restock_monitor::{AppConfig, Orchestrator};

#[tokio::test]
async fn test_new_product_reaches_webhook() -> anyhow::Result<()> {
    let store = storefront(shopify_search_page("Nike Dunk Low Panda", &["9", "10"])).await;
    let hook = webhook().await;
    let dir = tempfile::tempdir()?;
    let config = AppConfig::load(&write_config(dir.path(), &store.uri(), &hook.uri(), None))?;

    let mut orchestrator = Orchestrator::new(&config)?;
    orchestrator.start().await?;

    let delivered = wait_for_requests(&hook, 1).await;
    orchestrator.shutdown().await?;
    assert!(delivered, "expected a webhook delivery");

    let requests = hook.received_requests().await.unwrap_or_default();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body)?;
    assert_eq!(body["username"], "Restock Bot");
    assert_eq!(body["embeds"][0]["title"], "Nike Dunk Low Panda");
    assert_eq!(body["embeds"][0]["description"], "New product: 9, 10");
    assert_eq!(body["embeds"][0]["fields"][0]["value"], "$120.00");
    Ok(())
}

#[tokio::test]
async fn test_unmatched_keyword_sends_nothing() -> anyhow::Result<()> {
    let store = storefront(shopify_search_page("Air Jordan 1", &["9"])).await;
    let hook = webhook().await;
    let dir = tempfile::tempdir()?;
    let config = AppConfig::load(&write_config(dir.path(), &store.uri(), &hook.uri(), None))?;

    let mut orchestrator = Orchestrator::new(&config)?;
    orchestrator.start().await?;
    let polled = wait_for_requests(&store, 1).await;
    orchestrator.shutdown().await?;

    assert!(polled);
    assert_eq!(request_count(&hook).await, 0);
    Ok(())
}

#[tokio::test]
async fn test_rate_limited_store_does_not_notify() -> anyhow::Result<()> {
    let store = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .respond_with(wiremock::ResponseTemplate::new(429))
        .mount(&store)
        .await;
    let hook = webhook().await;
    let dir = tempfile::tempdir()?;
    let config = AppConfig::load(&write_config(dir.path(), &store.uri(), &hook.uri(), None))?;

    let mut orchestrator = Orchestrator::new(&config)?;
    orchestrator.start().await?;
    // max_attempts = 2 in the test config
    let retried = wait_for_requests(&store, 2).await;
    orchestrator.shutdown().await?;

    assert!(retried);
    assert_eq!(request_count(&hook).await, 0);
    assert_eq!(orchestrator.running().len(), 0);
    Ok(())
}
