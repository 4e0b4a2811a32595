use super::*;
use restock_monitor::{AppConfig, Orchestrator, SeenStateStore};
use tokio_test::assert_ok;

#[tokio::test]
async fn test_seen_state_survives_restart() -> anyhow::Result<()> {
    let store = storefront(shopify_search_page("Nike Dunk Low Panda", &["9", "10"])).await;
    let hook = webhook().await;
    let dir = tempfile::tempdir()?;
    let state_path = dir.path().join("data").join("seen.json");
    let config_path = write_config(dir.path(), &store.uri(), &hook.uri(), Some(&state_path));
    let config = AppConfig::load(&config_path)?;

    // First run announces the product and persists it.
    let mut first = Orchestrator::new(&config)?;
    first.start().await?;
    assert!(wait_for_requests(&hook, 1).await);
    assert_ok!(first.shutdown().await);
    assert!(state_path.exists());

    let persisted = SeenStateStore::load(&state_path).await?;
    assert_eq!(persisted.partition_len("Kith"), 1);

    // Second run restores it and stays quiet for the same listing.
    let polls_before = request_count(&store).await;
    let mut second = Orchestrator::new(&config)?;
    second.start().await?;
    assert_eq!(second.seen_state().partition_len("Kith"), 1);
    assert!(wait_for_requests(&store, polls_before + 1).await);
    second.shutdown().await?;

    assert_eq!(request_count(&hook).await, 1);
    Ok(())
}

#[tokio::test]
async fn test_corrupt_state_file_fails_start() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let state_path = dir.path().join("seen.json");
    std::fs::write(&state_path, "{ not json")?;
    let config_path = write_config(dir.path(), "https://kith.com", "https://discord.com", Some(&state_path));

    let mut orchestrator = Orchestrator::new(&AppConfig::load(&config_path)?)?;
    assert!(orchestrator.start().await.is_err());
    Ok(())
}
