use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::models::{EventKind, NotificationEvent, Product, SeenEntry};
use crate::utils::error::Result;

type Partition = HashMap<String, SeenEntry>;

/// Previously observed products, partitioned by store.
///
/// Each monitor only ever touches its own partition, so the outer map lock is
/// held just long enough to look a partition up (or create it).
#[derive(Default)]
pub struct SeenStateStore {
    partitions: RwLock<HashMap<String, Arc<Mutex<Partition>>>>,
}

/// At-rest form of the whole store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SeenSnapshot {
    pub version: u32,
    pub stores: BTreeMap<String, Vec<SeenEntry>>,
}

const SNAPSHOT_VERSION: u32 = 1;

fn lock(partition: &Mutex<Partition>) -> MutexGuard<'_, Partition> {
    partition.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SeenStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, store_id: &str) -> Arc<Mutex<Partition>> {
        {
            let partitions = self.partitions.read().unwrap_or_else(|p| p.into_inner());
            if let Some(partition) = partitions.get(store_id) {
                return Arc::clone(partition);
            }
        }
        let mut partitions = self.partitions.write().unwrap_or_else(|p| p.into_inner());
        Arc::clone(partitions.entry(store_id.to_string()).or_default())
    }

    /// Compare a fetch result with what this store has seen before.
    pub fn diff(&self, store_id: &str, products: &[Product]) -> Vec<NotificationEvent> {
        self.diff_at(store_id, products, Utc::now())
    }

    pub fn diff_at(
        &self,
        store_id: &str,
        products: &[Product],
        now: DateTime<Utc>,
    ) -> Vec<NotificationEvent> {
        let partition = self.partition(store_id);
        let mut seen = lock(&partition);
        let mut events = Vec::new();

        for product in products {
            match seen.get_mut(product.key()) {
                None => {
                    seen.insert(
                        product.key().to_string(),
                        SeenEntry {
                            key: product.key().to_string(),
                            sizes_seen: product.sizes().clone(),
                            last_seen_at: now,
                        },
                    );
                    events.push(NotificationEvent {
                        product: product.clone(),
                        kind: EventKind::New,
                        new_sizes: product.sizes().clone(),
                    });
                }
                Some(entry) => {
                    entry.last_seen_at = now;
                    let new_sizes: std::collections::BTreeSet<String> = product
                        .sizes()
                        .difference(&entry.sizes_seen)
                        .cloned()
                        .collect();
                    if new_sizes.is_empty() {
                        continue;
                    }
                    entry.sizes_seen.extend(new_sizes.iter().cloned());
                    events.push(NotificationEvent {
                        product: product.clone(),
                        kind: EventKind::Restock,
                        new_sizes,
                    });
                }
            }
        }

        events
    }

    pub fn entry(&self, store_id: &str, key: &str) -> Option<SeenEntry> {
        let partitions = self.partitions.read().unwrap_or_else(|p| p.into_inner());
        let partition = partitions.get(store_id)?;
        let seen = lock(partition);
        seen.get(key).cloned()
    }

    pub fn partition_len(&self, store_id: &str) -> usize {
        let partitions = self.partitions.read().unwrap_or_else(|p| p.into_inner());
        partitions.get(store_id).map(|p| lock(p).len()).unwrap_or(0)
    }

    pub fn snapshot(&self) -> SeenSnapshot {
        let partitions = self.partitions.read().unwrap_or_else(|p| p.into_inner());
        let stores = partitions
            .iter()
            .map(|(store_id, partition)| {
                let mut entries: Vec<SeenEntry> = lock(partition).values().cloned().collect();
                entries.sort_by(|a, b| a.key.cmp(&b.key));
                (store_id.clone(), entries)
            })
            .collect();

        SeenSnapshot {
            version: SNAPSHOT_VERSION,
            stores,
        }
    }

    /// Merge a snapshot in; restored entries replace any with the same key.
    pub fn restore(&self, snapshot: SeenSnapshot) {
        for (store_id, entries) in snapshot.stores {
            let partition = self.partition(&store_id);
            let mut seen = lock(&partition);
            for entry in entries {
                seen.insert(entry.key.clone(), entry);
            }
        }
    }

    /// Load a persisted store. A missing file yields an empty store.
    pub async fn load(path: &Path) -> Result<Self> {
        let store = Self::new();
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let snapshot: SeenSnapshot = serde_json::from_slice(&bytes)?;
                tracing::info!(
                    "Restored seen-state for {} stores from {}",
                    snapshot.stores.len(),
                    path.display()
                );
                store.restore(snapshot);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No seen-state at {}, starting empty", path.display());
            }
            Err(e) => return Err(e.into()),
        }
        Ok(store)
    }

    /// Write the store to `path` through a temporary file and rename.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.snapshot())?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        tracing::debug!("Saved seen-state to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewProduct;
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    fn sizes(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn product(id: &str, size_values: &[&str]) -> Product {
        Product::new(NewProduct {
            title: format!("Product {}", id),
            url: format!("https://shop.example.com/products/{}", id),
            product_id: Some(id.to_string()),
            sizes: sizes(size_values),
            site: "Example".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_new_restock_unchanged_sequence() {
        let store = SeenStateStore::new();

        let events = store.diff("kith", &[product("A", &["9", "10"])]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::New);
        assert_eq!(events[0].new_sizes, sizes(&["9", "10"]));

        let events = store.diff("kith", &[product("A", &["9", "10", "11"])]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Restock);
        assert_eq!(events[0].new_sizes, sizes(&["11"]));

        let events = store.diff("kith", &[product("A", &["9", "10", "11"])]);
        assert!(events.is_empty());
    }

    #[test]
    fn test_diff_is_idempotent() {
        let store = SeenStateStore::new();
        let batch = vec![
            product("A", &["9"]),
            product("B", &["S", "M"]),
            product("C", &[]),
        ];

        assert_eq!(store.diff("kith", &batch).len(), 3);
        assert!(store.diff("kith", &batch).is_empty());
    }

    #[test]
    fn test_sizes_seen_is_monotonic() {
        let store = SeenStateStore::new();
        let polls: Vec<&[&str]> = vec![&["9"], &["10"], &[], &["9", "11"], &["12"]];

        let mut previous = BTreeSet::new();
        for poll in polls {
            store.diff("kith", &[product("A", poll)]);
            let current = store.entry("kith", product("A", &[]).key()).unwrap().sizes_seen;
            assert!(current.is_superset(&previous));
            previous = current;
        }
        assert_eq!(previous, sizes(&["9", "10", "11", "12"]));
    }

    #[test]
    fn test_absent_product_is_not_forgotten() {
        let store = SeenStateStore::new();
        store.diff("kith", &[product("A", &["9"]), product("B", &["10"])]);

        let events = store.diff("kith", &[product("B", &["10"])]);
        assert!(events.is_empty());
        assert_eq!(store.partition_len("kith"), 2);

        // A comes back with the size it had before: nothing new
        let events = store.diff("kith", &[product("A", &["9"])]);
        assert!(events.is_empty());
    }

    #[test]
    fn test_size_sold_out_then_back_is_not_a_restock() {
        let store = SeenStateStore::new();
        store.diff("kith", &[product("A", &["9", "10"])]);
        assert!(store.diff("kith", &[product("A", &["9"])]).is_empty());
        assert!(store.diff("kith", &[product("A", &["9", "10"])]).is_empty());
    }

    #[test]
    fn test_partitions_are_independent() {
        let store = SeenStateStore::new();
        assert_eq!(store.diff("kith", &[product("A", &["9"])]).len(), 1);
        assert_eq!(store.diff("undefeated", &[product("A", &["9"])]).len(), 1);
        assert_eq!(store.partition_len("kith"), 1);
        assert_eq!(store.partition_len("undefeated"), 1);
        assert_eq!(store.partition_len("unknown"), 0);
    }

    #[test]
    fn test_duplicate_keys_in_one_batch() {
        let store = SeenStateStore::new();
        let events = store.diff("kith", &[product("A", &["9"]), product("A", &["9", "10"])]);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::New);
        assert_eq!(events[1].kind, EventKind::Restock);
        assert_eq!(events[1].new_sizes, sizes(&["10"]));
    }

    #[test]
    fn test_last_seen_at_updates_without_events() {
        let store = SeenStateStore::new();
        let first = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2026, 1, 1, 12, 5, 0).unwrap();
        let key = product("A", &[]).key().to_string();

        store.diff_at("kith", &[product("A", &["9"])], first);
        assert_eq!(store.entry("kith", &key).unwrap().last_seen_at, first);

        assert!(store.diff_at("kith", &[product("A", &["9"])], second).is_empty());
        assert_eq!(store.entry("kith", &key).unwrap().last_seen_at, second);
    }

    #[test]
    fn test_snapshot_restore() {
        let store = SeenStateStore::new();
        store.diff("kith", &[product("A", &["9", "10"]), product("B", &[])]);
        store.diff("nike", &[product("C", &["7"])]);

        let restored = SeenStateStore::new();
        restored.restore(store.snapshot());

        assert_eq!(restored.snapshot(), store.snapshot());
        assert!(restored.diff("kith", &[product("A", &["9", "10"])]).is_empty());
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("seen.json");
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
            + chrono::Duration::nanoseconds(589_793_238);

        let store = SeenStateStore::new();
        store.diff_at("kith", &[product("A", &["9", "10"])], at);
        store.save(&path).await.unwrap();

        let loaded = SeenStateStore::load(&path).await.unwrap();
        let entry = loaded.entry("kith", product("A", &[]).key()).unwrap();
        assert_eq!(entry, store.entry("kith", product("A", &[]).key()).unwrap());
        assert_eq!(entry.last_seen_at, at);
        assert_eq!(entry.sizes_seen, sizes(&["9", "10"]));
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SeenStateStore::load(&dir.path().join("absent.json")).await.unwrap();
        assert!(store.snapshot().stores.is_empty());
    }

    #[tokio::test]
    async fn test_load_corrupt_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        assert!(SeenStateStore::load(&path).await.is_err());
    }
}
