//! Lazily opened object store over a Moka async cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fetchbox_backend::{DeleteStatus, ObjectStore, StorageResult, StoredRecord};
use moka::future::Cache;
use serde_json::Value;
use smol_str::SmolStr;
use tokio::sync::OnceCell;
use tracing::debug;

const DEFAULT_MAX_CAPACITY: u64 = 10_000;

/// Object store of [`StoredRecord`]s held in a Moka cache.
///
/// The database is identified by a name and a schema version, and is opened
/// on the first call that needs it. Every later call, from this handle or
/// any clone of it, reuses the same database.
///
/// Records are not expired by Moka itself. An expired record is removed when
/// it is read, or by [`ObjectStore::clear_expired`]. Moka only evicts when
/// `max_capacity` is exceeded.
#[derive(Clone)]
pub struct MokaObjectStore {
    name: SmolStr,
    version: u32,
    max_capacity: u64,
    database: Arc<OnceCell<Cache<String, StoredRecord>>>,
}

impl std::fmt::Debug for MokaObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaObjectStore")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("max_capacity", &self.max_capacity)
            .field("opened", &self.is_open())
            .finish()
    }
}

impl MokaObjectStore {
    /// Starts building a store for the database called `name`.
    pub fn builder(name: impl Into<SmolStr>) -> MokaObjectStoreBuilder {
        MokaObjectStoreBuilder::new(name)
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Database schema version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Whether the database has been opened yet.
    pub fn is_open(&self) -> bool {
        self.database.initialized()
    }

    /// Number of records currently held, including expired ones not yet
    /// cleared. Zero before the database is opened.
    pub async fn entry_count(&self) -> u64 {
        match self.database.get() {
            Some(cache) => {
                cache.run_pending_tasks().await;
                cache.entry_count()
            }
            None => 0,
        }
    }

    async fn database(&self) -> &Cache<String, StoredRecord> {
        self.database
            .get_or_init(|| async {
                debug!(
                    database = %self.name,
                    version = self.version,
                    "Opening object store"
                );
                Cache::builder()
                    .name(&format!("{}-v{}", self.name, self.version))
                    .max_capacity(self.max_capacity)
                    .build()
            })
            .await
    }

    async fn record_entries(&self, cache: &Cache<String, StoredRecord>) {
        cache.run_pending_tasks().await;
        crate::metrics::record_entries(&self.name, cache.entry_count());
    }
}

/// Builder for [`MokaObjectStore`].
#[derive(Debug, Clone)]
pub struct MokaObjectStoreBuilder {
    name: SmolStr,
    version: u32,
    max_capacity: u64,
}

impl MokaObjectStoreBuilder {
    /// New builder at schema version 1.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            version: 1,
            max_capacity: DEFAULT_MAX_CAPACITY,
        }
    }

    /// Schema version. Databases with different versions never share records.
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Maximum number of records before least recently used ones are evicted.
    pub fn max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = capacity;
        self
    }

    /// Creates the store. The database itself is opened on first use.
    pub fn build(self) -> MokaObjectStore {
        MokaObjectStore {
            name: self.name,
            version: self.version,
            max_capacity: self.max_capacity,
            database: Arc::new(OnceCell::new()),
        }
    }
}

#[async_trait]
impl ObjectStore for MokaObjectStore {
    async fn store(&self, key: &str, value: Value, ttl: Duration) -> StorageResult<()> {
        let cache = self.database().await;
        cache
            .insert(key.to_owned(), StoredRecord::new(value, ttl))
            .await;
        self.record_entries(cache).await;
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> StorageResult<Option<Value>> {
        let cache = self.database().await;
        match cache.get(key).await {
            Some(record) if record.is_expired() => {
                cache.invalidate(key).await;
                Ok(None)
            }
            Some(record) => Ok(Some(record.value)),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<DeleteStatus> {
        let cache = self.database().await;
        let status = match cache.remove(key).await {
            Some(_) => DeleteStatus::Deleted(1),
            None => DeleteStatus::Missing,
        };
        self.record_entries(cache).await;
        Ok(status)
    }

    async fn clear_expired(&self) -> StorageResult<usize> {
        let cache = self.database().await;
        let expired = cache
            .iter()
            .filter(|(_, record)| record.is_expired())
            .map(|(key, _)| key)
            .collect::<Vec<_>>();
        for key in &expired {
            cache.invalidate(key.as_str()).await;
        }
        self.record_entries(cache).await;
        Ok(expired.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, Utc};
    use serde_json::json;

    fn store() -> MokaObjectStore {
        MokaObjectStore::builder("fetchbox-test").build()
    }

    async fn insert_expired(store: &MokaObjectStore, key: &str) {
        let record = StoredRecord {
            value: json!({"stale": true}),
            expiration: Utc::now() - TimeDelta::seconds(1),
        };
        store.database().await.insert(key.to_owned(), record).await;
    }

    #[tokio::test]
    async fn test_opens_lazily_once() {
        let store = store();
        let clone = store.clone();
        assert!(!store.is_open());

        store
            .store("/users", json!([1]), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(clone.is_open());
        assert_eq!(clone.retrieve("/users").await.unwrap(), Some(json!([1])));
    }

    #[tokio::test]
    async fn test_retrieve_missing() {
        assert_eq!(store().retrieve("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_record_is_removed_on_read() {
        let store = store();
        insert_expired(&store, "/old").await;

        assert_eq!(store.retrieve("/old").await.unwrap(), None);
        assert_eq!(store.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_clear_expired_keeps_live_records() {
        let store = store();
        insert_expired(&store, "/a").await;
        insert_expired(&store, "/b").await;
        store
            .store("/c", json!("live"), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.clear_expired().await.unwrap(), 2);
        assert_eq!(store.entry_count().await, 1);
        assert_eq!(store.retrieve("/c").await.unwrap(), Some(json!("live")));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = store();
        store
            .store("/users", json!(1), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.delete("/users").await.unwrap(), DeleteStatus::Deleted(1));
        assert_eq!(store.delete("/users").await.unwrap(), DeleteStatus::Missing);
    }

    #[tokio::test]
    async fn test_builder_settings() {
        let store = MokaObjectStore::builder("app").version(3).build();
        assert_eq!(store.name(), "app");
        assert_eq!(store.version(), 3);
        assert_eq!(store.entry_count().await, 0);
    }
}
