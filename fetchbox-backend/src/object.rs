//! Asynchronous object stores whose records carry their own expiration.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{DeleteStatus, Storage, StorageResult};

/// Time-to-live applied to object store records unless configured otherwise.
pub const DEFAULT_OBJECT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A value wrapped with its absolute expiration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// The stored value.
    pub value: Value,
    /// When the record stops being served.
    #[serde(rename = "expiration", with = "chrono::serde::ts_milliseconds")]
    pub expiration: DateTime<Utc>,
}

impl StoredRecord {
    /// Wraps `value` so it expires `ttl` from now.
    pub fn new(value: Value, ttl: Duration) -> Self {
        let expiration = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { value, expiration }
    }

    /// A record is served only strictly before its expiration.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiration
    }

    /// Whether the record has expired by now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Asynchronous embedded object store.
///
/// Implementations open their database lazily and reuse the connection for
/// every call.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `value` under `key`, expiring `ttl` from now.
    async fn store(&self, key: &str, value: Value, ttl: Duration) -> StorageResult<()>;

    /// Returns the value under `key` if it has not expired. Expired records
    /// are deleted and reported as missing.
    async fn retrieve(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Deletes the record under `key`.
    async fn delete(&self, key: &str) -> StorageResult<DeleteStatus>;

    /// Scans every record and deletes the expired ones, returning how many
    /// were removed.
    async fn clear_expired(&self) -> StorageResult<usize>;
}

#[async_trait]
impl<T> ObjectStore for std::sync::Arc<T>
where
    T: ObjectStore + ?Sized,
{
    async fn store(&self, key: &str, value: Value, ttl: Duration) -> StorageResult<()> {
        (**self).store(key, value, ttl).await
    }

    async fn retrieve(&self, key: &str) -> StorageResult<Option<Value>> {
        (**self).retrieve(key).await
    }

    async fn delete(&self, key: &str) -> StorageResult<DeleteStatus> {
        (**self).delete(key).await
    }

    async fn clear_expired(&self) -> StorageResult<usize> {
        (**self).clear_expired().await
    }
}

/// [`Storage`] over an [`ObjectStore`].
pub struct ObjectStorage<O> {
    store: O,
    ttl: Duration,
}

impl<O> ObjectStorage<O>
where
    O: ObjectStore,
{
    /// Wraps `store` with the default 24 hour time-to-live.
    pub fn new(store: O) -> Self {
        Self::with_ttl(store, DEFAULT_OBJECT_TTL)
    }

    /// Wraps `store` with a custom time-to-live.
    pub fn with_ttl(store: O, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// The wrapped store.
    pub fn store(&self) -> &O {
        &self.store
    }
}

#[async_trait]
impl<O> Storage for ObjectStorage<O>
where
    O: ObjectStore,
{
    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        self.store.retrieve(key).await
    }

    async fn set(&self, key: &str, value: &Value) -> StorageResult<()> {
        self.store.store(key, value.clone(), self.ttl).await
    }

    async fn remove(&self, key: &str) -> StorageResult<DeleteStatus> {
        self.store.delete(key).await
    }

    async fn clear_expired(&self) -> StorageResult<usize> {
        let removed = self.store.clear_expired().await?;
        debug!(removed, "Cleared expired object store records");
        Ok(removed)
    }

    fn name(&self) -> &str {
        "object_store"
    }
}
