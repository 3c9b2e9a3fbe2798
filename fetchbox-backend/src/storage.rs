use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::StorageResult;

/// Status of deleting result.
#[derive(Debug, PartialEq, Eq)]
pub enum DeleteStatus {
    /// Record successfully deleted.
    Deleted(u32),
    /// Record already missing.
    Missing,
}

/// A place where cached response bodies live.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Reads the value stored under `key`.
    async fn get(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &Value) -> StorageResult<()>;

    /// Removes the value stored under `key`.
    async fn remove(&self, key: &str) -> StorageResult<DeleteStatus>;

    /// Deletes entries whose expiration has passed and returns how many were
    /// removed. Storages without expiration have nothing to do.
    async fn clear_expired(&self) -> StorageResult<usize> {
        Ok(0)
    }

    /// Name used in logs and metrics labels.
    fn name(&self) -> &str {
        "storage"
    }
}

#[async_trait]
impl<T> Storage for Arc<T>
where
    T: Storage + ?Sized,
{
    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &Value) -> StorageResult<()> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> StorageResult<DeleteStatus> {
        (**self).remove(key).await
    }

    async fn clear_expired(&self) -> StorageResult<usize> {
        (**self).clear_expired().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
