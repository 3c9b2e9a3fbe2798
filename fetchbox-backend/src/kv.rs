//! String key-value stores and the JSON adapter that turns them into
//! [`Storage`].

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::{DeleteStatus, Storage, StorageResult};

/// Synchronous store of string values keyed by string.
///
/// This is the shape of the local and session targets: the store itself
/// only knows strings, encoding is done by [`KeyValueStorage`].
pub trait KeyValueStore: Send + Sync {
    /// Reads the string stored under `key`.
    fn get_item(&self, key: &str) -> StorageResult<Option<String>>;

    /// Stores `value` under `key`.
    fn set_item(&self, key: &str, value: String) -> StorageResult<()>;

    /// Removes `key`, returning whether it was present.
    fn remove_item(&self, key: &str) -> StorageResult<bool>;
}

impl<T> KeyValueStore for Arc<T>
where
    T: KeyValueStore + ?Sized,
{
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: String) -> StorageResult<()> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> StorageResult<bool> {
        (**self).remove_item(key)
    }
}

/// Key-value store that lives as long as the process.
///
/// Used for the session target, and for the local target when no
/// persistent store is configured.
#[derive(Clone, Debug, Default)]
pub struct MemoryKeyValueStore {
    items: Arc<DashMap<String, String>>,
}

impl MemoryKeyValueStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Removes every key, as when a session ends.
    pub fn clear(&self) {
        self.items.clear();
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.items.get(key).map(|item| item.value().clone()))
    }

    fn set_item(&self, key: &str, value: String) -> StorageResult<()> {
        self.items.insert(key.to_owned(), value);
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StorageResult<bool> {
        Ok(self.items.remove(key).is_some())
    }
}

/// [`Storage`] over a [`KeyValueStore`], JSON-encoding every value.
pub struct KeyValueStorage<S> {
    store: S,
    name: &'static str,
}

impl<S> KeyValueStorage<S>
where
    S: KeyValueStore,
{
    /// Wraps `store`, labelling it `name` in logs.
    pub fn new(store: S, name: &'static str) -> Self {
        Self { store, name }
    }

    /// The wrapped store.
    pub fn store(&self) -> &S {
        &self.store
    }
}

#[async_trait]
impl<S> Storage for KeyValueStorage<S>
where
    S: KeyValueStore,
{
    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        match self.store.get_item(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &Value) -> StorageResult<()> {
        let raw = serde_json::to_string(value)?;
        self.store.set_item(key, raw)
    }

    async fn remove(&self, key: &str) -> StorageResult<DeleteStatus> {
        if self.store.remove_item(key)? {
            Ok(DeleteStatus::Deleted(1))
        } else {
            Ok(DeleteStatus::Missing)
        }
    }

    fn name(&self) -> &str {
        self.name
    }
}
