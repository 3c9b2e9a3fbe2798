//! Lookup table from [`StorageTarget`] to its storage.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use fetchbox_core::StorageTarget;

use crate::{
    KeyValueStorage, KeyValueStore, MemoryKeyValueStore, MemoryStorage, ObjectStorage,
    ObjectStore, Storage, StorageError, StorageResult,
};

type Slot = Option<Arc<dyn Storage>>;

/// One storage per [`StorageTarget`].
///
/// ```
/// use fetchbox_backend::{MemoryKeyValueStore, Storage, StorageSet};
/// use fetchbox_core::StorageTarget;
///
/// let set = StorageSet::builder()
///     .local(MemoryKeyValueStore::new())
///     .build();
///
/// assert_eq!(set.resolve(StorageTarget::Local).unwrap().name(), "local");
/// // No object store was configured.
/// assert!(set.resolve(StorageTarget::ObjectStore).is_err());
/// ```
#[derive(Clone)]
pub struct StorageSet {
    slots: [Slot; 4],
    memory: MemoryStorage,
}

impl StorageSet {
    /// Starts a builder with in-memory defaults for the memory, local and
    /// session targets and no object store.
    pub fn builder() -> StorageSetBuilder {
        StorageSetBuilder::default()
    }

    /// Returns the storage for `target`.
    pub fn resolve(&self, target: StorageTarget) -> StorageResult<&Arc<dyn Storage>> {
        self.slots[target.index()]
            .as_ref()
            .ok_or(StorageError::Unavailable(target))
    }

    /// The in-memory response map backing the memory target.
    pub fn memory(&self) -> &MemoryStorage {
        &self.memory
    }

    /// Every configured target with its storage.
    pub fn iter(&self) -> impl Iterator<Item = (StorageTarget, &Arc<dyn Storage>)> {
        StorageTarget::ALL
            .into_iter()
            .filter_map(|target| self.slots[target.index()].as_ref().map(|s| (target, s)))
    }
}

impl Default for StorageSet {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for StorageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                StorageTarget::ALL
                    .iter()
                    .map(|target| (target, self.slots[target.index()].as_ref().map(|s| s.name()))),
            )
            .finish()
    }
}

/// Builder for [`StorageSet`].
pub struct StorageSetBuilder {
    memory: MemoryStorage,
    slots: [Slot; 4],
}

impl Default for StorageSetBuilder {
    fn default() -> Self {
        Self {
            memory: MemoryStorage::new(),
            slots: [
                None,
                Some(Arc::new(KeyValueStorage::new(MemoryKeyValueStore::new(), "local"))),
                Some(Arc::new(KeyValueStorage::new(MemoryKeyValueStore::new(), "session"))),
                None,
            ],
        }
    }
}

impl StorageSetBuilder {
    /// Uses `memory` for the memory target.
    pub fn memory(mut self, memory: MemoryStorage) -> Self {
        self.memory = memory;
        self
    }

    /// Uses `store` for the local target.
    pub fn local<S>(self, store: S) -> Self
    where
        S: KeyValueStore + 'static,
    {
        self.target(StorageTarget::Local, KeyValueStorage::new(store, "local"))
    }

    /// Uses `store` for the session target.
    pub fn session<S>(self, store: S) -> Self
    where
        S: KeyValueStore + 'static,
    {
        self.target(StorageTarget::Session, KeyValueStorage::new(store, "session"))
    }

    /// Uses `store` for the object store target with the default time-to-live.
    pub fn object_store<O>(self, store: O) -> Self
    where
        O: ObjectStore + 'static,
    {
        self.target(StorageTarget::ObjectStore, ObjectStorage::new(store))
    }

    /// Uses `store` for the object store target with a custom time-to-live.
    pub fn object_store_with_ttl<O>(self, store: O, ttl: Duration) -> Self
    where
        O: ObjectStore + 'static,
    {
        self.target(StorageTarget::ObjectStore, ObjectStorage::with_ttl(store, ttl))
    }

    /// Uses any storage for `target`.
    pub fn target<S>(mut self, target: StorageTarget, storage: S) -> Self
    where
        S: Storage + 'static,
    {
        self.slots[target.index()] = Some(Arc::new(storage));
        self
    }

    /// Builds the lookup table.
    pub fn build(self) -> StorageSet {
        let mut slots = self.slots;
        if slots[StorageTarget::Memory.index()].is_none() {
            slots[StorageTarget::Memory.index()] = Some(Arc::new(self.memory.clone()));
        }
        StorageSet {
            slots,
            memory: self.memory,
        }
    }
}
