use std::path::{Path, PathBuf};
use std::sync::Arc;

use feoxdb::{FeoxError, FeoxStore};
use fetchbox_backend::{KeyValueStore, StorageError, StorageResult};
use tracing::trace;

use crate::FeOxDbError;

/// Disk-backed [`KeyValueStore`] using FeOxDB.
///
/// Keys and values are stored as UTF-8 bytes. Wrap it in a
/// [`KeyValueStorage`](fetchbox_backend::KeyValueStorage) (or hand it to
/// [`StorageSetBuilder::local`](fetchbox_backend::StorageSetBuilder::local))
/// to get JSON-encoded cached bodies that survive a restart.
///
/// ```no_run
/// use fetchbox_feoxdb::FeOxDbStore;
///
/// let store = FeOxDbStore::builder()
///     .path("/var/cache/myapp")
///     .max_file_size(512 * 1024 * 1024)
///     .max_memory(64 * 1024 * 1024)
///     .build()?;
/// # Ok::<(), fetchbox_feoxdb::FeOxDbError>(())
/// ```
///
/// Clones share the same underlying database.
#[derive(Clone)]
pub struct FeOxDbStore {
    store: Arc<FeoxStore>,
}

impl FeOxDbStore {
    /// Starts building a new store.
    pub fn builder() -> FeOxDbStoreBuilder {
        FeOxDbStoreBuilder::default()
    }

    /// Memory-only store. Data is lost when dropped.
    pub fn in_memory() -> Result<Self, FeOxDbError> {
        Self::builder().build()
    }

    /// Forces buffered writes to disk.
    ///
    /// No-op in memory-only mode.
    pub fn flush(&self) {
        self.store.flush();
    }
}

impl std::fmt::Debug for FeOxDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeOxDbStore").finish_non_exhaustive()
    }
}

/// Builder for [`FeOxDbStore`].
#[derive(Debug, Default)]
pub struct FeOxDbStoreBuilder {
    path: Option<PathBuf>,
    max_file_size: Option<u64>,
    max_memory: Option<usize>,
}

impl FeOxDbStoreBuilder {
    /// Persists data at `path`.
    ///
    /// If `path` is a directory, `local.db` is created inside it. Without a
    /// path the store is memory-only.
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Pre-allocated size of the database file. Writes fail when it is full.
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = Some(bytes);
        self
    }

    /// Caps RAM usage. FeOxDB does not evict, so writes fail at the limit.
    pub fn max_memory(mut self, bytes: usize) -> Self {
        self.max_memory = Some(bytes);
        self
    }

    /// Opens the database.
    pub fn build(self) -> Result<FeOxDbStore, FeOxDbError> {
        let mut builder = FeoxStore::builder();

        if let Some(mut path) = self.path {
            if path.is_dir() {
                path.push("local.db");
            } else if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            builder = builder.device_path(path.to_string_lossy().to_string());
        }

        if let Some(file_size) = self.max_file_size {
            builder = builder.file_size(file_size);
        }

        if let Some(memory) = self.max_memory {
            builder = builder.max_memory(memory);
        }

        Ok(FeOxDbStore {
            store: Arc::new(builder.build()?),
        })
    }
}

impl KeyValueStore for FeOxDbStore {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        match self.store.get(key.as_bytes()) {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(StorageError::internal),
            Err(FeoxError::KeyNotFound) => Ok(None),
            Err(err) => Err(StorageError::internal(err)),
        }
    }

    fn set_item(&self, key: &str, value: String) -> StorageResult<()> {
        trace!(key, len = value.len(), "feoxdb insert");
        self.store
            .insert(key.as_bytes(), value.as_bytes())
            .map(|_| ())
            .map_err(StorageError::internal)
    }

    fn remove_item(&self, key: &str) -> StorageResult<bool> {
        if !self.store.contains_key(key.as_bytes()) {
            return Ok(false);
        }
        self.store
            .delete(key.as_bytes())
            .map_err(StorageError::internal)?;
        Ok(true)
    }
}
