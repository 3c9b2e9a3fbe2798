#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

mod error;
mod kv;
mod memory;
mod object;
mod set;
mod storage;

pub use error::{StorageError, StorageResult};
pub use kv::{KeyValueStorage, KeyValueStore, MemoryKeyValueStore};
pub use memory::MemoryStorage;
pub use object::{DEFAULT_OBJECT_TTL, ObjectStorage, ObjectStore, StoredRecord};
pub use set::{StorageSet, StorageSetBuilder};
pub use storage::{DeleteStatus, Storage};
