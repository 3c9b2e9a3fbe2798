use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a cached response body is persisted.
///
/// Each request picks one target. The memory and key-value targets never
/// expire entries; the object store records an expiration per entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageTarget {
    /// Process memory, owned by the client's registry.
    #[default]
    #[serde(alias = "window")]
    Memory,
    /// Persistent key-value store that survives restarts.
    #[serde(alias = "localStorage")]
    Local,
    /// Key-value store scoped to the current session.
    #[serde(alias = "sessionStorage")]
    Session,
    /// Asynchronous embedded object store with per-entry expiration.
    #[serde(alias = "indexDB")]
    ObjectStore,
}

impl StorageTarget {
    /// Every target, in lookup-table order.
    pub const ALL: [StorageTarget; 4] = [
        StorageTarget::Memory,
        StorageTarget::Local,
        StorageTarget::Session,
        StorageTarget::ObjectStore,
    ];

    /// Position of this target in a lookup table built from [`StorageTarget::ALL`].
    pub const fn index(self) -> usize {
        match self {
            StorageTarget::Memory => 0,
            StorageTarget::Local => 1,
            StorageTarget::Session => 2,
            StorageTarget::ObjectStore => 3,
        }
    }

    /// Short name used in logs and metrics labels.
    pub const fn as_str(self) -> &'static str {
        match self {
            StorageTarget::Memory => "memory",
            StorageTarget::Local => "local",
            StorageTarget::Session => "session",
            StorageTarget::ObjectStore => "object_store",
        }
    }
}

impl fmt::Display for StorageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_tags_deserialize() {
        let targets: Vec<StorageTarget> =
            serde_json::from_str(r#"["window", "localStorage", "sessionStorage", "indexDB"]"#)
                .unwrap();
        assert_eq!(targets, StorageTarget::ALL);
    }

    #[test]
    fn test_index_matches_all_order() {
        for (position, target) in StorageTarget::ALL.iter().enumerate() {
            assert_eq!(target.index(), position);
        }
    }
}
