//! Error types for storage operations.

use fetchbox_core::StorageTarget;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error type for storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No storage is configured for the requested target.
    #[error("storage target `{0}` is not configured")]
    Unavailable(StorageTarget),

    /// A value could not be encoded or decoded.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// The underlying store failed.
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl StorageError {
    /// Wraps any store-specific error.
    pub fn internal<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StorageError::Internal(Box::new(err))
    }
}
