//! Durable key-value storage contract.
//!
//! Mirrors the browser's local storage: string keys, string values, shared
//! by every context on the same origin with last-write-wins semantics and no
//! locking. Implementations live in `tourbook-cart`.

use thiserror::Error;

/// Errors reported by storage backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Storage is disabled (e.g. private browsing, read-only medium)
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Writing would exceed the backend's quota
    #[error("Storage quota exceeded: {needed} bytes needed, {remaining} remaining")]
    QuotaExceeded {
        /// Bytes the write needed
        needed: usize,
        /// Bytes left in the quota
        remaining: usize,
    },

    /// Underlying I/O failure
    #[error("Storage I/O failed: {0}")]
    Io(String),

    /// Stored data could not be decoded
    #[error("Stored data corrupt: {0}")]
    Corrupt(String),
}

impl From<std::io::Error> for StorageError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// String key-value storage.
pub trait KeyValueStorage: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the write cannot be performed.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value. Deleting a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the backend cannot be written.
    fn remove(&self, key: &str) -> Result<()>;

    /// All keys currently stored.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the backend cannot be read.
    fn keys(&self) -> Result<Vec<String>>;
}
