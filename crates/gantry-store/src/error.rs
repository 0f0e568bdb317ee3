//! Error types for the store adapter.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// A named lock could not be acquired within the bounded wait.
    #[error("lock '{name}' not acquired within {waited_ms} ms")]
    LockTimeout { name: String, waited_ms: u64 },

    /// The store URL could not be parsed.
    #[error("invalid store URL: {0}")]
    InvalidUrl(String),

    /// Backend database error.
    #[error("database error: {0}")]
    Database(String),

    /// IO error from a file-backed store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}
