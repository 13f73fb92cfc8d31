//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during backend operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// An expected etag did not match the stored one. `0` means "absent".
    #[error("concurrency conflict on {id}: expected etag {expected}, found {actual}")]
    ConcurrencyConflict {
        id: String,
        expected: u64,
        actual: u64,
    },

    /// A stored row that does not form a valid document.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A backend lock was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
