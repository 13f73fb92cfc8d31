//! Error types for the document store and sessions.

use tome_core::CoreError;
use tome_store::StoreError;
use thiserror::Error;

/// Errors that can occur during store and session operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The backend could not be opened. Fatal to that store instance.
    #[error("failed to initialize document store: {0}")]
    Initialization(#[source] StoreError),

    /// `save_changes` could not durably apply the batch. Nothing was written.
    #[error("failed to commit session: {0}")]
    Commit(#[source] StoreError),

    /// A document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] CoreError),

    /// Storage error outside of a commit.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Optimistic concurrency check failed at commit. Nothing was written.
    #[error("concurrency conflict on {id}: expected etag {expected}, found {actual}")]
    ConcurrencyConflict {
        id: String,
        expected: u64,
        actual: u64,
    },

    /// A different instance with this id is already tracked by the session.
    #[error("another instance with id {0} is already tracked by this session")]
    NonUniqueObject(String),

    /// The stored document belongs to another collection.
    #[error("document {id} is in collection {actual}, not {expected}")]
    CollectionMismatch {
        id: String,
        expected: &'static str,
        actual: String,
    },

    /// The session tracks this id under another Rust type.
    #[error("document {id} is tracked as {actual}, not {expected}")]
    TypeMismatch {
        id: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// The query could not be built (e.g. a malformed field path).
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The operation is not valid in the session's current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The session exceeded its backend round-trip budget.
    #[error("session exceeded the maximum of {0} requests")]
    TooManyRequests(u32),
}

impl Error {
    /// Whether the error came from encoding or decoding a document.
    pub fn is_serialization(&self) -> bool {
        matches!(
            self,
            Error::Serialization(
                CoreError::Serialization(_) | CoreError::Deserialization(_) | CoreError::NotAMap(_)
            )
        )
    }
}

/// Result type for store and session operations.
pub type Result<T> = std::result::Result<T, Error>;
