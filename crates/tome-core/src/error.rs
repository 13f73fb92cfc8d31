//! Error types for Tome Core.

use thiserror::Error;

/// Core errors that can occur while encoding documents or building queries.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The document could not be turned into the encoded tree.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The encoded tree could not be turned back into the document type.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Documents must encode to a map of named fields.
    #[error("document must encode to a map of fields, got {0}")]
    NotAMap(&'static str),

    #[error("invalid document id: {0}")]
    InvalidId(String),

    #[error("invalid field path: {0}")]
    InvalidPath(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
