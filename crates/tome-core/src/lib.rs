//! # Tome Core
//!
//! Pure primitives for Tome: documents, identifiers, encoding, and query
//! predicates.
//!
//! This crate contains no I/O and no storage. It is pure computation over
//! document trees.
//!
//! ## Key Types
//!
//! - [`Document`] - What a type implements to be persisted
//! - [`DocumentId`] - Non-empty string identifier
//! - [`FieldPath`] - Dotted path into a document tree (`ChildObject.Hello`)
//! - [`Predicate`] - Filter evaluated against a document tree
//!
//! ## Encoding
//!
//! Documents are encoded to a self-describing CBOR tree with canonically
//! ordered maps. See the [`canonical`] module.

pub mod canonical;
pub mod document;
pub mod error;
pub mod query;
pub mod types;

pub use canonical::{canonical_bytes, decode_document, encode_document, from_bytes, to_bytes};
pub use document::Document;
pub use error::{CoreError, Result};
pub use query::{compare_values, CompareOp, FieldPath, Predicate};
pub use types::DocumentId;

/// The tree type documents are encoded into.
pub use ciborium::value::Value;
