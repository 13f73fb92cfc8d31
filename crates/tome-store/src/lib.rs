//! # Tome Store
//!
//! Storage abstraction for Tome. Provides a trait-based interface for
//! document persistence with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The store module abstracts document storage behind the [`Backend`] trait,
//! allowing the session layer to be storage-agnostic. The persistent
//! implementation is [`SqliteBackend`], with [`MemoryBackend`] for ephemeral
//! embedded use and tests.
//!
//! ## Key Types
//!
//! - [`Backend`] - The blocking trait for all storage operations
//! - [`SqliteBackend`] - SQLite-based persistent storage
//! - [`MemoryBackend`] - In-memory storage
//! - [`StoredDocument`] - A persisted record: id, collection, type tag, body, etag
//! - [`WriteBatch`] - A set of writes applied all-or-nothing
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tome_store::{Backend, SqliteBackend, StoredDocument, WriteBatch};
//! use tome_core::DocumentId;
//!
//! let backend = SqliteBackend::open("tome.db").unwrap();
//!
//! let mut batch = WriteBatch::new();
//! let id = DocumentId::new("people/1").unwrap();
//! batch.put(StoredDocument::new(id, "People", "app::Person", vec![0xa0]), None);
//! backend.apply(&batch).unwrap();
//!
//! let people = backend.scan("People").unwrap();
//! ```
//!
//! ## Design Notes
//!
//! - **Upserts**: `put` overwrites any prior value for the id
//! - **Quiet deletes**: deleting a missing id is not an error
//! - **Atomic batches**: `apply` writes everything or nothing
//! - **Etags**: every write gets a store-wide increasing etag, used for
//!   optimistic concurrency

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;
pub use traits::{Backend, StoredDocument, WriteBatch, WriteOp};
