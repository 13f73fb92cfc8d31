//! # Tome
//!
//! An embedded document store with unit-of-work sessions.
//!
//! ## Overview
//!
//! - **DocumentStore**: Created once per process. Owns the backend and
//!   hands out identifiers.
//! - **Session**: A short-lived unit of work. Tracks loaded and stored
//!   documents in an identity map and writes every change atomically on
//!   `save_changes`.
//! - **Queries**: Field predicates and closures evaluated over one
//!   collection, returned through the session's identity map.
//! - **Backends**: In-memory or SQLite (file or in-memory), behind one
//!   [`store::Backend`] trait.
//!
//! ## Key Concepts
//!
//! - **Identifier**: Each document has a string id such as
//!   `mydocuments/1`. Documents stored without one get it at `store` time.
//! - **Identity map**: Within one session, an id maps to exactly one
//!   in-memory instance.
//! - **Etag**: Version stamped by the backend on every write. With
//!   optimistic concurrency on, a commit fails if a document changed since
//!   the session read it.
//!
//! ## Usage
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use tome::{Document, DocumentStore, StoreConfig};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Person {
//!     id: String,
//!     name: String,
//! }
//!
//! impl Document for Person {
//!     const COLLECTION: &'static str = "People";
//!     fn id(&self) -> &str { &self.id }
//!     fn set_id(&mut self, id: String) { self.id = id; }
//! }
//!
//! # fn main() -> tome::Result<()> {
//! let store = DocumentStore::initialize(StoreConfig::memory())?;
//!
//! let id = {
//!     let mut session = store.open_session();
//!     let person = session.store(Person { id: String::new(), name: "Ada".into() })?;
//!     session.save_changes()?;
//!     person.id()
//! };
//! assert_eq!(id, "people/1");
//!
//! let mut session = store.open_session();
//! let ada = session.query::<Person>().where_eq("name", "Ada").first()?;
//! assert!(ada.is_some());
//! # Ok(())
//! # }
//! ```
//!
//! ## Re-exports
//!
//! - `tome::core` - Document trait, identifiers, encoding, predicates
//! - `tome::store` - Backend trait, in-memory and SQLite backends

pub mod config;
pub mod document_store;
pub mod entity;
pub mod error;
pub mod hilo;
pub mod query;
pub mod session;

// Re-export component crates
pub use tome_core as core;
pub use tome_store as store;

// Re-export main types for convenience
pub use config::{BackendConfig, IdStrategy, StoreConfig};
pub use document_store::DocumentStore;
pub use entity::Entity;
pub use error::{Error, Result};
pub use query::Query;
pub use session::Session;

// Re-export commonly used core types
pub use tome_core::{CompareOp, Document, DocumentId, FieldPath, Predicate, Value};
