//! # Tome Testkit
//!
//! Testing utilities for Tome.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Model**: `MyDocument`, a sample document exercising every field kind
//!   the store has to carry (text, integers, floats, decimals, dates,
//!   arrays, nested objects, and schemaless values)
//! - **Fixtures**: Stores over each backend and the standard query data set
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Test Fixtures
//!
//! ```rust
//! use tome_testkit::{fixtures::TestFixture, model::MyDocument};
//!
//! let fixture = TestFixture::memory();
//! let mut session = fixture.store.open_session();
//! let doc = session.store(MyDocument::sample()).unwrap();
//! assert_eq!(doc.id(), "mydocuments/1");
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use tome_testkit::generators::my_document;
//!
//! proptest! {
//!     #[test]
//!     fn survives_a_commit(doc in my_document()) {
//!         // store, save, reload, compare
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod model;

pub use fixtures::{all_fixtures, init_tracing, query_documents, TestFixture};
pub use generators::my_document;
pub use model::{ChildObject, MyDocument};
