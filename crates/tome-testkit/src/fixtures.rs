//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::TempDir;
use tome::{DocumentStore, StoreConfig};

use crate::model::{ChildObject, MyDocument};

/// Content shared by the five documents the query fixture can find.
pub const FINDABLE_CONTENT: &str = "Finders keepers!";
/// Content of the other five.
pub const OTHER_CONTENT: &str = "Can't see me!";

/// A store plus whatever keeps its backend alive.
pub struct TestFixture {
    pub name: &'static str,
    pub store: DocumentStore,
    /// Temporary directory backing a file database.
    dir: Option<TempDir>,
}

impl TestFixture {
    /// Store over the in-memory backend.
    pub fn memory() -> Self {
        Self::with_config("memory", StoreConfig::memory())
    }

    /// Store over SQLite held in memory.
    pub fn sqlite_memory() -> Self {
        Self::with_config("sqlite-memory", StoreConfig::sqlite_memory())
    }

    /// Store over a SQLite file in a fresh temporary directory.
    pub fn sqlite_file() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("tome.db");
        let store =
            DocumentStore::initialize(StoreConfig::sqlite(&path)).expect("open sqlite store");
        Self {
            name: "sqlite-file",
            store,
            dir: Some(dir),
        }
    }

    /// Store over the given configuration.
    pub fn with_config(name: &'static str, config: StoreConfig) -> Self {
        let store = DocumentStore::initialize(config).expect("initialize store");
        Self {
            name,
            store,
            dir: None,
        }
    }

    /// Path of the database file, for file-backed fixtures.
    pub fn db_path(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.path().join("tome.db"))
    }

    /// Open a second store on the same database file.
    ///
    /// Panics for fixtures without a file.
    pub fn reopen(&self, config: impl FnOnce(&Path) -> StoreConfig) -> DocumentStore {
        let path = self.db_path().expect("fixture has no database file");
        DocumentStore::initialize(config(&path)).expect("reopen store")
    }

    /// Store `docs` in one session and return their ids.
    pub fn seed(&self, docs: Vec<MyDocument>) -> Vec<String> {
        let mut session = self.store.open_session();
        let ids = docs
            .into_iter()
            .map(|doc| session.store(doc).expect("store").id())
            .collect();
        session.save_changes().expect("save seed documents");
        ids
    }
}

/// One fixture per backend.
pub fn all_fixtures() -> Vec<TestFixture> {
    vec![
        TestFixture::memory(),
        TestFixture::sqlite_memory(),
        TestFixture::sqlite_file(),
    ]
}

/// Ten documents: five with [`FINDABLE_CONTENT`] and `Boolean = true`,
/// five with [`OTHER_CONTENT`] and `Boolean = false`. All have
/// `ChildObject.Hello = "Query"` and `Integer` 1 through 10.
pub fn query_documents() -> Vec<MyDocument> {
    (1..=10)
        .map(|i| {
            let findable = i <= 5;
            MyDocument {
                content: if findable { FINDABLE_CONTENT } else { OTHER_CONTENT }.into(),
                boolean: Value::Bool(findable),
                integer: i,
                child_object: Some(ChildObject {
                    hello: "Query".into(),
                }),
                ..MyDocument::default()
            }
        })
        .collect()
}

/// Install a test-friendly tracing subscriber. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init();
}
