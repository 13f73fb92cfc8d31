//! The DocumentStore: process-wide owner of the backend and id generation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tome_core::DocumentId;
use tome_store::{Backend, MemoryBackend, SqliteBackend};
use tracing::info;

use crate::config::{BackendConfig, IdStrategy, StoreConfig};
use crate::error::{Error, Result};
use crate::hilo::HiLoGenerator;
use crate::session::Session;

/// The document store.
///
/// Created once and shared for the life of the process. It is `Send + Sync`;
/// wrap it in an `Arc` to share it across threads. Each logical operation
/// opens its own [`Session`].
pub struct DocumentStore {
    /// The storage backend.
    backend: Arc<dyn Backend>,
    /// Configuration.
    config: StoreConfig,
    /// Identifier ranges per collection.
    hilo: HiLoGenerator,
    /// Sequence number for session log events.
    sessions_opened: AtomicU64,
}

impl DocumentStore {
    /// Open the backend named by `config.backend`.
    ///
    /// Opening an already-initialized SQLite database again succeeds and
    /// keeps its data.
    pub fn initialize(config: StoreConfig) -> Result<Self> {
        let backend: Arc<dyn Backend> = match &config.backend {
            BackendConfig::Memory => Arc::new(MemoryBackend::new()),
            BackendConfig::SqliteMemory => {
                Arc::new(SqliteBackend::open_memory().map_err(Error::Initialization)?)
            }
            BackendConfig::Sqlite { path } => {
                Arc::new(SqliteBackend::open(path).map_err(Error::Initialization)?)
            }
        };
        info!(backend = ?config.backend, "document store initialized");
        Ok(Self::with_backend(backend, config))
    }

    /// Wrap an already-open backend. `config.backend` is ignored.
    pub fn with_backend(backend: Arc<dyn Backend>, config: StoreConfig) -> Self {
        Self {
            backend,
            hilo: HiLoGenerator::new(config.hilo_capacity),
            config,
            sessions_opened: AtomicU64::new(0),
        }
    }

    /// Start a new unit of work. Has no side effects.
    pub fn open_session(&self) -> Session<'_> {
        let number = self.sessions_opened.fetch_add(1, Ordering::Relaxed) + 1;
        Session::new(self, number)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Generate a fresh identifier for a document in `collection`.
    pub(crate) fn generate_id(&self, collection: &str) -> Result<DocumentId> {
        let separator = self.config.identity_parts_separator;
        let id = match self.config.id_strategy {
            IdStrategy::HiLo => {
                let n = self.hilo.next(self.backend.as_ref(), collection)?;
                DocumentId::for_collection(collection, separator, n)
            }
            IdStrategy::Uuid => {
                DocumentId::for_collection(collection, separator, uuid::Uuid::new_v4())
            }
        };
        Ok(id)
    }
}
