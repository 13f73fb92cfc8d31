//! Configuration for a [`DocumentStore`](crate::DocumentStore).

use std::path::PathBuf;

/// Which backend the store opens on initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// Ephemeral in-process storage.
    Memory,
    /// SQLite without a file; ephemeral but exercises the SQL backend.
    SqliteMemory,
    /// SQLite database file, created on first open.
    Sqlite { path: PathBuf },
}

/// How identifiers are generated for documents stored without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStrategy {
    /// `<collection>/<n>` with `n` from per-collection HiLo ranges.
    HiLo,
    /// `<collection>/<uuid v4>`.
    Uuid,
}

/// Configuration for the document store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: BackendConfig,
    pub id_strategy: IdStrategy,
    /// Number of identifiers reserved per HiLo round trip.
    pub hilo_capacity: u64,
    /// Separator between collection prefix and suffix in generated ids.
    pub identity_parts_separator: char,
    /// Backend round trips a single session may make.
    pub max_requests_per_session: u32,
    /// Check etags on commit so concurrent writers cannot overwrite each other.
    pub optimistic_concurrency: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::Memory,
            id_strategy: IdStrategy::HiLo,
            hilo_capacity: 32,
            identity_parts_separator: '/',
            max_requests_per_session: 30,
            optimistic_concurrency: false,
        }
    }
}

impl StoreConfig {
    /// Default configuration over an ephemeral in-memory backend.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Default configuration over a SQLite file.
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendConfig::Sqlite { path: path.into() },
            ..Self::default()
        }
    }

    /// Default configuration over a SQLite database held in memory.
    pub fn sqlite_memory() -> Self {
        Self {
            backend: BackendConfig::SqliteMemory,
            ..Self::default()
        }
    }

    pub fn with_id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }

    pub fn with_hilo_capacity(mut self, capacity: u64) -> Self {
        self.hilo_capacity = capacity.max(1);
        self
    }

    pub fn with_separator(mut self, separator: char) -> Self {
        self.identity_parts_separator = separator;
        self
    }

    pub fn with_max_requests(mut self, max: u32) -> Self {
        self.max_requests_per_session = max;
        self
    }

    pub fn with_optimistic_concurrency(mut self, enabled: bool) -> Self {
        self.optimistic_concurrency = enabled;
        self
    }
}
