//! Backend trait: the abstract interface for document persistence.
//!
//! This trait keeps the session layer storage-agnostic. Implementations
//! include SQLite (persistent) and in-memory (ephemeral, for tests).

use tome_core::DocumentId;

use crate::error::{Result, StoreError};

/// A persisted document record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub id: DocumentId,
    /// Collection the document belongs to; scans are partitioned by it.
    pub collection: String,
    /// Type discriminator for polymorphic collections.
    pub type_tag: String,
    /// Canonical CBOR body.
    pub body: Vec<u8>,
    /// Version assigned by the backend on every write. Starts at 1.
    pub etag: u64,
    /// Unix milliseconds of the last write.
    pub last_modified: i64,
}

impl StoredDocument {
    /// Create a record to be written. Etag and timestamp are set by the backend.
    pub fn new(
        id: DocumentId,
        collection: impl Into<String>,
        type_tag: impl Into<String>,
        body: Vec<u8>,
    ) -> Self {
        Self {
            id,
            collection: collection.into(),
            type_tag: type_tag.into(),
            body,
            etag: 0,
            last_modified: 0,
        }
    }
}

/// One operation in a [`WriteBatch`].
///
/// `expected_etag` enables optimistic concurrency: `Some(0)` means the
/// document must not exist, `Some(n)` means its current etag must be `n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put {
        doc: StoredDocument,
        expected_etag: Option<u64>,
    },
    Delete {
        id: DocumentId,
        expected_etag: Option<u64>,
    },
}

impl WriteOp {
    pub fn id(&self) -> &DocumentId {
        match self {
            WriteOp::Put { doc, .. } => &doc.id,
            WriteOp::Delete { id, .. } => id,
        }
    }

    pub fn expected_etag(&self) -> Option<u64> {
        match self {
            WriteOp::Put { expected_etag, .. } | WriteOp::Delete { expected_etag, .. } => {
                *expected_etag
            }
        }
    }
}

/// A set of writes applied all-or-nothing by [`Backend::apply`].
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, doc: StoredDocument, expected_etag: Option<u64>) {
        self.ops.push(WriteOp::Put { doc, expected_etag });
    }

    pub fn delete(&mut self, id: DocumentId, expected_etag: Option<u64>) {
        self.ops.push(WriteOp::Delete { id, expected_etag });
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn puts(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, WriteOp::Put { .. }))
            .count()
    }

    pub fn deletes(&self) -> usize {
        self.len() - self.puts()
    }
}

/// The Backend trait: blocking interface for document persistence.
///
/// Every method returns once durable state is updated. Implementations
/// serialize conflicting writes internally; without expected etags the
/// last write wins.
pub trait Backend: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Document Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or overwrite a document. Returns its new etag.
    fn put(&self, doc: &StoredDocument) -> Result<u64>;

    /// Get a document by id. A missing id is `Ok(None)`.
    fn get(&self, id: &str) -> Result<Option<StoredDocument>>;

    /// Remove a document if present. Returns whether anything was removed.
    fn delete(&self, id: &str) -> Result<bool>;

    /// Snapshot of one collection's documents, ordered by id.
    fn scan(&self, collection: &str) -> Result<Vec<StoredDocument>>;

    /// Apply a batch atomically.
    ///
    /// Returns the new etag of each operation in order (0 for deletes).
    /// If any expected etag mismatches, returns
    /// [`StoreError::ConcurrencyConflict`] and writes nothing.
    fn apply(&self, batch: &WriteBatch) -> Result<Vec<u64>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Identifier Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Raise the collection's persisted HiLo maximum by `capacity`.
    ///
    /// Returns the new maximum; the caller owns `(max - capacity, max]`.
    fn reserve_hilo(&self, collection: &str, capacity: u64) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Introspection
    // ─────────────────────────────────────────────────────────────────────────

    /// Number of documents in a collection.
    fn count(&self, collection: &str) -> Result<usize>;

    /// Names of all collections holding at least one document, sorted.
    fn collections(&self) -> Result<Vec<String>>;
}

/// Check an expected etag against the current one (`0` if absent).
pub(crate) fn check_etag(op: &WriteOp, actual: u64) -> Result<()> {
    match op.expected_etag() {
        Some(expected) if expected != actual => Err(StoreError::ConcurrencyConflict {
            id: op.id().to_string(),
            expected,
            actual,
        }),
        _ => Ok(()),
    }
}

/// Get current time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
