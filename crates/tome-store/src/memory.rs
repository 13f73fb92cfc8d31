//! In-memory implementation of the Backend trait.
//!
//! This is the ephemeral embedded backend. It has the same semantics as
//! SQLite but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tome_core::DocumentId;

use crate::error::{Result, StoreError};
use crate::traits::{check_etag, now_millis, Backend, StoredDocument, WriteBatch, WriteOp};

/// In-memory backend.
///
/// All data is lost when the backend is dropped. Thread-safe via RwLock.
pub struct MemoryBackend {
    inner: RwLock<MemoryInner>,
}

struct MemoryInner {
    /// Documents indexed by id.
    documents: BTreeMap<DocumentId, StoredDocument>,

    /// HiLo maximum per collection.
    hilo: HashMap<String, u64>,

    /// Last etag handed out.
    last_etag: u64,
}

impl MemoryInner {
    fn write_doc(&mut self, doc: &StoredDocument, now: i64) -> u64 {
        self.last_etag += 1;
        let mut stored = doc.clone();
        stored.etag = self.last_etag;
        stored.last_modified = now;
        self.documents.insert(stored.id.clone(), stored);
        self.last_etag
    }

    fn current_etag(&self, id: &DocumentId) -> u64 {
        self.documents.get(id).map(|d| d.etag).unwrap_or(0)
    }
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryInner {
                documents: BTreeMap::new(),
                hilo: HashMap::new(),
                last_etag: 0,
            }),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    fn put(&self, doc: &StoredDocument) -> Result<u64> {
        let mut inner = self.write()?;
        Ok(inner.write_doc(doc, now_millis()))
    }

    fn get(&self, id: &str) -> Result<Option<StoredDocument>> {
        let inner = self.read()?;
        Ok(inner.documents.get(id).cloned())
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut inner = self.write()?;
        Ok(inner.documents.remove(id).is_some())
    }

    fn scan(&self, collection: &str) -> Result<Vec<StoredDocument>> {
        let inner = self.read()?;
        Ok(inner
            .documents
            .values()
            .filter(|d| d.collection == collection)
            .cloned()
            .collect())
    }

    fn apply(&self, batch: &WriteBatch) -> Result<Vec<u64>> {
        let mut inner = self.write()?;

        // Validate every expectation before touching anything. Earlier ops
        // in the batch count as current state for later ones.
        let mut pending: HashMap<&DocumentId, u64> = HashMap::new();
        let mut next_etag = inner.last_etag;
        for op in batch.ops() {
            let actual = pending
                .get(op.id())
                .copied()
                .unwrap_or_else(|| inner.current_etag(op.id()));
            check_etag(op, actual)?;
            let after = match op {
                WriteOp::Put { .. } => {
                    next_etag += 1;
                    next_etag
                }
                WriteOp::Delete { .. } => 0,
            };
            pending.insert(op.id(), after);
        }

        let now = now_millis();
        let mut etags = Vec::with_capacity(batch.len());
        for op in batch.ops() {
            match op {
                WriteOp::Put { doc, .. } => etags.push(inner.write_doc(doc, now)),
                WriteOp::Delete { id, .. } => {
                    inner.documents.remove(id);
                    etags.push(0);
                }
            }
        }

        Ok(etags)
    }

    fn reserve_hilo(&self, collection: &str, capacity: u64) -> Result<u64> {
        let mut inner = self.write()?;
        let max = inner.hilo.entry(collection.to_string()).or_insert(0);
        *max += capacity;
        Ok(*max)
    }

    fn count(&self, collection: &str) -> Result<usize> {
        let inner = self.read()?;
        Ok(inner
            .documents
            .values()
            .filter(|d| d.collection == collection)
            .count())
    }

    fn collections(&self) -> Result<Vec<String>> {
        let inner = self.read()?;
        let mut names: Vec<String> = inner
            .documents
            .values()
            .map(|d| d.collection.clone())
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}
