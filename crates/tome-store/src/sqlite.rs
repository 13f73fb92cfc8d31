//! SQLite implementation of the Backend trait.
//!
//! This is the persistent backend for Tome. It uses rusqlite with bundled
//! SQLite behind a mutex. Batches run inside a single SQLite transaction, so
//! a failed batch rolls back completely.
//!
//! Write transactions begin IMMEDIATE and take the write lock up front. A
//! second connection to the same file waits out the busy timeout.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};

use tome_core::DocumentId;

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{check_etag, now_millis, Backend, StoredDocument, WriteBatch, WriteOp};

/// How long a writer waits on a database locked by another process.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based backend.
///
/// Thread-safe via internal Mutex.
pub struct SqliteBackend {
    /// The SQLite connection, protected by a mutex.
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist. Opening an
    /// existing database keeps its data.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        migration::migrate(&mut conn)?;
        info!(path = %path.display(), "opened sqlite backend");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::LockPoisoned(format!("sqlite connection: {}", e)))
    }

    /// Execute a blocking operation on the connection.
    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Execute a blocking operation that needs mutable access.
    fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.lock()?;
        f(&mut conn)
    }
}

const SELECT_DOCUMENT: &str =
    "SELECT id, collection, type_tag, body, etag, last_modified FROM documents";

/// A `documents` row as SQLite returns it, before id validation.
struct DocumentRow {
    id: String,
    collection: String,
    type_tag: String,
    body: Vec<u8>,
    etag: i64,
    last_modified: i64,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        id: row.get("id")?,
        collection: row.get("collection")?,
        type_tag: row.get("type_tag")?,
        body: row.get("body")?,
        etag: row.get("etag")?,
        last_modified: row.get("last_modified")?,
    })
}

impl DocumentRow {
    fn into_document(self) -> Result<StoredDocument> {
        let id = DocumentId::new(self.id.as_str())
            .map_err(|e| StoreError::InvalidData(format!("stored id {:?}: {}", self.id, e)))?;
        Ok(StoredDocument {
            id,
            collection: self.collection,
            type_tag: self.type_tag,
            body: self.body,
            etag: self.etag as u64,
            last_modified: self.last_modified,
        })
    }
}

/// Bump and return the store-wide etag counter.
fn next_etag(conn: &Connection) -> Result<u64> {
    conn.execute(
        "UPDATE store_meta SET value = value + 1 WHERE key = 'last_etag'",
        [],
    )?;
    let etag: i64 = conn.query_row(
        "SELECT value FROM store_meta WHERE key = 'last_etag'",
        [],
        |row| row.get(0),
    )?;
    Ok(etag as u64)
}

fn current_etag(conn: &Connection, id: &str) -> Result<u64> {
    let etag: Option<i64> = conn
        .query_row(
            "SELECT etag FROM documents WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(etag.map(|e| e as u64).unwrap_or(0))
}

fn write_document(conn: &Connection, doc: &StoredDocument, now: i64) -> Result<u64> {
    let etag = next_etag(conn)?;
    conn.execute(
        "INSERT INTO documents (id, collection, type_tag, body, etag, last_modified)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
            collection = excluded.collection,
            type_tag = excluded.type_tag,
            body = excluded.body,
            etag = excluded.etag,
            last_modified = excluded.last_modified",
        params![
            doc.id.as_str(),
            doc.collection,
            doc.type_tag,
            doc.body,
            etag as i64,
            now,
        ],
    )?;
    Ok(etag)
}

fn delete_document(conn: &Connection, id: &str) -> Result<bool> {
    let removed = conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
    Ok(removed > 0)
}

impl Backend for SqliteBackend {
    fn put(&self, doc: &StoredDocument) -> Result<u64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let etag = write_document(&tx, doc, now_millis())?;
            tx.commit()?;
            Ok(etag)
        })
    }

    fn get(&self, id: &str) -> Result<Option<StoredDocument>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("{} WHERE id = ?1", SELECT_DOCUMENT),
                    params![id],
                    read_row,
                )
                .optional()?;
            row.map(DocumentRow::into_document).transpose()
        })
    }

    fn delete(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| delete_document(conn, id))
    }

    fn scan(&self, collection: &str) -> Result<Vec<StoredDocument>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE collection = ?1 ORDER BY id",
                SELECT_DOCUMENT
            ))?;
            let rows = stmt
                .query_map(params![collection], read_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(DocumentRow::into_document).collect()
        })
    }

    fn apply(&self, batch: &WriteBatch) -> Result<Vec<u64>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let now = now_millis();
            let mut etags = Vec::with_capacity(batch.len());

            // Any early return drops `tx`, which rolls the batch back.
            for op in batch.ops() {
                if op.expected_etag().is_some() {
                    check_etag(op, current_etag(&tx, op.id().as_str())?)?;
                }
                match op {
                    WriteOp::Put { doc, .. } => etags.push(write_document(&tx, doc, now)?),
                    WriteOp::Delete { id, .. } => {
                        delete_document(&tx, id.as_str())?;
                        etags.push(0);
                    }
                }
            }

            tx.commit()?;
            debug!(ops = batch.len(), "applied batch");
            Ok(etags)
        })
    }

    fn reserve_hilo(&self, collection: &str, capacity: u64) -> Result<u64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                "INSERT INTO hilo (collection, max_id) VALUES (?1, ?2)
                 ON CONFLICT(collection) DO UPDATE SET max_id = max_id + excluded.max_id",
                params![collection, capacity as i64],
            )?;
            let max: i64 = tx.query_row(
                "SELECT max_id FROM hilo WHERE collection = ?1",
                params![collection],
                |row| row.get(0),
            )?;
            tx.commit()?;
            Ok(max as u64)
        })
    }

    fn count(&self, collection: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                params![collection],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    fn collections(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT DISTINCT collection FROM documents ORDER BY collection")?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(names)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_doc(id: &str, collection: &str, body: &[u8]) -> StoredDocument {
        StoredDocument::new(DocumentId::new(id).unwrap(), collection, "test::Doc", body.to_vec())
    }

    #[test]
    fn test_put_and_get_document() {
        let backend = SqliteBackend::open_memory().unwrap();

        let etag = backend.put(&make_doc("docs/1", "Docs", b"one")).unwrap();
        assert_eq!(etag, 1);

        let retrieved = backend.get("docs/1").unwrap().unwrap();
        assert_eq!(retrieved.id.as_str(), "docs/1");
        assert_eq!(retrieved.collection, "Docs");
        assert_eq!(retrieved.type_tag, "test::Doc");
        assert_eq!(retrieved.body, b"one");
        assert_eq!(retrieved.etag, 1);

        assert!(backend.get("docs/2").unwrap().is_none());
    }

    #[test]
    fn test_upsert_overwrites() {
        let backend = SqliteBackend::open_memory().unwrap();
        backend.put(&make_doc("docs/1", "Docs", b"one")).unwrap();
        let etag = backend.put(&make_doc("docs/1", "Docs", b"uno")).unwrap();

        assert_eq!(etag, 2);
        assert_eq!(backend.get("docs/1").unwrap().unwrap().body, b"uno");
        assert_eq!(backend.count("Docs").unwrap(), 1);
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let backend = SqliteBackend::open_memory().unwrap();
        assert!(!backend.delete("docs/404").unwrap());

        backend.put(&make_doc("docs/1", "Docs", b"one")).unwrap();
        assert!(backend.delete("docs/1").unwrap());
        assert!(backend.get("docs/1").unwrap().is_none());
    }

    #[test]
    fn test_scan_by_collection() {
        let backend = SqliteBackend::open_memory().unwrap();
        backend.put(&make_doc("docs/2", "Docs", b"b")).unwrap();
        backend.put(&make_doc("docs/1", "Docs", b"a")).unwrap();
        backend.put(&make_doc("people/1", "People", b"p")).unwrap();

        let docs = backend.scan("Docs").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id.as_str(), "docs/1");
        assert_eq!(docs[1].id.as_str(), "docs/2");
        assert_eq!(backend.collections().unwrap(), vec!["Docs", "People"]);
    }

    #[test]
    fn test_batch_rolls_back_on_conflict() {
        let backend = SqliteBackend::open_memory().unwrap();
        backend.put(&make_doc("docs/1", "Docs", b"one")).unwrap();

        let mut batch = WriteBatch::new();
        batch.put(make_doc("docs/2", "Docs", b"two"), Some(0));
        batch.delete(DocumentId::new("docs/1").unwrap(), Some(7));

        let err = backend.apply(&batch).unwrap_err();
        assert!(matches!(
            err,
            StoreError::ConcurrencyConflict { expected: 7, actual: 1, .. }
        ));
        assert!(backend.get("docs/2").unwrap().is_none());
        assert!(backend.get("docs/1").unwrap().is_some());

        // The etag counter rolled back with the batch.
        assert_eq!(backend.put(&make_doc("docs/3", "Docs", b"three")).unwrap(), 2);
    }

    #[test]
    fn test_batch_applies_everything() {
        let backend = SqliteBackend::open_memory().unwrap();
        backend.put(&make_doc("docs/1", "Docs", b"one")).unwrap();

        let mut batch = WriteBatch::new();
        batch.put(make_doc("docs/2", "Docs", b"two"), None);
        batch.put(make_doc("docs/3", "Docs", b"three"), None);
        batch.delete(DocumentId::new("docs/1").unwrap(), None);

        let etags = backend.apply(&batch).unwrap();
        assert_eq!(etags, vec![2, 3, 0]);
        assert_eq!(backend.count("Docs").unwrap(), 2);
    }

    #[test]
    fn test_hilo_reservation() {
        let backend = SqliteBackend::open_memory().unwrap();
        assert_eq!(backend.reserve_hilo("Docs", 32).unwrap(), 32);
        assert_eq!(backend.reserve_hilo("Docs", 32).unwrap(), 64);
        assert_eq!(backend.reserve_hilo("People", 4).unwrap(), 4);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tome.db");

        {
            let backend = SqliteBackend::open(&path).unwrap();
            backend.put(&make_doc("docs/1", "Docs", b"persisted")).unwrap();
            backend.reserve_hilo("Docs", 32).unwrap();
        }

        let backend = SqliteBackend::open(&path).unwrap();
        assert_eq!(backend.get("docs/1").unwrap().unwrap().body, b"persisted");
        assert_eq!(backend.reserve_hilo("Docs", 32).unwrap(), 64);
        assert_eq!(backend.put(&make_doc("docs/2", "Docs", b"next")).unwrap(), 2);
    }

    #[test]
    fn test_invalid_stored_id_is_invalid_data() {
        let backend = SqliteBackend::open_memory().unwrap();
        backend
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO documents (id, collection, type_tag, body, etag, last_modified)
                     VALUES ('  ', 'Docs', 'test::Doc', x'a0', 1, 0)",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        assert!(matches!(backend.get("  "), Err(StoreError::InvalidData(_))));
        assert!(matches!(backend.scan("Docs"), Err(StoreError::InvalidData(_))));
    }

    #[test]
    fn test_checked_batches_from_two_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tome.db");
        SqliteBackend::open(&path).unwrap();

        std::thread::scope(|scope| {
            for writer in 0..2 {
                let path = &path;
                scope.spawn(move || {
                    let backend = SqliteBackend::open(path).unwrap();
                    let id = DocumentId::new(format!("docs/{}", writer)).unwrap();
                    let mut etag = 0;
                    for round in 0..50 {
                        let body = format!("{}-{}", writer, round).into_bytes();
                        let mut batch = WriteBatch::new();
                        batch.put(
                            StoredDocument::new(id.clone(), "Docs", "test::Doc", body),
                            Some(etag),
                        );
                        etag = backend.apply(&batch).unwrap()[0];
                    }
                });
            }
        });

        let backend = SqliteBackend::open(&path).unwrap();
        assert_eq!(backend.count("Docs").unwrap(), 2);
        assert_eq!(backend.get("docs/1").unwrap().unwrap().body, b"1-49");
    }
}
