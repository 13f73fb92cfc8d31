//! Session: the unit of work.
//!
//! A session buffers stores, loads, and deletes against an identity map and
//! applies them to the backend atomically in [`Session::save_changes`].
//! Dropping a session discards whatever was not committed.

use std::collections::BTreeMap;

use tome_core::{canonical_bytes, decode_document, from_bytes, to_bytes, Document, DocumentId};
use tome_store::{StoreError, StoredDocument, WriteBatch};
use tracing::{debug, trace, warn};

use crate::entity::{Entity, TrackedEntity};
use crate::error::{Error, Result};
use crate::query::Query;
use crate::document_store::DocumentStore;

/// Identity-map entry.
struct Tracked {
    entity: Box<dyn TrackedEntity>,
    /// Canonical bytes as of the last load, store, or commit.
    snapshot: Vec<u8>,
    /// Etag the session last saw. `Some(0)` means "must not exist yet",
    /// `None` that the etag is unknown and no check is made.
    etag: Option<u64>,
    /// Whether the backend holds `snapshot`. New entities always get written.
    persisted: bool,
}

impl Tracked {
    /// Re-encode the entity and return the bytes if they need writing.
    fn pending_write(&self) -> Result<Option<Vec<u8>>> {
        let bytes = to_bytes(&self.entity.encode()?)?;
        if !self.persisted || bytes != self.snapshot {
            Ok(Some(bytes))
        } else {
            Ok(None)
        }
    }
}

/// A unit of work against a [`DocumentStore`].
///
/// Sessions are single-threaded and not `Send`. Open one per logical
/// operation with [`DocumentStore::open_session`].
pub struct Session<'a> {
    store: &'a DocumentStore,
    number: u64,
    /// Identity map, ordered so commits write in a stable order.
    entities: BTreeMap<DocumentId, Tracked>,
    /// Ids to delete on commit, with the etag to check if known.
    deletions: BTreeMap<DocumentId, Option<u64>>,
    requests: u32,
}

impl<'a> Session<'a> {
    pub(crate) fn new(store: &'a DocumentStore, number: u64) -> Self {
        trace!(session = number, "session opened");
        Self {
            store,
            number,
            entities: BTreeMap::new(),
            deletions: BTreeMap::new(),
            requests: 0,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Unit of Work
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a new document.
    ///
    /// Assigns an identifier if the document has none, so the id is known
    /// before commit. The document is encoded right away; unencodable
    /// documents fail here, never later.
    pub fn store<T: Document>(&mut self, mut doc: T) -> Result<Entity<T>> {
        if !doc.has_id() {
            let id = self.store.generate_id(T::COLLECTION)?;
            doc.set_id(id.into_string());
        }
        let id = DocumentId::new(doc.id())?;
        let snapshot = canonical_bytes(&doc)?;

        if self.entities.contains_key(&id) {
            return Err(Error::NonUniqueObject(id.into_string()));
        }

        // Storing over a pending deletion turns the delete into an overwrite.
        let etag = match self.deletions.remove(&id) {
            Some(known) => known,
            None => Some(0),
        };

        let entity = Entity::new(doc);
        trace!(session = self.number, id = %id, "stored");
        self.entities.insert(
            id,
            Tracked {
                entity: Box::new(entity.clone()),
                snapshot,
                etag,
                persisted: false,
            },
        );
        Ok(entity)
    }

    /// Load a document by id.
    ///
    /// Returns the tracked instance if this session already has it, and
    /// `None` if the id does not exist or was deleted in this session.
    pub fn load<T: Document>(&mut self, id: &str) -> Result<Option<Entity<T>>> {
        if let Some(tracked) = self.entities.get(id) {
            return downcast(id, tracked).map(Some);
        }
        if self.deletions.contains_key(id) {
            return Ok(None);
        }

        self.count_request()?;
        let stored = match self.store.backend().get(id)? {
            Some(stored) => stored,
            None => return Ok(None),
        };
        if stored.collection != T::COLLECTION {
            return Err(Error::CollectionMismatch {
                id: id.to_string(),
                expected: T::COLLECTION,
                actual: stored.collection,
            });
        }

        let doc: T = decode_document(&from_bytes(&stored.body)?)?;
        self.track(stored.id, doc, stored.etag).map(Some)
    }

    /// Load several documents, in order. Missing ids yield `None`.
    pub fn load_many<T: Document>(&mut self, ids: &[&str]) -> Result<Vec<Option<Entity<T>>>> {
        ids.iter().map(|id| self.load(id)).collect()
    }

    /// Mark a tracked entity for deletion on the next commit.
    pub fn delete<T: Document>(&mut self, entity: &Entity<T>) -> Result<()> {
        let id = entity.id();
        let tracked_here = self
            .entities
            .get(id.as_str())
            .and_then(|t| t.entity.as_any().downcast_ref::<Entity<T>>())
            .is_some_and(|e| e.ptr_eq(entity));
        if !tracked_here {
            return Err(Error::InvalidOperation(format!(
                "cannot delete {}: entity is not tracked by this session",
                id
            )));
        }

        self.untrack_for_deletion(&id);
        Ok(())
    }

    /// Mark an id for deletion without loading it.
    pub fn delete_by_id<T: Document>(&mut self, id: &str) -> Result<()> {
        if let Some(tracked) = self.entities.get(id) {
            if tracked.entity.collection() != T::COLLECTION {
                return Err(Error::CollectionMismatch {
                    id: id.to_string(),
                    expected: T::COLLECTION,
                    actual: tracked.entity.collection().to_string(),
                });
            }
            self.untrack_for_deletion(id);
        } else {
            self.deletions.entry(DocumentId::new(id)?).or_insert(None);
        }
        Ok(())
    }

    /// Start a query over the documents of `T`'s collection.
    pub fn query<T: Document>(&mut self) -> Query<'_, 'a, T> {
        Query::new(self)
    }

    /// Apply every buffered change atomically.
    ///
    /// New and modified entities are written, pending deletions removed. On
    /// failure nothing is written and the session keeps its pending state.
    pub fn save_changes(&mut self) -> Result<()> {
        let optimistic = self.store.config().optimistic_concurrency;
        let guard = |etag: Option<u64>| if optimistic { etag } else { None };

        let mut batch = WriteBatch::new();
        let mut written = Vec::new();
        for (id, tracked) in &self.entities {
            let current = tracked.entity.current_id()?;
            if current != id.as_str() {
                return Err(Error::InvalidOperation(format!(
                    "identifier of {} changed to {:?}; identifiers are immutable",
                    id, current
                )));
            }
            if let Some(bytes) = tracked.pending_write()? {
                let doc = StoredDocument::new(
                    id.clone(),
                    tracked.entity.collection(),
                    tracked.entity.type_tag(),
                    bytes.clone(),
                );
                batch.put(doc, guard(tracked.etag));
                written.push((id.clone(), bytes));
            }
        }
        for (id, etag) in &self.deletions {
            batch.delete(id.clone(), guard(*etag));
        }

        if batch.is_empty() {
            trace!(session = self.number, "nothing to commit");
            return Ok(());
        }

        self.count_request()?;
        let etags = match self.store.backend().apply(&batch) {
            Ok(etags) => etags,
            Err(StoreError::ConcurrencyConflict {
                id,
                expected,
                actual,
            }) => {
                warn!(session = self.number, %id, expected, actual, "commit rejected by concurrency check");
                return Err(Error::ConcurrencyConflict {
                    id,
                    expected,
                    actual,
                });
            }
            Err(e) => {
                warn!(session = self.number, error = %e, "commit failed");
                return Err(Error::Commit(e));
            }
        };

        // Puts come first in the batch, in `written` order.
        for ((id, bytes), etag) in written.into_iter().zip(etags) {
            if let Some(tracked) = self.entities.get_mut(&id) {
                tracked.snapshot = bytes;
                tracked.etag = Some(etag);
                tracked.persisted = true;
            }
        }
        self.deletions.clear();

        debug!(
            session = self.number,
            puts = batch.puts(),
            deletes = batch.deletes(),
            "committed session"
        );
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tracking
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether a commit now would write anything.
    pub fn has_changes(&self) -> Result<bool> {
        if !self.deletions.is_empty() {
            return Ok(true);
        }
        for tracked in self.entities.values() {
            if tracked.pending_write()?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether the identity map holds `id`.
    pub fn is_loaded(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    /// Stop tracking an entity without deleting it. Its changes are dropped.
    pub fn evict<T: Document>(&mut self, entity: &Entity<T>) {
        let id = entity.id();
        let same = self
            .entities
            .get(id.as_str())
            .and_then(|t| t.entity.as_any().downcast_ref::<Entity<T>>())
            .is_some_and(|e| e.ptr_eq(entity));
        if same {
            self.entities.remove(id.as_str());
        }
    }

    /// Forget every tracked entity and pending deletion.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.deletions.clear();
    }

    /// Backend round trips made so far.
    pub fn number_of_requests(&self) -> u32 {
        self.requests
    }

    /// The store this session was opened on.
    pub fn document_store(&self) -> &'a DocumentStore {
        self.store
    }

    pub(crate) fn count_request(&mut self) -> Result<()> {
        let max = self.store.config().max_requests_per_session;
        if self.requests >= max {
            return Err(Error::TooManyRequests(max));
        }
        self.requests += 1;
        Ok(())
    }

    pub(crate) fn is_deleted(&self, id: &str) -> bool {
        self.deletions.contains_key(id)
    }

    /// The tracked instance for `id`, if any, as a `T`.
    pub(crate) fn tracked<T: Document>(&self, id: &str) -> Option<Result<Entity<T>>> {
        self.entities.get(id).map(|tracked| downcast(id, tracked))
    }

    /// Register a freshly loaded document in the identity map.
    pub(crate) fn track<T: Document>(
        &mut self,
        id: DocumentId,
        doc: T,
        etag: u64,
    ) -> Result<Entity<T>> {
        let snapshot = canonical_bytes(&doc)?;
        let entity = Entity::new(doc);
        self.entities.insert(
            id,
            Tracked {
                entity: Box::new(entity.clone()),
                snapshot,
                etag: Some(etag),
                persisted: true,
            },
        );
        Ok(entity)
    }

    /// Tracked entities a commit would write. One that cannot be encoded
    /// right now counts as unsaved.
    fn unsaved(&self) -> usize {
        self.entities
            .values()
            .filter(|t| !matches!(t.pending_write(), Ok(None)))
            .count()
    }

    fn untrack_for_deletion(&mut self, id: &str) {
        if let Some((key, tracked)) = self.entities.remove_entry(id) {
            // A never-committed new entity has nothing to delete.
            if tracked.persisted || tracked.etag != Some(0) {
                self.deletions.insert(key, tracked.etag);
            }
        }
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        let unsaved = self.unsaved();
        if unsaved > 0 || !self.deletions.is_empty() {
            debug!(
                session = self.number,
                unsaved,
                deletions = self.deletions.len(),
                "session dropped with uncommitted changes"
            );
        }
    }
}

fn downcast<T: Document>(id: &str, tracked: &Tracked) -> Result<Entity<T>> {
    tracked
        .entity
        .as_any()
        .downcast_ref::<Entity<T>>()
        .cloned()
        .ok_or_else(|| Error::TypeMismatch {
            id: id.to_string(),
            expected: T::type_tag(),
            actual: tracked.entity.type_tag(),
        })
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::StoreConfig;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Task {
        id: String,
        title: String,
        done: bool,
    }

    impl Document for Task {
        const COLLECTION: &'static str = "Tasks";

        fn id(&self) -> &str {
            &self.id
        }

        fn set_id(&mut self, id: String) {
            self.id = id;
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Label {
        id: String,
        name: String,
    }

    impl Document for Label {
        const COLLECTION: &'static str = "Labels";

        fn id(&self) -> &str {
            &self.id
        }

        fn set_id(&mut self, id: String) {
            self.id = id;
        }
    }

    fn task(title: &str) -> Task {
        Task {
            id: String::new(),
            title: title.into(),
            done: false,
        }
    }

    fn store() -> DocumentStore {
        DocumentStore::initialize(StoreConfig::memory()).unwrap()
    }

    #[test]
    fn test_store_assigns_id_before_commit() {
        let store = store();
        let mut session = store.open_session();

        let entity = session.store(task("write docs")).unwrap();
        assert_eq!(entity.id(), "tasks/1");
        assert!(session.is_loaded("tasks/1"));
        assert!(store.backend().get("tasks/1").unwrap().is_none());
    }

    #[test]
    fn test_explicit_id_is_kept() {
        let store = store();
        let mut session = store.open_session();

        let mut t = task("custom");
        t.id = "tasks/custom".into();
        let entity = session.store(t).unwrap();
        assert_eq!(entity.id(), "tasks/custom");
    }

    #[test]
    fn test_store_same_id_twice_is_rejected() {
        let store = store();
        let mut session = store.open_session();

        let mut a = task("a");
        a.id = "tasks/7".into();
        session.store(a.clone()).unwrap();
        let err = session.store(a).unwrap_err();
        assert!(matches!(err, Error::NonUniqueObject(id) if id == "tasks/7"));
    }

    #[test]
    fn test_load_returns_same_instance() {
        let store = store();
        {
            let mut session = store.open_session();
            session.store(task("a")).unwrap();
            session.save_changes().unwrap();
        }

        let mut session = store.open_session();
        let first = session.load::<Task>("tasks/1").unwrap().unwrap();
        let second = session.load::<Task>("tasks/1").unwrap().unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(session.number_of_requests(), 1);
    }

    #[test]
    fn test_load_missing_is_none() {
        let store = store();
        let mut session = store.open_session();
        assert!(session.load::<Task>("tasks/404").unwrap().is_none());
    }

    #[test]
    fn test_load_wrong_collection() {
        let store = store();
        {
            let mut session = store.open_session();
            session.store(task("a")).unwrap();
            session.save_changes().unwrap();
        }

        let mut session = store.open_session();
        let err = session.load::<Label>("tasks/1").unwrap_err();
        assert!(matches!(err, Error::CollectionMismatch { expected: "Labels", .. }));
    }

    #[test]
    fn test_tracked_under_other_type() {
        let store = store();
        let mut session = store.open_session();

        let mut t = task("a");
        t.id = "shared/1".into();
        session.store(t).unwrap();
        let err = session.load::<Label>("shared/1").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_dirty_tracking() {
        let store = store();
        {
            let mut session = store.open_session();
            session.store(task("a")).unwrap();
            assert!(session.has_changes().unwrap());
            session.save_changes().unwrap();
            assert!(!session.has_changes().unwrap());
        }

        let mut session = store.open_session();
        let entity = session.load::<Task>("tasks/1").unwrap().unwrap();
        assert!(!session.has_changes().unwrap());

        entity.borrow_mut().done = true;
        assert!(session.has_changes().unwrap());
        session.save_changes().unwrap();
        assert!(!session.has_changes().unwrap());
    }

    #[test]
    fn test_unchanged_commit_makes_no_request() {
        let store = store();
        let mut session = store.open_session();
        session.save_changes().unwrap();
        assert_eq!(session.number_of_requests(), 0);
    }

    #[test]
    fn test_delete_requires_tracked_instance() {
        let store = store();
        let mut session = store.open_session();
        let entity = session.store(task("a")).unwrap();

        let mut other = store.open_session();
        let err = other.delete(&entity).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));

        session.delete(&entity).unwrap();
        assert!(!session.is_loaded("tasks/1"));
    }

    #[test]
    fn test_deleting_new_entity_writes_nothing() {
        let store = store();
        let mut session = store.open_session();
        let entity = session.store(task("a")).unwrap();
        session.delete(&entity).unwrap();

        assert!(!session.has_changes().unwrap());
        session.save_changes().unwrap();
        assert_eq!(session.number_of_requests(), 0);
    }

    #[test]
    fn test_store_over_pending_delete_overwrites() {
        let store = store();
        {
            let mut session = store.open_session();
            session.store(task("old")).unwrap();
            session.save_changes().unwrap();
        }

        let mut session = store.open_session();
        session.delete_by_id::<Task>("tasks/1").unwrap();
        assert!(session.load::<Task>("tasks/1").unwrap().is_none());

        let mut replacement = task("new");
        replacement.id = "tasks/1".into();
        session.store(replacement).unwrap();
        session.save_changes().unwrap();

        let mut check = store.open_session();
        let loaded = check.load::<Task>("tasks/1").unwrap().unwrap();
        assert_eq!(loaded.borrow().title, "new");
    }

    #[test]
    fn test_changed_identifier_is_rejected() {
        let store = store();
        let mut session = store.open_session();
        let entity = session.store(task("a")).unwrap();

        entity.borrow_mut().id = "tasks/other".into();
        let err = session.save_changes().unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[test]
    fn test_evict_drops_changes() {
        let store = store();
        {
            let mut session = store.open_session();
            session.store(task("a")).unwrap();
            session.save_changes().unwrap();
        }

        let mut session = store.open_session();
        let entity = session.load::<Task>("tasks/1").unwrap().unwrap();
        entity.borrow_mut().title = "changed".into();
        session.evict(&entity);
        assert!(!session.is_loaded("tasks/1"));
        assert!(!session.has_changes().unwrap());

        let reloaded = session.load::<Task>("tasks/1").unwrap().unwrap();
        assert!(!reloaded.ptr_eq(&entity));
        assert_eq!(reloaded.borrow().title, "a");
    }

    #[test]
    fn test_request_budget() {
        let store = DocumentStore::initialize(StoreConfig::memory().with_max_requests(2)).unwrap();
        let mut session = store.open_session();

        session.load::<Task>("tasks/1").unwrap();
        session.load::<Task>("tasks/2").unwrap();
        let err = session.load::<Task>("tasks/3").unwrap_err();
        assert!(matches!(err, Error::TooManyRequests(2)));
    }

    #[test]
    fn test_clear_forgets_everything() {
        let store = store();
        let mut session = store.open_session();
        session.store(task("a")).unwrap();
        session.delete_by_id::<Task>("tasks/9").unwrap();

        session.clear();
        assert!(!session.has_changes().unwrap());
        assert!(!session.is_loaded("tasks/1"));
    }

    #[test]
    fn test_held_borrow_is_an_error_not_a_panic() {
        let store = store();
        let mut session = store.open_session();
        let entity = session.store(task("a")).unwrap();

        {
            let _guard = entity.borrow_mut();
            assert!(matches!(session.has_changes(), Err(Error::InvalidOperation(_))));
            assert!(matches!(session.save_changes(), Err(Error::InvalidOperation(_))));
        }

        session.save_changes().unwrap();
        assert!(store.backend().get("tasks/1").unwrap().is_some());
    }

    #[test]
    fn test_unsaved_counts_modified_loaded_entities() {
        let store = store();
        {
            let mut session = store.open_session();
            session.store(task("a")).unwrap();
            session.store(task("b")).unwrap();
            assert_eq!(session.unsaved(), 2);
            session.save_changes().unwrap();
            assert_eq!(session.unsaved(), 0);
        }

        let mut session = store.open_session();
        let a = session.load::<Task>("tasks/1").unwrap().unwrap();
        session.load::<Task>("tasks/2").unwrap().unwrap();
        assert_eq!(session.unsaved(), 0);

        a.borrow_mut().done = true;
        assert_eq!(session.unsaved(), 1);

        let _guard = a.borrow_mut();
        assert_eq!(session.unsaved(), 1);
    }
}
