//! Session queries.
//!
//! A [`Query`] scans one collection, keeps the documents matching every
//! predicate and filter, and returns them through the session's identity
//! map. Results reflect committed state; documents stored in the session
//! but not yet saved are not visible to queries.

use tome_core::{
    decode_document, from_bytes, CompareOp, CoreError, Document, DocumentId, FieldPath, Predicate,
    Value,
};
use tracing::trace;

use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::session::Session;

type Filter<'s, T> = Box<dyn Fn(&T) -> bool + 's>;

/// A query under construction. Nothing touches the backend until a
/// terminal method (`to_list`, `first`, `count`, `any`) runs.
pub struct Query<'s, 'a, T: Document> {
    session: &'s mut Session<'a>,
    predicates: Vec<Predicate>,
    filters: Vec<Filter<'s, T>>,
    skip: usize,
    take: Option<usize>,
    /// First path error seen while building; reported by the terminal call.
    error: Option<CoreError>,
}

impl<'s, 'a, T: Document> Query<'s, 'a, T> {
    pub(crate) fn new(session: &'s mut Session<'a>) -> Self {
        Self {
            session,
            predicates: Vec::new(),
            filters: Vec::new(),
            skip: 0,
            take: None,
            error: None,
        }
    }

    fn compare(mut self, path: &str, op: CompareOp, value: Value) -> Self {
        match FieldPath::parse(path) {
            Ok(path) => self.predicates.push(Predicate::compare(path, op, value)),
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    pub fn where_eq(self, path: &str, value: impl Into<Value>) -> Self {
        self.compare(path, CompareOp::Eq, value.into())
    }

    pub fn where_ne(self, path: &str, value: impl Into<Value>) -> Self {
        self.compare(path, CompareOp::Ne, value.into())
    }

    pub fn where_gt(self, path: &str, value: impl Into<Value>) -> Self {
        self.compare(path, CompareOp::Gt, value.into())
    }

    pub fn where_ge(self, path: &str, value: impl Into<Value>) -> Self {
        self.compare(path, CompareOp::Ge, value.into())
    }

    pub fn where_lt(self, path: &str, value: impl Into<Value>) -> Self {
        self.compare(path, CompareOp::Lt, value.into())
    }

    pub fn where_le(self, path: &str, value: impl Into<Value>) -> Self {
        self.compare(path, CompareOp::Le, value.into())
    }

    /// Array field holding an equal element, or text field containing a substring.
    pub fn where_contains(mut self, path: &str, value: impl Into<Value>) -> Self {
        match FieldPath::parse(path) {
            Ok(path) => self.predicates.push(Predicate::contains(path, value)),
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    /// Add an arbitrary predicate over the encoded document.
    pub fn where_pred(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Add a filter over the decoded document.
    pub fn filter(mut self, f: impl Fn(&T) -> bool + 's) -> Self {
        self.filters.push(Box::new(f));
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    pub fn take(mut self, n: usize) -> Self {
        self.take = Some(n);
        self
    }

    /// Run the query and track every result.
    pub fn to_list(self) -> Result<Vec<Entity<T>>> {
        let Query {
            session,
            predicates,
            filters,
            skip,
            take,
            error,
        } = self;
        let matches = evaluate(session, &predicates, &filters, error)?;

        let limit = take.unwrap_or(usize::MAX);
        let mut results = Vec::new();
        for (id, doc, etag) in matches.into_iter().skip(skip).take(limit) {
            let entity = match session.tracked::<T>(id.as_str()) {
                Some(tracked) => tracked?,
                None => session.track(id, doc, etag)?,
            };
            results.push(entity);
        }
        Ok(results)
    }

    /// The first result, if any.
    pub fn first(self) -> Result<Option<Entity<T>>> {
        Ok(self.take(1).to_list()?.into_iter().next())
    }

    /// Number of matching documents. Results are not tracked.
    pub fn count(self) -> Result<usize> {
        let Query {
            session,
            predicates,
            filters,
            skip,
            take,
            error,
        } = self;
        let n = evaluate(session, &predicates, &filters, error)?
            .len()
            .saturating_sub(skip);
        Ok(take.map_or(n, |t| n.min(t)))
    }

    /// Whether any document matches. Results are not tracked.
    pub fn any(self) -> Result<bool> {
        Ok(self.count()? > 0)
    }
}

/// Scan `T`'s collection and return matches in id order, decoded.
fn evaluate<T: Document>(
    session: &mut Session<'_>,
    predicates: &[Predicate],
    filters: &[Filter<'_, T>],
    error: Option<CoreError>,
) -> Result<Vec<(DocumentId, T, u64)>> {
    if let Some(e) = error {
        return Err(Error::InvalidQuery(e.to_string()));
    }

    session.count_request()?;
    let stored = session.document_store().backend().scan(T::COLLECTION)?;
    let scanned = stored.len();

    let mut matches = Vec::new();
    for doc in stored {
        if session.is_deleted(doc.id.as_str()) {
            continue;
        }
        let tree = from_bytes(&doc.body)?;
        if !predicates.iter().all(|p| p.matches(&tree)) {
            continue;
        }
        let value: T = decode_document(&tree)?;
        if !filters.iter().all(|f| f(&value)) {
            continue;
        }
        matches.push((doc.id, value, doc.etag));
    }

    trace!(
        collection = T::COLLECTION,
        scanned,
        matched = matches.len(),
        "query evaluated"
    );
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use crate::{DocumentStore, Error, StoreConfig};
    use tome_core::Document;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Note {
        id: String,
        title: String,
        priority: i64,
        tags: Vec<String>,
    }

    impl Document for Note {
        const COLLECTION: &'static str = "Notes";

        fn id(&self) -> &str {
            &self.id
        }

        fn set_id(&mut self, id: String) {
            self.id = id;
        }
    }

    fn note(title: &str, priority: i64, tags: &[&str]) -> Note {
        Note {
            id: String::new(),
            title: title.into(),
            priority,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn seeded() -> DocumentStore {
        let store = DocumentStore::initialize(StoreConfig::memory()).unwrap();
        {
            let mut session = store.open_session();
            session.store(note("alpha", 1, &["red"])).unwrap();
            session.store(note("beta", 2, &["red", "blue"])).unwrap();
            session.store(note("gamma", 3, &[])).unwrap();
            session.save_changes().unwrap();
        }
        store
    }

    #[test]
    fn test_comparisons() {
        let store = seeded();
        let mut session = store.open_session();

        let titles: Vec<String> = session
            .query::<Note>()
            .where_ge("priority", 2)
            .to_list()
            .unwrap()
            .iter()
            .map(|n| n.borrow().title.clone())
            .collect();
        assert_eq!(titles, vec!["beta", "gamma"]);

        let n = session.query::<Note>().where_ne("title", "alpha").count().unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn test_contains_and_filter() {
        let store = seeded();
        let mut session = store.open_session();

        let red = session.query::<Note>().where_contains("tags", "red").count().unwrap();
        assert_eq!(red, 2);

        let results = session
            .query::<Note>()
            .filter(|n| n.title.ends_with('a'))
            .where_contains("tags", "blue")
            .to_list()
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].borrow().title, "beta");
    }

    #[test]
    fn test_skip_take_first() {
        let store = seeded();
        let mut session = store.open_session();

        let page = session.query::<Note>().skip(1).take(1).to_list().unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].borrow().title, "beta");

        assert_eq!(session.query::<Note>().skip(2).take(5).count().unwrap(), 1);
        assert!(session.query::<Note>().where_eq("title", "delta").first().unwrap().is_none());
        assert!(!session.query::<Note>().where_gt("priority", 3).any().unwrap());
    }

    #[test]
    fn test_results_go_through_identity_map() {
        let store = seeded();
        let mut session = store.open_session();

        let loaded = session.load::<Note>("notes/1").unwrap().unwrap();
        let queried = session
            .query::<Note>()
            .where_eq("title", "alpha")
            .first()
            .unwrap()
            .unwrap();
        assert!(loaded.ptr_eq(&queried));
    }

    #[test]
    fn test_deleted_in_session_is_hidden() {
        let store = seeded();
        let mut session = store.open_session();

        session.delete_by_id::<Note>("notes/2").unwrap();
        assert_eq!(session.query::<Note>().count().unwrap(), 2);
    }

    #[test]
    fn test_bad_path_is_reported_on_execution() {
        let store = seeded();
        let mut session = store.open_session();

        let err = session
            .query::<Note>()
            .where_eq("tags..0", "red")
            .to_list()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
        assert_eq!(session.number_of_requests(), 0);
    }
}
