//! Tracked entity handles.

use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use tome_core::{encode_document, Document, Value};

use crate::error::{Error, Result};

/// A document instance tracked by a [`Session`](crate::Session).
///
/// Cloning the handle does not clone the document: every clone points at
/// the same instance. Within one session, loading an id twice yields
/// handles for which [`Entity::ptr_eq`] holds. Mutations made through
/// [`Entity::borrow_mut`] are picked up by `save_changes`.
pub struct Entity<T> {
    inner: Rc<RefCell<T>>,
}

impl<T: Document> Entity<T> {
    pub(crate) fn new(doc: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(doc)),
        }
    }

    /// Immutable access to the document.
    ///
    /// Panics if the document is currently mutably borrowed.
    pub fn borrow(&self) -> Ref<'_, T> {
        self.inner.borrow()
    }

    /// Mutable access to the document.
    ///
    /// Panics if the document is currently borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.inner.borrow_mut()
    }

    /// The document's identifier.
    ///
    /// Panics if the document is currently mutably borrowed.
    pub fn id(&self) -> String {
        self.inner.borrow().id().to_string()
    }

    /// Whether both handles point at the same in-memory instance.
    pub fn ptr_eq(&self, other: &Entity<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// A detached copy of the document's current state.
    pub fn to_owned_document(&self) -> T
    where
        T: Clone,
    {
        self.inner.borrow().clone()
    }

    /// Shared access for the session, failing instead of panicking while a
    /// caller holds a [`Entity::borrow_mut`] guard.
    fn read(&self) -> Result<Ref<'_, T>> {
        self.inner.try_borrow().map_err(|_| {
            Error::InvalidOperation(format!(
                "a {} is mutably borrowed; release it before using the session",
                T::type_tag()
            ))
        })
    }
}

impl<T> Clone for Entity<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Entity<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Entity").field(&self.inner.borrow()).finish()
    }
}

/// Type-erased view of an [`Entity`], held in the session's identity map.
pub(crate) trait TrackedEntity {
    fn encode(&self) -> Result<Value>;
    fn current_id(&self) -> Result<String>;
    fn collection(&self) -> &'static str;
    fn type_tag(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
}

impl<T: Document> TrackedEntity for Entity<T> {
    fn encode(&self) -> Result<Value> {
        Ok(encode_document(&*self.read()?)?)
    }

    fn current_id(&self) -> Result<String> {
        Ok(self.read()?.id().to_string())
    }

    fn collection(&self) -> &'static str {
        T::COLLECTION
    }

    fn type_tag(&self) -> &'static str {
        T::type_tag()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
