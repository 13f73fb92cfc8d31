//! The `Document` trait: what a type needs to be persisted by Tome.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A user-defined record persisted under a string identifier.
///
/// The identifier lives inside the document so callers can read it after
/// the store assigns one. An empty identifier means "not yet assigned".
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use tome_core::Document;
///
/// #[derive(Serialize, Deserialize)]
/// struct Person {
///     id: String,
///     name: String,
/// }
///
/// impl Document for Person {
///     const COLLECTION: &'static str = "People";
///
///     fn id(&self) -> &str {
///         &self.id
///     }
///
///     fn set_id(&mut self, id: String) {
///         self.id = id;
///     }
/// }
/// ```
pub trait Document: Serialize + DeserializeOwned + 'static {
    /// Name of the collection this type is stored in.
    ///
    /// Queries for this type only scan this collection.
    const COLLECTION: &'static str;

    /// The current identifier, or `""` if none has been assigned.
    fn id(&self) -> &str;

    /// Overwrite the identifier.
    fn set_id(&mut self, id: String);

    /// Discriminator persisted next to the body.
    fn type_tag() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Whether an identifier has been assigned.
    fn has_id(&self) -> bool {
        !self.id().is_empty()
    }
}
