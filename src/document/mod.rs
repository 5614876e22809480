//! Documents - The object-document mapper core.
//!
//! A [`Document`] is a mapped, independently persistable entity: an
//! attribute bag plus the store-assigned `_id`, hydrated from storage via
//! [`Document::map`] and persisted through a [`DocumentRepository`].

mod query;
mod repository;

pub use query::{normalize_query, sort_direction, FindArgs};
pub use repository::{
    Command, DistinctValue, DocumentRepository, DocumentsExt, Gettable, SEQUENCE_COLLECTION,
};

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::base::{Attributes, Model, Status};
use crate::connection::Connection;
use crate::error::OdmError;
use crate::value::{Bag, Reference, Value};

/// A per-field updated hook, invoked after a save for every field present
/// in the change list, with the field's previous values in write order.
pub type UpdatedHook<C> = fn(&mut Document<C>, &[Value]);

/// Schema declaration for a top-level collection class.
pub trait Collection: Model {
    /// The storage collection name.
    const COLLECTION: &'static str;

    /// The application-level identifier field used for cache keys and
    /// `get()` lookups.
    const ID_FIELD: &'static str = "id";

    /// Classes flagged non-persistable reject `save()`.
    const PERSISTABLE: bool = true;

    /// Per-field updated hooks.
    fn updated_hooks() -> &'static [(&'static str, UpdatedHook<Self>)] {
        &[]
    }
}

/// One record of a named collection, in memory.
#[derive(Debug, Clone)]
pub struct Document<C: Collection> {
    id: Option<Value>,
    attrs: Attributes<C>,
}

impl<C: Collection> Default for Document<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Collection> Document<C> {
    pub fn new() -> Self {
        Self {
            id: None,
            attrs: Attributes::default(),
        }
    }

    /// Hydrates a document from a stored record: the store identifier is
    /// extracted separately, the rest initializes the attribute bag with
    /// change tracking suppressed.
    pub fn map(mut record: Bag) -> Self {
        let id = record.remove("_id");
        let mut doc = Self::new();
        doc.attrs.init(record);
        doc.id = id;
        doc
    }

    /// The store-assigned identifier, if this document was ever persisted.
    pub fn id(&self) -> Option<&Value> {
        self.id.as_ref()
    }

    pub(crate) fn set_id(&mut self, id: Value) {
        self.id = Some(id);
    }

    /// The reference descriptor for this document. Requires an identifier;
    /// the auto-persisting variant is
    /// [`DocumentRepository::reference`](repository::DocumentRepository::reference).
    pub fn to_reference(&self) -> Result<Reference, OdmError> {
        match &self.id {
            Some(id) => Ok(Reference::new(C::COLLECTION, id.clone())),
            None => Err(OdmError::Operation {
                message: format!(
                    "document of '{}' has no identifier yet; save it first",
                    C::COLLECTION
                ),
                code: 0,
            }),
        }
    }

    pub fn attrs(&self) -> &Attributes<C> {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Attributes<C> {
        &mut self.attrs
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.attrs.get(key)
    }

    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.attrs.raw(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.attrs.set(key, value);
    }

    pub fn unset(&mut self, key: &str) {
        self.attrs.unset(key);
    }

    pub fn has(&self, key: &str) -> bool {
        self.attrs.has(key)
    }

    pub fn init(&mut self, data: Bag) {
        self.attrs.init(data);
    }

    pub fn status(&self) -> Status {
        self.attrs.status()
    }

    pub fn prepare_import(&mut self) {
        self.attrs.prepare_import();
    }

    pub fn language(&self) -> &str {
        self.attrs.language()
    }

    pub fn set_language(&mut self, lang: impl Into<String>) {
        self.attrs.set_language(lang);
    }

    pub fn set_translation(
        &mut self,
        key: &str,
        value: impl Into<Value>,
        lang: &str,
    ) -> Result<(), OdmError> {
        self.attrs.set_translation(key, value, lang)
    }

    pub fn get_translation(&self, key: &str, lang: Option<&str>) -> Result<Option<Value>, OdmError> {
        self.attrs.get_translation(key, lang)
    }

    pub fn translations(&self, key: &str) -> Result<Option<Bag>, OdmError> {
        self.attrs.translations(key)
    }

    /// Plain snapshot of the attribute bag, without the identifier.
    pub fn to_bag(&self) -> Bag {
        self.attrs.to_bag()
    }

    pub fn to_bag_keys(&self, keys: &[&str]) -> Bag {
        self.attrs.to_bag_keys(keys)
    }

    pub fn changes(&self) -> &BTreeMap<String, Vec<Value>> {
        self.attrs.changes()
    }

    pub(crate) fn take_changes(&mut self) -> BTreeMap<String, Vec<Value>> {
        self.attrs.take_changes()
    }

    /// Dereferences a reference-valued attribute into a materialized
    /// document of the mapped class, memoizing the result in the
    /// connection's reference cache.
    ///
    /// Returns `None` when the field is absent, not a reference, or the
    /// referenced record no longer exists.
    pub fn resolve<T: Collection>(
        &self,
        field: &str,
        conn: &Connection,
    ) -> Result<Option<Arc<Document<T>>>, OdmError> {
        conn.resolve_reference::<T>(self.raw(field), field)
    }
}

impl<C: Collection> TryFrom<&Document<C>> for Value {
    type Error = OdmError;

    fn try_from(doc: &Document<C>) -> Result<Self, Self::Error> {
        Ok(Value::Reference(doc.to_reference()?))
    }
}
