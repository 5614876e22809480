//! Subdocuments - Object representations of embedded documents.
//!
//! A subdocument shares the attribute-bag, translation and reference
//! semantics of a document but has no collection of its own: find/save
//! operations on subdocuments happen through their parent document.

use std::sync::Arc;

use crate::base::{Attributes, Model, Status};
use crate::connection::Connection;
use crate::document::{Collection, Document};
use crate::error::OdmError;
use crate::value::{Bag, Value};

/// An embedded, non-independently-persistable entity nested inside a
/// parent document's attribute bag.
#[derive(Debug, Clone)]
pub struct Subdocument<M: Model> {
    attrs: Attributes<M>,
}

impl<M: Model> Default for Subdocument<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> Subdocument<M> {
    pub fn new() -> Self {
        Self {
            attrs: Attributes::default(),
        }
    }

    /// Materializes a subdocument from its stored mapping, as part of the
    /// parent's hydration.
    pub fn from_bag(bag: Bag) -> Self {
        let mut sub = Self::new();
        sub.attrs.init(bag);
        sub
    }

    /// The stored form, to be placed back into the parent's bag.
    pub fn to_bag(&self) -> Bag {
        self.attrs.to_bag()
    }

    pub fn to_value(&self) -> Value {
        Value::Map(self.to_bag())
    }

    pub fn attrs(&self) -> &Attributes<M> {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Attributes<M> {
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

    pub fn status(&self) -> Status {
        self.attrs.status()
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

    /// Dereferences a reference-valued entry into a materialized document
    /// of the mapped class, memoized in the connection's reference cache
    /// under the foreign identifier like document resolution.
    pub fn resolve<T: Collection>(
        &self,
        field: &str,
        conn: &Connection,
    ) -> Result<Option<Arc<Document<T>>>, OdmError> {
        conn.resolve_reference::<T>(self.raw(field), field)
    }
}

impl<M: Model> From<Subdocument<M>> for Value {
    fn from(sub: Subdocument<M>) -> Self {
        sub.to_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag;

    struct Address;
    impl Model for Address {
        fn translated_fields() -> &'static [&'static str] {
            &["city"]
        }
    }

    #[test]
    fn bag_round_trip_preserves_attributes() {
        let mut sub: Subdocument<Address> = Subdocument::new();
        sub.set("street", "1-2-3 Chiyoda");
        sub.set("city", "Tokyo");

        let restored = Subdocument::<Address>::from_bag(sub.to_bag());
        assert_eq!(restored.to_bag(), sub.to_bag());
        assert!(restored.attrs().changes().is_empty());
    }

    #[test]
    fn translated_fields_behave_like_documents() {
        let mut sub: Subdocument<Address> = Subdocument::new();
        sub.set_language("en");
        sub.set("city", "Tokyo");
        sub.set_translation("city", "東京", "ja").unwrap();

        sub.set_language("ja");
        assert_eq!(sub.get("city"), Some(Value::String("東京".into())));
        assert_eq!(
            sub.get_translation("city", Some("en")).unwrap(),
            Some(Value::String("Tokyo".into()))
        );
    }

    #[test]
    fn nests_into_a_parent_bag() {
        let mut sub: Subdocument<Address> = Subdocument::new();
        sub.set("street", "Main St");
        let parent = bag! { "address" => sub.to_value() };
        let stored = parent.get("address").unwrap().as_map().unwrap();
        assert_eq!(stored.get("street"), Some(&Value::String("Main St".into())));
    }
}
