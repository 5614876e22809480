//! Caches - Identity and reference caches, scoped to a connection.
//!
//! Both caches are owned by the [`Connection`](crate::Connection) rather
//! than living in process-wide statics, so each request/session context
//! gets its own instance tree. Entries are type-erased behind `Any` because
//! a single cache serves every registered document class.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

type Slot = Arc<dyn Any + Send + Sync>;

/// Per-class cache from requested id to already-materialized document,
/// populated by `get()`. Entries are expired only by a save of the same
/// document.
#[derive(Default)]
pub struct IdentityCache {
    entries: RwLock<HashMap<(&'static str, String), Slot>>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: Send + Sync + 'static>(
        &self,
        collection: &'static str,
        key: &str,
    ) -> Option<Arc<T>> {
        let entries = self.entries.read().ok()?;
        let slot = entries.get(&(collection, key.to_string()))?;
        slot.clone().downcast::<T>().ok()
    }

    pub fn put<T: Send + Sync + 'static>(
        &self,
        collection: &'static str,
        key: String,
        value: Arc<T>,
    ) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert((collection, key), value);
        }
    }

    pub fn contains(&self, collection: &'static str, key: &str) -> bool {
        self.entries
            .read()
            .map(|entries| entries.contains_key(&(collection, key.to_string())))
            .unwrap_or(false)
    }

    /// Removes the entry for one document, forcing the next `get()` to
    /// refetch.
    pub fn remove(&self, collection: &'static str, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&(collection, key.to_string()));
        }
    }
}

/// Cache of already-resolved reference-field values: a two-level mapping
/// keyed first by the referenced (foreign) document's identifier, then by
/// field name.
///
/// Memoizes lazy sub-objects so repeated attribute reads do not
/// re-resolve. Keying by the foreign identifier means a save of the
/// referenced document drops every cached resolution of it at once.
#[derive(Default)]
pub struct RefCache {
    entries: RwLock<HashMap<String, HashMap<String, Slot>>>,
}

impl RefCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Send + Sync + 'static>(&self, foreign: &str, field: &str, value: Arc<T>) {
        if let Ok(mut entries) = self.entries.write() {
            entries
                .entry(foreign.to_string())
                .or_default()
                .insert(field.to_string(), value);
        }
    }

    pub fn get<T: Send + Sync + 'static>(&self, foreign: &str, field: &str) -> Option<Arc<T>> {
        let entries = self.entries.read().ok()?;
        let slot = entries.get(foreign)?.get(field)?;
        slot.clone().downcast::<T>().ok()
    }

    pub fn delete(&self, foreign: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(foreign);
        }
    }
}
