//! Base model - The generic attribute bag underneath documents and
//! subdocuments.
//!
//! It knows about translated data members, per-field setter/getter
//! overrides, and change tracking gated by a lifecycle status. Documents
//! and subdocuments both embed an [`Attributes`] bag and delegate to it.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use crate::error::OdmError;
use crate::value::{Bag, Value};

/// Lifecycle status of a model instance.
///
/// Change tracking runs in `Clean` and `Dirty`; `Initializing` (hydration
/// from storage) and `Import` (bulk loads) suppress it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Clean,
    Initializing,
    Dirty,
    Import,
}

impl Status {
    fn tracking(self) -> bool {
        matches!(self, Status::Clean | Status::Dirty)
    }
}

/// A per-field setter override: receives the already-converted value and
/// returns the value to store.
pub type Setter<M> = fn(&mut Attributes<M>, Value) -> Value;

/// A per-field getter override: computes the value to return for a field.
pub type Getter<M> = fn(&Attributes<M>) -> Option<Value>;

/// Static schema declaration for a model class.
///
/// The override tables replace runtime method-name dispatch: a subclass
/// intercepts specific fields by listing them here, and the generic bag
/// behavior handles everything else.
pub trait Model: Sized + Send + Sync + 'static {
    /// Fields whose stored value is a per-language mapping. Fixed per
    /// class; a field is either always translated or never.
    fn translated_fields() -> &'static [&'static str] {
        &[]
    }

    /// Per-field setter overrides, consulted only while tracking.
    fn setters() -> &'static [(&'static str, Setter<Self>)] {
        &[]
    }

    /// Per-field getter overrides, always consulted first.
    fn getters() -> &'static [(&'static str, Getter<Self>)] {
        &[]
    }
}

fn is_translated<M: Model>(key: &str) -> bool {
    M::translated_fields().contains(&key)
}

/// The generic dynamic-attribute container.
///
/// Attribute keys are unique; the bag fully determines the serialized form
/// of the model aside from the separately-tracked identifier.
#[derive(Debug, Clone)]
pub struct Attributes<M: Model> {
    data: Bag,
    lang: String,
    status: Status,
    changes: BTreeMap<String, Vec<Value>>,
    _marker: PhantomData<M>,
}

impl<M: Model> Default for Attributes<M> {
    fn default() -> Self {
        Self::new("en")
    }
}

impl<M: Model> Attributes<M> {
    pub fn new(lang: impl Into<String>) -> Self {
        Self {
            data: Bag::new(),
            lang: lang.into(),
            status: Status::default(),
            changes: BTreeMap::new(),
            _marker: PhantomData,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Switches the instance to bulk-load mode: assignments are not
    /// recorded as changes.
    pub fn prepare_import(&mut self) {
        self.status = Status::Import;
    }

    pub fn language(&self) -> &str {
        &self.lang
    }

    pub fn set_language(&mut self, lang: impl Into<String>) {
        self.lang = lang.into();
    }

    /// Gets a field value: getter override first, then the bag, resolving
    /// translated entries via the current language with fallback to the
    /// first available language.
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some((_, getter)) = M::getters().iter().find(|(name, _)| *name == key) {
            return getter(self);
        }

        let raw = self.data.get(key)?;
        if !is_translated::<M>(key) {
            return Some(raw.clone());
        }

        let map = raw.as_map()?;
        match map.get(&self.lang) {
            Some(v) => Some(v.clone()),
            None => map.values().next().cloned(),
        }
    }

    /// Raw stored value, bypassing overrides and translation resolution.
    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Sets a field value.
    ///
    /// While tracking, a write that changes the stored value appends the
    /// previous value to the per-field change list. Comparison happens on
    /// already-converted values.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        let mut value = value.into();

        if self.status.tracking() {
            if let Some((_, setter)) = M::setters().iter().find(|(name, _)| *name == key) {
                value = setter(self, value);
            }
        }

        if !is_translated::<M>(key) {
            self.store(key, value);
            return;
        }

        // Translated entry: a map value merges per-language entries, any
        // other value lands under the current language.
        let mut merged = match self.data.get(key).and_then(Value::as_map) {
            Some(existing) => existing.clone(),
            None => Bag::new(),
        };
        match value {
            Value::Map(langs) => merged.extend(langs),
            other => {
                merged.insert(self.lang.clone(), other);
            }
        }
        self.store(key, Value::Map(merged));
    }

    fn store(&mut self, key: &str, value: Value) {
        if self.status.tracking() {
            if let Some(previous) = self.data.get(key) {
                if *previous != value {
                    let previous = previous.clone();
                    self.changes.entry(key.to_string()).or_default().push(previous);
                    self.status = Status::Dirty;
                }
            }
        }
        self.data.insert(key.to_string(), value);
    }

    pub fn unset(&mut self, key: &str) {
        self.data.remove(key);
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Resets the bag and assigns every entry of `data` through `set`,
    /// in `Initializing` status so nothing registers as a change.
    pub fn init(&mut self, data: Bag) {
        self.data.clear();
        let resume = match self.status {
            Status::Import => Status::Import,
            _ => Status::Clean,
        };

        self.status = Status::Initializing;
        for (key, value) in data {
            self.set(&key, value);
        }
        self.status = resume;
    }

    /// Plain snapshot of the attribute bag.
    pub fn to_bag(&self) -> Bag {
        self.data.clone()
    }

    /// Snapshot of the requested keys, resolved through `get` so computed
    /// and translated values surface.
    pub fn to_bag_keys(&self, keys: &[&str]) -> Bag {
        keys.iter()
            .filter_map(|key| self.get(key).map(|v| (key.to_string(), v)))
            .collect()
    }

    /// Sets the value for a key in a specific language.
    pub fn set_translation(
        &mut self,
        key: &str,
        value: impl Into<Value>,
        lang: &str,
    ) -> Result<(), OdmError> {
        if !is_translated::<M>(key) {
            return Err(self.not_translated(key));
        }

        let mut langs = match self.data.get(key).and_then(Value::as_map) {
            Some(existing) => existing.clone(),
            None => Bag::new(),
        };
        langs.insert(lang.to_string(), value.into());
        self.store(key, Value::Map(langs));
        Ok(())
    }

    /// Value of a key in the specified language, or in the current
    /// language context when `lang` is `None`. Returns `None` when the
    /// entry simply has no value for that language.
    pub fn get_translation(&self, key: &str, lang: Option<&str>) -> Result<Option<Value>, OdmError> {
        if !is_translated::<M>(key) {
            return Err(self.not_translated(key));
        }

        let lang = lang.unwrap_or(&self.lang);
        Ok(self
            .data
            .get(key)
            .and_then(Value::as_map)
            .and_then(|map| map.get(lang))
            .cloned())
    }

    /// The whole per-language mapping of a translated key.
    pub fn translations(&self, key: &str) -> Result<Option<Bag>, OdmError> {
        if !is_translated::<M>(key) {
            return Err(self.not_translated(key));
        }
        Ok(self.data.get(key).and_then(Value::as_map).cloned())
    }

    fn not_translated(&self, key: &str) -> OdmError {
        OdmError::NotTranslated {
            field: key.to_string(),
            model: std::any::type_name::<M>(),
        }
    }

    /// Fields changed since the last save, with their previous values in
    /// write order.
    pub fn changes(&self) -> &BTreeMap<String, Vec<Value>> {
        &self.changes
    }

    /// Drains the change list, returning it. Called after every save to
    /// drive the per-field updated hooks.
    pub fn take_changes(&mut self) -> BTreeMap<String, Vec<Value>> {
        let changes = std::mem::take(&mut self.changes);
        if self.status == Status::Dirty {
            self.status = Status::Clean;
        }
        changes
    }
}
