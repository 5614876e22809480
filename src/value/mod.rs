//! Values - The tagged attribute value type shared by documents and drivers.
//!
//! Attribute values are an explicit variant instead of runtime type
//! inspection: scalars, sequences, mappings, reference descriptors and
//! date values each get their own arm, with conversion functions at the
//! store boundary.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// An ordered attribute mapping, the serialized form of a document.
pub type Bag = BTreeMap<String, Value>;

/// A reference descriptor: identifies another document by collection name
/// and foreign id without inlining its data.
///
/// Serializes in the MongoDB DBRef shape: `{"$ref": ..., "$id": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "$ref")]
    pub collection: String,
    #[serde(rename = "$id")]
    pub id: Box<Value>,
}

impl Reference {
    pub fn new(collection: impl Into<String>, id: Value) -> Self {
        Self {
            collection: collection.into(),
            id: Box::new(id),
        }
    }
}

/// An epoch-seconds date wrapper, distinct from the application's calendar
/// type (`SystemTime`). Conversion is explicit on every read and write.
///
/// Serializes as `{"$date": secs}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MongoDate {
    #[serde(rename = "$date")]
    pub sec: i64,
}

impl MongoDate {
    pub fn new(sec: i64) -> Self {
        Self { sec }
    }

    pub fn to_system_time(self) -> SystemTime {
        if self.sec >= 0 {
            UNIX_EPOCH + Duration::from_secs(self.sec as u64)
        } else {
            UNIX_EPOCH - Duration::from_secs(self.sec.unsigned_abs())
        }
    }
}

impl From<SystemTime> for MongoDate {
    fn from(t: SystemTime) -> Self {
        match t.duration_since(UNIX_EPOCH) {
            Ok(d) => Self::new(d.as_secs() as i64),
            Err(e) => Self::new(-(e.duration().as_secs() as i64)),
        }
    }
}

/// An attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Reference(Reference),
    Date(MongoDate),
    Map(Bag),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Bag> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Value::Reference(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<MongoDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_system_time(&self) -> Option<SystemTime> {
        self.as_date().map(MongoDate::to_system_time)
    }

    /// Canonical string form, used as identity/reference cache key.
    pub fn key_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(x) => x.to_string(),
            Value::String(s) => s.clone(),
            Value::Date(d) => format!("date:{}", d.sec),
            Value::Reference(r) => format!("{}:{}", r.collection, r.id.key_string()),
            other => format!("{:?}", other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Bag> for Value {
    fn from(map: Bag) -> Self {
        Value::Map(map)
    }
}

impl From<Reference> for Value {
    fn from(r: Reference) -> Self {
        Value::Reference(r)
    }
}

impl From<MongoDate> for Value {
    fn from(d: MongoDate) -> Self {
        Value::Date(d)
    }
}

impl From<SystemTime> for Value {
    fn from(t: SystemTime) -> Self {
        Value::Date(MongoDate::from(t))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// Convenience constructor for a [`Bag`] from key/value pairs.
#[macro_export]
macro_rules! bag {
    () => { $crate::Bag::new() };
    ($($key:expr => $val:expr),+ $(,)?) => {{
        let mut map = $crate::Bag::new();
        $( map.insert($key.to_string(), $crate::Value::from($val)); )+
        map
    }};
}
