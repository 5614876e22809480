//! Query normalization and find arguments.
//!
//! Calling code may pass raw scalars, arrays of scalars, reference
//! descriptors, or arrays of references interchangeably in query filters;
//! normalization rewrites them into the store's operator form before
//! dispatch.

use crate::value::{Bag, Value};

/// Arguments for a `find` dispatch.
///
/// `offset` and `limit` apply only when positive; non-positive values are
/// silently ignored rather than treated as zero limits.
#[derive(Debug, Clone, Default)]
pub struct FindArgs {
    pub query: Bag,
    pub fields: Vec<String>,
    /// (field, direction) pairs; directions are `"asc"`/`"desc"` strings
    /// (case-insensitive) or explicit numeric values.
    pub sort: Vec<(String, Value)>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

impl FindArgs {
    pub fn with_query(query: Bag) -> Self {
        Self {
            query,
            ..Self::default()
        }
    }
}

/// Maps a sort value to a numeric direction: `"asc"`/`"desc"` by name, any
/// other value as an explicit numeric direction (defaulting ascending).
pub fn sort_direction(value: &Value) -> i32 {
    match value {
        Value::String(s) if s.eq_ignore_ascii_case("asc") => 1,
        Value::String(s) if s.eq_ignore_ascii_case("desc") => -1,
        Value::Int(n) => {
            if *n < 0 {
                -1
            } else {
                1
            }
        }
        Value::Float(x) => {
            if *x < 0.0 {
                -1
            } else {
                1
            }
        }
        _ => 1,
    }
}

fn in_clause(values: Vec<Value>) -> Value {
    let mut clause = Bag::new();
    clause.insert("$in".to_string(), Value::Array(values));
    Value::Map(clause)
}

/// Unwraps a reference descriptor to its bare id; anything else passes
/// through.
fn unwrap_id(value: Value) -> Value {
    match value {
        Value::Reference(r) => *r.id,
        other => other,
    }
}

/// Normalizes a query filter for dispatch. For every top-level key not
/// beginning with the operator prefix:
///
/// - on the identifier field, a reference descriptor becomes its bare id
///   and an array of references/ids becomes an `$in` of bare ids;
/// - elsewhere, an array becomes an implicit `$in` (references kept as
///   descriptors);
/// - operator documents and plain values pass through untouched.
pub fn normalize_query(query: &Bag, id_field: &str) -> Bag {
    let mut out = Bag::new();
    for (key, value) in query {
        if key.starts_with('$') {
            out.insert(key.clone(), value.clone());
            continue;
        }

        let is_id = key == id_field || key == "_id";
        let normalized = match value.clone() {
            Value::Reference(r) if is_id => *r.id,
            Value::Array(items) if is_id => {
                in_clause(items.into_iter().map(unwrap_id).collect())
            }
            Value::Array(items) => in_clause(items),
            other => other,
        };
        out.insert(key.clone(), normalized);
    }
    out
}
