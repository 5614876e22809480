//! MemoryDriver - HashMap-backed driver for testing and development.
//!
//! Implements enough of the query surface for the mapper's semantics:
//! equality (including reference descriptors and dotted paths), `$in` and
//! friends, `$set`/`$unset`/`$inc` update operators, sorting, skip/limit,
//! a `$match`/`$group` aggregation subset, distinct, findAndModify with
//! upsert, and base64-chunked grid storage.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};

use base64::Engine as _;

use super::{
    CollectionHandle, Driver, DriverError, FindOptions, GridFile, GridHandle, ModifyOptions,
};
use crate::value::{Bag, Value};

const GRID_CHUNK_SIZE: usize = 255 * 1024;

fn poisoned() -> DriverError {
    DriverError::new("lock poisoned", 0)
}

/// In-memory document store backed by per-collection record vectors.
/// Clone-friendly via Arc.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    collections: Arc<RwLock<HashMap<String, Arc<MemoryCollection>>>>,
    grids: Arc<RwLock<HashMap<String, Arc<MemoryGrid>>>>,
    next_id: Arc<AtomicU64>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn assign_id(counter: &AtomicU64) -> Value {
        let n = counter.fetch_add(1, AtomicOrdering::Relaxed) + 1;
        // Object-id-like: 24 hex digits.
        Value::String(format!("{:024x}", n))
    }
}

impl Driver for MemoryDriver {
    fn collection(&self, name: &str) -> Arc<dyn CollectionHandle> {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        collections
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(MemoryCollection {
                    records: RwLock::new(Vec::new()),
                    next_id: Arc::clone(&self.next_id),
                })
            })
            .clone()
    }

    fn grid(&self, name: &str) -> Arc<dyn GridHandle> {
        let mut grids = self.grids.write().unwrap_or_else(|e| e.into_inner());
        grids
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(MemoryGrid {
                    files: RwLock::new(Vec::new()),
                    next_id: Arc::clone(&self.next_id),
                })
            })
            .clone()
    }
}

struct MemoryCollection {
    records: RwLock<Vec<Bag>>,
    next_id: Arc<AtomicU64>,
}

/// Looks up a possibly-dotted path in a record.
fn lookup<'a>(record: &'a Bag, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = record.get(parts.next()?)?;
    for part in parts {
        current = current.as_map()?.get(part)?;
    }
    Some(current)
}

/// Partial ordering across comparable value kinds, used for sorting and
/// range operators. Incomparable kinds order as equal.
fn cmp_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => {
            let (x, y) = (a.as_f64(), b.as_f64());
            match (x, y) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            }
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Date(x), Value::Date(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

fn matches_condition(stored: Option<&Value>, condition: &Value) -> bool {
    // An operator document applies each operator in turn.
    if let Value::Map(ops) = condition {
        if ops.keys().any(|k| k.starts_with('$')) {
            return ops.iter().all(|(op, operand)| {
                matches_operator(stored, op, operand)
            });
        }
    }

    match stored {
        Some(value) => value == condition,
        None => condition.is_null(),
    }
}

fn matches_operator(stored: Option<&Value>, op: &str, operand: &Value) -> bool {
    match op {
        "$exists" => {
            let wanted = operand.as_bool().unwrap_or(true);
            stored.is_some() == wanted
        }
        "$in" => match (stored, operand.as_array()) {
            (Some(value), Some(candidates)) => candidates.iter().any(|c| c == value),
            _ => false,
        },
        "$nin" => match (stored, operand.as_array()) {
            (Some(value), Some(candidates)) => !candidates.iter().any(|c| c == value),
            (None, Some(_)) => true,
            _ => false,
        },
        "$ne" => stored != Some(operand),
        "$gt" => stored.is_some_and(|v| cmp_values(v, operand) == Ordering::Greater),
        "$gte" => stored.is_some_and(|v| cmp_values(v, operand) != Ordering::Less),
        "$lt" => stored.is_some_and(|v| cmp_values(v, operand) == Ordering::Less),
        "$lte" => stored.is_some_and(|v| cmp_values(v, operand) != Ordering::Greater),
        _ => false,
    }
}

fn matches_filter(record: &Bag, filter: &Bag) -> bool {
    filter
        .iter()
        .all(|(key, condition)| matches_condition(lookup(record, key), condition))
}

fn sort_records(records: &mut [Bag], sort: &[(String, i32)]) {
    if sort.is_empty() {
        return;
    }
    records.sort_by(|a, b| {
        for (field, direction) in sort {
            let ord = match (lookup(a, field), lookup(b, field)) {
                (Some(x), Some(y)) => cmp_values(x, y),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            };
            let ord = if *direction < 0 { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn project(record: &Bag, projection: &[String]) -> Bag {
    if projection.is_empty() {
        return record.clone();
    }
    let mut out = Bag::new();
    if let Some(id) = record.get("_id") {
        out.insert("_id".to_string(), id.clone());
    }
    for field in projection {
        if let Some(value) = record.get(field) {
            out.insert(field.clone(), value.clone());
        }
    }
    out
}

fn apply_ops(record: &mut Bag, ops: &Bag) -> Result<(), DriverError> {
    for (op, args) in ops {
        let args = match args.as_map() {
            Some(map) => map,
            None => {
                return Err(DriverError::new(
                    format!("update operator '{}' expects a document", op),
                    9,
                ))
            }
        };
        match op.as_str() {
            "$set" => {
                for (field, value) in args {
                    record.insert(field.clone(), value.clone());
                }
            }
            "$unset" => {
                for field in args.keys() {
                    record.remove(field);
                }
            }
            "$inc" => {
                for (field, step) in args {
                    let step = step.as_i64().ok_or_else(|| {
                        DriverError::new("$inc expects a numeric operand", 14)
                    })?;
                    let current = record.get(field).and_then(Value::as_i64).unwrap_or(0);
                    record.insert(field.clone(), Value::Int(current + step));
                }
            }
            other => {
                return Err(DriverError::new(
                    format!("unsupported update operator '{}'", other),
                    9,
                ))
            }
        }
    }
    Ok(())
}

impl CollectionHandle for MemoryCollection {
    fn find(&self, filter: &Bag, options: &FindOptions) -> Result<Vec<Bag>, DriverError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        let mut matched: Vec<Bag> = records
            .iter()
            .filter(|r| matches_filter(r, filter))
            .cloned()
            .collect();
        drop(records);

        sort_records(&mut matched, &options.sort);

        let skip = options.skip.unwrap_or(0) as usize;
        let mut matched: Vec<Bag> = matched.into_iter().skip(skip).collect();
        if let Some(limit) = options.limit {
            matched.truncate(limit as usize);
        }

        Ok(matched
            .iter()
            .map(|r| project(r, &options.projection))
            .collect())
    }

    fn find_one(&self, filter: &Bag) -> Result<Option<Bag>, DriverError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.iter().find(|r| matches_filter(r, filter)).cloned())
    }

    fn count(&self, filter: &Bag) -> Result<u64, DriverError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.iter().filter(|r| matches_filter(r, filter)).count() as u64)
    }

    fn save(&self, mut record: Bag) -> Result<Value, DriverError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        match record.get("_id").cloned() {
            Some(id) => {
                match records.iter_mut().find(|r| r.get("_id") == Some(&id)) {
                    Some(existing) => *existing = record,
                    None => records.push(record),
                }
                Ok(id)
            }
            None => {
                let id = MemoryDriver::assign_id(&self.next_id);
                record.insert("_id".to_string(), id.clone());
                records.push(record);
                Ok(id)
            }
        }
    }

    fn update(&self, filter: &Bag, ops: &Bag) -> Result<u64, DriverError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        let mut touched = 0;
        for record in records.iter_mut().filter(|r| matches_filter(r, filter)) {
            apply_ops(record, ops)?;
            touched += 1;
        }
        Ok(touched)
    }

    fn remove(&self, filter: &Bag) -> Result<u64, DriverError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        let before = records.len();
        records.retain(|r| !matches_filter(r, filter));
        Ok((before - records.len()) as u64)
    }

    fn find_and_modify(
        &self,
        filter: &Bag,
        ops: &Bag,
        sort: &[(String, i32)],
        options: ModifyOptions,
    ) -> Result<Option<Bag>, DriverError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;

        let mut matched: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| matches_filter(r, filter))
            .map(|(i, _)| i)
            .collect();
        if !sort.is_empty() && matched.len() > 1 {
            let mut snapshot: Vec<Bag> = matched.iter().map(|&i| records[i].clone()).collect();
            sort_records(&mut snapshot, sort);
            let first = &snapshot[0];
            matched.retain(|&i| &records[i] == first);
        }

        match matched.first() {
            Some(&index) => {
                let before = records[index].clone();
                apply_ops(&mut records[index], ops)?;
                Ok(Some(if options.return_new {
                    records[index].clone()
                } else {
                    before
                }))
            }
            None if options.upsert => {
                // Seed the new record from the filter's equality conditions.
                let mut record = Bag::new();
                for (key, condition) in filter {
                    let is_operator = condition
                        .as_map()
                        .is_some_and(|m| m.keys().any(|k| k.starts_with('$')));
                    if !is_operator {
                        record.insert(key.clone(), condition.clone());
                    }
                }
                apply_ops(&mut record, ops)?;
                if !record.contains_key("_id") {
                    record.insert(
                        "_id".to_string(),
                        MemoryDriver::assign_id(&self.next_id),
                    );
                }
                records.push(record.clone());
                Ok(options.return_new.then_some(record))
            }
            None => Ok(None),
        }
    }

    fn aggregate(&self, pipeline: &[Bag]) -> Result<Vec<Bag>, DriverError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        let mut current: Vec<Bag> = records.clone();
        drop(records);

        for stage in pipeline {
            let (name, spec) = match stage.iter().next() {
                Some((name, spec)) if stage.len() == 1 => (name.as_str(), spec),
                _ => {
                    return Err(DriverError::new(
                        "a pipeline stage specification must contain exactly one field",
                        40323,
                    ))
                }
            };
            match name {
                "$match" => {
                    let filter = spec.as_map().ok_or_else(|| {
                        DriverError::new("$match expects a document", 15959)
                    })?;
                    current.retain(|r| matches_filter(r, filter));
                }
                "$group" => {
                    let spec = spec.as_map().ok_or_else(|| {
                        DriverError::new("$group expects a document", 15947)
                    })?;
                    current = group_stage(&current, spec)?;
                }
                other => {
                    return Err(DriverError::new(
                        format!("unrecognized pipeline stage name: '{}'", other),
                        40324,
                    ))
                }
            }
        }
        Ok(current)
    }

    fn distinct(&self, field: &str, filter: &Bag) -> Result<Vec<Value>, DriverError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        let mut out: Vec<Value> = Vec::new();
        for record in records.iter().filter(|r| matches_filter(r, filter)) {
            if let Some(value) = lookup(record, field) {
                if !out.contains(value) {
                    out.push(value.clone());
                }
            }
        }
        Ok(out)
    }

    fn drop_collection(&self) -> Result<(), DriverError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records.clear();
        Ok(())
    }
}

/// Resolves a `"$field"` path expression against a record; any other value
/// is a literal.
fn resolve_expr<'a>(record: &'a Bag, expr: &'a Value) -> Option<&'a Value> {
    match expr.as_str() {
        Some(path) if path.starts_with('$') => lookup(record, &path[1..]),
        _ => Some(expr),
    }
}

fn group_stage(records: &[Bag], spec: &Bag) -> Result<Vec<Bag>, DriverError> {
    let id_expr = spec
        .get("_id")
        .ok_or_else(|| DriverError::new("a group specification must include an _id", 15955))?;

    // Group records by the bucket key's canonical string form.
    let mut buckets: Vec<(Value, Vec<&Bag>)> = Vec::new();
    for record in records {
        let key = resolve_expr(record, id_expr).cloned().unwrap_or(Value::Null);
        match buckets.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(record),
            None => buckets.push((key, vec![record])),
        }
    }

    let mut out = Vec::new();
    for (key, members) in buckets {
        let mut row = Bag::new();
        row.insert("_id".to_string(), key);
        for (field, acc) in spec.iter().filter(|(f, _)| *f != "_id") {
            let acc = acc.as_map().filter(|m| m.len() == 1).ok_or_else(|| {
                DriverError::new(
                    format!("the field '{}' must specify one accumulator", field),
                    40238,
                )
            })?;
            let (op, expr) = acc.iter().next().ok_or_else(|| {
                DriverError::new("empty accumulator specification", 40238)
            })?;
            let values: Vec<&Value> = members
                .iter()
                .filter_map(|r| resolve_expr(r, expr))
                .collect();
            let result = match op.as_str() {
                "$max" => values
                    .iter()
                    .copied()
                    .max_by(|a, b| cmp_values(a, b))
                    .cloned()
                    .unwrap_or(Value::Null),
                "$min" => values
                    .iter()
                    .copied()
                    .min_by(|a, b| cmp_values(a, b))
                    .cloned()
                    .unwrap_or(Value::Null),
                "$sum" => {
                    let mut total = 0_i64;
                    for v in &values {
                        total += v.as_i64().unwrap_or(0);
                    }
                    Value::Int(total)
                }
                other => {
                    return Err(DriverError::new(
                        format!("unknown group operator '{}'", other),
                        15952,
                    ))
                }
            };
            row.insert(field.clone(), result);
        }
        out.push(row);
    }
    Ok(out)
}

struct MemoryGrid {
    files: RwLock<Vec<GridFile>>,
    next_id: Arc<AtomicU64>,
}

impl GridHandle for MemoryGrid {
    fn store(&self, mut record: Bag, bytes: &[u8]) -> Result<Value, DriverError> {
        let engine = base64::engine::general_purpose::STANDARD;
        let chunks: Vec<String> = bytes
            .chunks(GRID_CHUNK_SIZE)
            .map(|c| engine.encode(c))
            .collect();

        let id = MemoryDriver::assign_id(&self.next_id);
        record.insert("_id".to_string(), id.clone());
        record.insert("length".to_string(), Value::Int(bytes.len() as i64));

        let mut files = self.files.write().map_err(|_| poisoned())?;
        files.push(GridFile::new(record, chunks));
        Ok(id)
    }

    fn find_one(&self, filter: &Bag) -> Result<Option<GridFile>, DriverError> {
        let files = self.files.read().map_err(|_| poisoned())?;
        Ok(files
            .iter()
            .find(|f| matches_filter(&f.record, filter))
            .cloned())
    }

    fn remove(&self, filter: &Bag) -> Result<u64, DriverError> {
        let mut files = self.files.write().map_err(|_| poisoned())?;
        let before = files.len();
        files.retain(|f| !matches_filter(&f.record, filter));
        Ok((before - files.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag;

    fn seeded() -> Arc<dyn CollectionHandle> {
        let driver = MemoryDriver::new();
        let posts = driver.collection("posts");
        posts.save(bag! { "id" => 1, "status" => "draft", "score" => 3 }).unwrap();
        posts.save(bag! { "id" => 2, "status" => "published", "score" => 9 }).unwrap();
        posts.save(bag! { "id" => 3, "status" => "published", "score" => 5 }).unwrap();
        posts
    }

    #[test]
    fn equality_and_in_filters() {
        let posts = seeded();
        assert_eq!(posts.count(&bag! { "status" => "published" }).unwrap(), 2);

        let filter = bag! {
            "status" => Value::Map(bag! {
                "$in" => vec![Value::String("draft".into()), Value::String("published".into())]
            })
        };
        assert_eq!(posts.count(&filter).unwrap(), 3);
    }

    #[test]
    fn sort_skip_limit() {
        let posts = seeded();
        let options = FindOptions {
            sort: vec![("score".to_string(), -1)],
            skip: Some(1),
            limit: Some(1),
            ..FindOptions::default()
        };
        let found = posts.find(&Bag::new(), &options).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get("score"), Some(&Value::Int(5)));
    }

    #[test]
    fn projection_keeps_id() {
        let posts = seeded();
        let options = FindOptions {
            projection: vec!["status".to_string()],
            ..FindOptions::default()
        };
        let found = posts.find(&bag! { "id" => 1 }, &options).unwrap();
        assert!(found[0].contains_key("_id"));
        assert!(found[0].contains_key("status"));
        assert!(!found[0].contains_key("score"));
    }

    #[test]
    fn save_assigns_and_reuses_ids() {
        let driver = MemoryDriver::new();
        let posts = driver.collection("posts");
        let id = posts.save(bag! { "n" => 1 }).unwrap();

        let mut record = posts.find_one(&bag! { "n" => 1 }).unwrap().unwrap();
        record.insert("n".to_string(), Value::Int(2));
        let same = posts.save(record).unwrap();
        assert_eq!(id, same);
        assert_eq!(posts.count(&Bag::new()).unwrap(), 1);
    }

    #[test]
    fn update_applies_operators_to_all_matches() {
        let posts = seeded();
        let ops = bag! {
            "$set" => Value::Map(bag! { "archived" => true }),
            "$unset" => Value::Map(bag! { "score" => 1 }),
        };
        let touched = posts.update(&bag! { "status" => "published" }, &ops).unwrap();
        assert_eq!(touched, 2);

        let archived = posts.find(&bag! { "archived" => true }, &FindOptions::default()).unwrap();
        assert_eq!(archived.len(), 2);
        assert!(archived.iter().all(|r| !r.contains_key("score")));
    }

    #[test]
    fn find_and_modify_upserts_and_increments() {
        let driver = MemoryDriver::new();
        let sequences = driver.collection("sequences");
        let ops = bag! { "$inc" => Value::Map(bag! { "seq" => 1 }) };
        let options = ModifyOptions {
            upsert: true,
            return_new: true,
        };

        let first = sequences
            .find_and_modify(&bag! { "_id" => "posts" }, &ops, &[], options)
            .unwrap()
            .unwrap();
        assert_eq!(first.get("seq"), Some(&Value::Int(1)));

        let second = sequences
            .find_and_modify(&bag! { "_id" => "posts" }, &ops, &[], options)
            .unwrap()
            .unwrap();
        assert_eq!(second.get("seq"), Some(&Value::Int(2)));
        assert_eq!(sequences.count(&Bag::new()).unwrap(), 1);
    }

    #[test]
    fn aggregate_group_max() {
        let posts = seeded();
        let pipeline = vec![
            bag! { "$match" => Value::Map(bag! { "status" => "published" }) },
            bag! { "$group" => Value::Map(bag! {
                "_id" => Value::Null,
                "max" => Value::Map(bag! { "$max" => "$score" }),
            }) },
        ];
        let rows = posts.aggregate(&pipeline).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("max"), Some(&Value::Int(9)));
    }

    #[test]
    fn aggregate_rejects_unknown_stage() {
        let posts = seeded();
        let err = posts
            .aggregate(&[bag! { "$facet" => Value::Map(Bag::new()) }])
            .unwrap_err();
        assert_eq!(err.code, 40324);
    }

    #[test]
    fn distinct_dedupes() {
        let posts = seeded();
        let statuses = posts.distinct("status", &Bag::new()).unwrap();
        assert_eq!(statuses.len(), 2);
    }

    #[test]
    fn grid_round_trips_bytes() {
        let driver = MemoryDriver::new();
        let grid = driver.grid("uploads");
        let payload = vec![7_u8; GRID_CHUNK_SIZE + 10];
        grid.store(bag! { "filename" => "blob.bin" }, &payload).unwrap();

        let file = grid
            .find_one(&bag! { "filename" => "blob.bin" })
            .unwrap()
            .unwrap();
        assert_eq!(file.bytes().unwrap(), payload);
        assert_eq!(file.record.get("length"), Some(&Value::Int(payload.len() as i64)));
    }
}
