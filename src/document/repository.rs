//! DocumentRepository - Typed accessor for find/count/save/delete and the
//! forwarded storage commands of one collection.

use std::marker::PhantomData;
use std::sync::Arc;

use super::query::{normalize_query, sort_direction, FindArgs};
use super::{Collection, Document};
use crate::connection::Connection;
use crate::driver::{CollectionHandle, FindOptions, ModifyOptions};
use crate::error::OdmError;
use crate::value::{Bag, Reference, Value};

/// The shared collection holding per-collection sequence counters for
/// [`DocumentRepository::next_id`].
pub const SEQUENCE_COLLECTION: &str = "sequences";

/// Typed repository for documents of a specific collection class.
pub struct DocumentRepository<'a, C: Collection> {
    conn: &'a Connection,
    handle: Arc<dyn CollectionHandle>,
    _marker: PhantomData<C>,
}

/// Extension trait for typed document access on a connection.
pub trait DocumentsExt {
    /// Returns the typed repository for `C`, registering the class so
    /// references to its collection resolve.
    fn documents<C: Collection>(&self) -> Result<DocumentRepository<'_, C>, OdmError>;
}

impl DocumentsExt for Connection {
    fn documents<C: Collection>(&self) -> Result<DocumentRepository<'_, C>, OdmError> {
        if C::COLLECTION.is_empty() {
            return Err(OdmError::Configuration(format!(
                "please specify the collection name of {}",
                std::any::type_name::<C>()
            )));
        }
        self.register::<C>();
        Ok(DocumentRepository {
            conn: self,
            handle: self.driver().collection(C::COLLECTION),
            _marker: PhantomData,
        })
    }
}

/// Trait for values usable as `get()` arguments: a single id yields an
/// optional document, a sequence of ids yields the batch.
pub trait Gettable<C: Collection> {
    type Output;
    fn get_from(&self, repo: &DocumentRepository<'_, C>, field: &str)
        -> Result<Self::Output, OdmError>;
}

impl<C: Collection> Gettable<C> for Value {
    type Output = Option<Arc<Document<C>>>;

    fn get_from(
        &self,
        repo: &DocumentRepository<'_, C>,
        field: &str,
    ) -> Result<Self::Output, OdmError> {
        repo.get_one(self, field)
    }
}

impl<C: Collection> Gettable<C> for i64 {
    type Output = Option<Arc<Document<C>>>;

    fn get_from(
        &self,
        repo: &DocumentRepository<'_, C>,
        field: &str,
    ) -> Result<Self::Output, OdmError> {
        repo.get_one(&Value::Int(*self), field)
    }
}

impl<C: Collection> Gettable<C> for &str {
    type Output = Option<Arc<Document<C>>>;

    fn get_from(
        &self,
        repo: &DocumentRepository<'_, C>,
        field: &str,
    ) -> Result<Self::Output, OdmError> {
        repo.get_one(&Value::String((*self).to_string()), field)
    }
}

impl<C: Collection> Gettable<C> for &[Value] {
    type Output = Vec<Arc<Document<C>>>;

    fn get_from(
        &self,
        repo: &DocumentRepository<'_, C>,
        field: &str,
    ) -> Result<Self::Output, OdmError> {
        repo.get_many(self, field)
    }
}

impl<C: Collection> Gettable<C> for Vec<Value> {
    type Output = Vec<Arc<Document<C>>>;

    fn get_from(
        &self,
        repo: &DocumentRepository<'_, C>,
        field: &str,
    ) -> Result<Self::Output, OdmError> {
        repo.get_many(self.as_slice(), field)
    }
}

impl<C: Collection, const N: usize> Gettable<C> for [Value; N] {
    type Output = Vec<Arc<Document<C>>>;

    fn get_from(
        &self,
        repo: &DocumentRepository<'_, C>,
        field: &str,
    ) -> Result<Self::Output, OdmError> {
        repo.get_many(self.as_slice(), field)
    }
}

/// One result of a resolved distinct: either a materialized document (the
/// stored value was a reference descriptor) or a plain value.
#[derive(Debug, Clone)]
pub enum DistinctValue<T: Collection> {
    Document(Arc<Document<T>>),
    Plain(Value),
}

/// The fixed allow-list of forwarded storage commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    FindOne,
    FindAndModify,
    Remove,
    Drop,
    Aggregate,
    Distinct,
}

impl Command {
    /// Parses a forwarded command name; anything outside the allow-list is
    /// an [`OdmError::UnknownCommand`].
    pub fn parse(name: &str) -> Result<Self, OdmError> {
        match name {
            "findOne" => Ok(Command::FindOne),
            "findAndModify" => Ok(Command::FindAndModify),
            "remove" => Ok(Command::Remove),
            "drop" => Ok(Command::Drop),
            "aggregate" => Ok(Command::Aggregate),
            "distinct" => Ok(Command::Distinct),
            other => Err(OdmError::UnknownCommand(other.to_string())),
        }
    }
}

impl<'a, C: Collection> DocumentRepository<'a, C> {
    fn cache_key(field: &str, id: &Value) -> String {
        format!("{}:{}", field, id.key_string())
    }

    /// Get one or more documents by id(s) on the identifier field.
    pub fn get<G: Gettable<C>>(&self, gettable: G) -> Result<G::Output, OdmError> {
        gettable.get_from(self, C::ID_FIELD)
    }

    /// Get one or more documents by id(s) on an alternate field.
    pub fn get_by<G: Gettable<C>>(&self, field: &str, gettable: G) -> Result<G::Output, OdmError> {
        gettable.get_from(self, field)
    }

    fn get_one(&self, id: &Value, field: &str) -> Result<Option<Arc<Document<C>>>, OdmError> {
        let key = Self::cache_key(field, id);
        if let Some(hit) = self.conn.identity.get::<Document<C>>(C::COLLECTION, &key) {
            tracing::debug!(collection = C::COLLECTION, id = %id, "identity cache hit");
            return Ok(Some(hit));
        }

        let mut filter = Bag::new();
        filter.insert(field.to_string(), id.clone());
        let record = self.handle.find_one(&filter).map_err(OdmError::from)?;

        // Misses are not cached.
        Ok(record.map(|r| {
            let doc = Arc::new(self.conn.hydrate::<C>(r));
            self.conn
                .identity
                .put(C::COLLECTION, key, Arc::clone(&doc));
            doc
        }))
    }

    fn get_many(&self, ids: &[Value], field: &str) -> Result<Vec<Arc<Document<C>>>, OdmError> {
        let uncached: Vec<Value> = ids
            .iter()
            .filter(|id| {
                !self
                    .conn
                    .identity
                    .contains(C::COLLECTION, &Self::cache_key(field, id))
            })
            .cloned()
            .collect();

        if !uncached.is_empty() {
            let mut in_clause = Bag::new();
            in_clause.insert("$in".to_string(), Value::Array(uncached));
            let mut filter = Bag::new();
            filter.insert(field.to_string(), Value::Map(in_clause));

            let records = self
                .handle
                .find(&filter, &FindOptions::default())
                .map_err(OdmError::from)?;
            for record in records {
                let doc = Arc::new(self.conn.hydrate::<C>(record));
                if let Some(id) = doc.raw(field) {
                    let key = Self::cache_key(field, id);
                    self.conn.identity.put(C::COLLECTION, key, Arc::clone(&doc));
                }
            }
        }

        Ok(ids
            .iter()
            .filter_map(|id| {
                self.conn
                    .identity
                    .get::<Document<C>>(C::COLLECTION, &Self::cache_key(field, id))
            })
            .collect())
    }

    /// Finds documents matching the (normalized) query.
    pub fn find(&self, args: &FindArgs) -> Result<Vec<Document<C>>, OdmError> {
        let filter = normalize_query(&args.query, C::ID_FIELD);
        let options = FindOptions {
            projection: args.fields.clone(),
            sort: args
                .sort
                .iter()
                .map(|(field, dir)| (field.clone(), sort_direction(dir)))
                .collect(),
            skip: args.offset.filter(|n| *n > 0).map(|n| n as u64),
            limit: args.limit.filter(|n| *n > 0).map(|n| n as u64),
        };

        let records = self.handle.find(&filter, &options).map_err(OdmError::from)?;
        Ok(records
            .into_iter()
            .map(|r| self.conn.hydrate::<C>(r))
            .collect())
    }

    /// Counts documents matching the (normalized) query, without
    /// materializing them.
    pub fn count(&self, query: &Bag) -> Result<u64, OdmError> {
        let filter = normalize_query(query, C::ID_FIELD);
        self.handle.count(&filter).map_err(OdmError::from)
    }

    /// Two-phase paginated find: count first, inform the paginator (which
    /// may clamp the requested page to the last valid one), recompute the
    /// offset, and only then execute the find.
    pub fn find_paginated(
        &self,
        paginator: &mut crate::paginator::Paginator,
        args: &FindArgs,
    ) -> Result<Vec<Document<C>>, OdmError> {
        let total = self.count(&args.query)?;
        paginator.set_total(total);

        let mut args = args.clone();
        args.offset = Some(paginator.offset() as i64);
        args.limit = Some(paginator.limit() as i64);
        self.find(&args)
    }

    /// Persists the document: upsert by identifier when present, insert
    /// (capturing the new identifier) otherwise.
    ///
    /// Null-valued attributes are stripped from the write payload; null
    /// means "absent", not "explicit null". Afterwards the identity-cache
    /// entry for this document and the reference-cache entries keyed by its
    /// identifier are cleared, and the per-field updated hooks run for
    /// every changed field.
    pub fn save(&self, doc: &mut Document<C>) -> Result<(), OdmError> {
        if !C::PERSISTABLE {
            return Err(OdmError::NotPersistable(C::COLLECTION));
        }

        let mut payload: Bag = doc
            .to_bag()
            .into_iter()
            .filter(|(_, value)| !value.is_null())
            .collect();
        if let Some(id) = doc.id() {
            payload.insert("_id".to_string(), id.clone());
        }

        let id = self.handle.save(payload).map_err(OdmError::from)?;
        doc.set_id(id.clone());
        tracing::debug!(collection = C::COLLECTION, id = %id, "document saved");

        // The in-memory copy may now be stale or duplicated elsewhere:
        // force the next get() to refetch, and drop resolved references
        // keyed by this identifier.
        if let Some(app_id) = doc.raw(C::ID_FIELD) {
            self.conn
                .identity
                .remove(C::COLLECTION, &Self::cache_key(C::ID_FIELD, app_id));
        }
        self.conn.refs.delete(&id.key_string());

        let changes = doc.take_changes();
        for (field, hook) in C::updated_hooks() {
            if let Some(old_values) = changes.get(*field) {
                hook(doc, old_values);
            }
        }
        Ok(())
    }

    /// Removes the single storage record matching this document's
    /// identifier. An unsaved instance is a no-op returning `false`.
    pub fn delete(&self, doc: &Document<C>) -> Result<bool, OdmError> {
        let id = match doc.id() {
            Some(id) => id.clone(),
            None => return Ok(false),
        };
        let mut filter = Bag::new();
        filter.insert("_id".to_string(), id);
        let removed = self.handle.remove(&filter).map_err(OdmError::from)?;
        Ok(removed > 0)
    }

    /// Returns the document's reference descriptor, implicitly saving it
    /// first when it has no identifier yet (a deliberate convenience).
    pub fn reference(&self, doc: &mut Document<C>) -> Result<Reference, OdmError> {
        if doc.id().is_none() {
            self.save(doc)?;
        }
        doc.to_reference()
    }

    /// Finds a single record and hydrates it.
    pub fn find_one(&self, query: &Bag) -> Result<Option<Document<C>>, OdmError> {
        let record = self.handle.find_one(query).map_err(OdmError::from)?;
        Ok(record.map(|r| self.conn.hydrate::<C>(r)))
    }

    /// Atomic find-and-modify; returns the raw record per the options.
    pub fn find_and_modify(
        &self,
        query: &Bag,
        ops: &Bag,
        sort: &[(String, i32)],
        options: ModifyOptions,
    ) -> Result<Option<Bag>, OdmError> {
        self.handle
            .find_and_modify(query, ops, sort, options)
            .map_err(OdmError::from)
    }

    /// Removes all records matching the query; returns the removed count.
    pub fn remove(&self, query: &Bag) -> Result<u64, OdmError> {
        self.handle.remove(query).map_err(OdmError::from)
    }

    pub fn drop_collection(&self) -> Result<(), OdmError> {
        self.handle.drop_collection().map_err(OdmError::from)
    }

    /// Runs an aggregation pipeline. A non-success backend status surfaces
    /// as [`OdmError::Operation`] with the backend message and code.
    pub fn aggregate(&self, pipeline: &[Bag]) -> Result<Vec<Bag>, OdmError> {
        self.handle.aggregate(pipeline).map_err(OdmError::from)
    }

    /// Distinct values of a field among records matching the query.
    pub fn distinct(&self, field: &str, query: &Bag) -> Result<Vec<Value>, OdmError> {
        self.handle.distinct(field, query).map_err(OdmError::from)
    }

    /// Distinct values with reference descriptors batch-resolved into
    /// documents of the referenced class `T`, merged with the plain
    /// values.
    pub fn distinct_resolved<T: Collection>(
        &self,
        field: &str,
        query: &Bag,
    ) -> Result<Vec<DistinctValue<T>>, OdmError> {
        let values = self.distinct(field, query)?;
        let mut references = Vec::new();
        let mut plain = Vec::new();
        for value in values {
            match value {
                Value::Reference(r) => references.push(r),
                other => plain.push(other),
            }
        }

        let mut out: Vec<DistinctValue<T>> = self
            .conn
            .get_objects::<T>(&references)?
            .into_iter()
            .map(DistinctValue::Document)
            .collect();
        out.extend(plain.into_iter().map(DistinctValue::Plain));
        Ok(out)
    }

    /// Dynamic dispatch for the forwarded command allow-list. The payload
    /// carries the command's arguments under conventional keys (`query`,
    /// `update`, `sort`, `field`, `pipeline`, `upsert`, `new`).
    pub fn forward(&self, name: &str, payload: &Bag) -> Result<Value, OdmError> {
        let query = payload
            .get("query")
            .and_then(Value::as_map)
            .cloned()
            .unwrap_or_default();

        match Command::parse(name)? {
            Command::FindOne => Ok(match self.find_one(&query)? {
                Some(doc) => {
                    let mut bag = doc.to_bag();
                    if let Some(id) = doc.id() {
                        bag.insert("_id".to_string(), id.clone());
                    }
                    Value::Map(bag)
                }
                None => Value::Null,
            }),
            Command::FindAndModify => {
                let ops = payload
                    .get("update")
                    .and_then(Value::as_map)
                    .cloned()
                    .unwrap_or_default();
                let sort: Vec<(String, i32)> = payload
                    .get("sort")
                    .and_then(Value::as_map)
                    .map(|m| {
                        m.iter()
                            .map(|(f, d)| (f.clone(), sort_direction(d)))
                            .collect()
                    })
                    .unwrap_or_default();
                let options = ModifyOptions {
                    upsert: payload.get("upsert").and_then(Value::as_bool).unwrap_or(false),
                    return_new: payload.get("new").and_then(Value::as_bool).unwrap_or(false),
                };
                Ok(self
                    .find_and_modify(&query, &ops, &sort, options)?
                    .map(Value::Map)
                    .unwrap_or(Value::Null))
            }
            Command::Remove => Ok(Value::Int(self.remove(&query)? as i64)),
            Command::Drop => {
                self.drop_collection()?;
                Ok(Value::Null)
            }
            Command::Aggregate => {
                let pipeline: Vec<Bag> = payload
                    .get("pipeline")
                    .and_then(Value::as_array)
                    .map(|stages| {
                        stages
                            .iter()
                            .filter_map(|s| s.as_map().cloned())
                            .collect()
                    })
                    .unwrap_or_default();
                let rows = self.aggregate(&pipeline)?;
                Ok(Value::Array(rows.into_iter().map(Value::Map).collect()))
            }
            Command::Distinct => {
                let field = payload
                    .get("field")
                    .and_then(Value::as_str)
                    .unwrap_or(C::ID_FIELD);
                Ok(Value::Array(self.distinct(field, &query)?))
            }
        }
    }

    /// Maximum value of a field across documents matching the filter,
    /// computed with an aggregation pipeline. `None` when nothing matches.
    pub fn maximum(&self, field: &str, filter: Option<&Bag>) -> Result<Option<Value>, OdmError> {
        let mut pipeline = Vec::new();
        if let Some(filter) = filter {
            let mut stage = Bag::new();
            stage.insert(
                "$match".to_string(),
                Value::Map(normalize_query(filter, C::ID_FIELD)),
            );
            pipeline.push(stage);
        }

        let mut acc = Bag::new();
        acc.insert("$max".to_string(), Value::String(format!("${}", field)));
        let mut group = Bag::new();
        group.insert("_id".to_string(), Value::Null);
        group.insert("max".to_string(), Value::Map(acc));
        let mut stage = Bag::new();
        stage.insert("$group".to_string(), Value::Map(group));
        pipeline.push(stage);

        let rows = self.aggregate(&pipeline)?;
        Ok(rows
            .first()
            .and_then(|row| row.get("max"))
            .filter(|v| !v.is_null())
            .cloned())
    }

    /// Atomically increments and returns this collection's sequence
    /// counter, upserting it on first use.
    pub fn next_id(&self) -> Result<i64, OdmError> {
        let sequences = self.conn.driver().collection(SEQUENCE_COLLECTION);

        let mut filter = Bag::new();
        filter.insert("_id".to_string(), Value::String(C::COLLECTION.to_string()));
        let mut step = Bag::new();
        step.insert("seq".to_string(), Value::Int(1));
        let mut ops = Bag::new();
        ops.insert("$inc".to_string(), Value::Map(step));

        let record = sequences
            .find_and_modify(
                &filter,
                &ops,
                &[],
                ModifyOptions {
                    upsert: true,
                    return_new: true,
                },
            )
            .map_err(OdmError::from)?;

        record
            .as_ref()
            .and_then(|r| r.get("seq"))
            .and_then(Value::as_i64)
            .ok_or_else(|| OdmError::Operation {
                message: format!("sequence counter for '{}' is corrupt", C::COLLECTION),
                code: 0,
            })
    }
}
