#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use docmap::{
    Bag, Collection, CollectionHandle, Connection, Document, Driver, DriverError, FindOptions,
    GridHandle, MemoryDriver, Model, ModifyOptions, MongoConfig, MongoResource, UpdatedHook,
    Value,
};

#[derive(Clone, Debug)]
pub struct Author;

impl Model for Author {}

impl Collection for Author {
    const COLLECTION: &'static str = "authors";
}

#[derive(Clone, Debug)]
pub struct Post;

impl Model for Post {
    fn translated_fields() -> &'static [&'static str] {
        &["title"]
    }
}

fn on_status_updated(doc: &mut Document<Post>, old_values: &[Value]) {
    let runs = doc
        .get("status_hook_runs")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    doc.set("status_hook_runs", runs + 1);
    doc.set("status_was", Value::Array(old_values.to_vec()));
}

impl Collection for Post {
    const COLLECTION: &'static str = "posts";

    fn updated_hooks() -> &'static [(&'static str, UpdatedHook<Self>)] {
        &[("status", on_status_updated)]
    }
}

#[derive(Debug)]
pub struct Attachment;

impl Model for Attachment {}

/// Embedded schema with no collection of its own.
pub struct Byline;

impl Model for Byline {}

impl Collection for Attachment {
    const COLLECTION: &'static str = "attachments";
}

/// Connection backed by a plain in-memory driver.
pub fn connect() -> Arc<Connection> {
    MongoResource::new(MongoConfig::with_database("app"))
        .connection()
        .unwrap()
}

pub fn connect_with_config(config: MongoConfig) -> Arc<Connection> {
    MongoResource::new(config).connection().unwrap()
}

/// Connection whose driver counts find dispatches, for asserting batch
/// behavior.
pub fn connect_counting() -> (Arc<Connection>, Arc<AtomicUsize>) {
    let finds = Arc::new(AtomicUsize::new(0));
    let driver = CountingDriver {
        inner: MemoryDriver::new(),
        finds: Arc::clone(&finds),
    };
    let conn = MongoResource::with_factory(MongoConfig::with_database("app"), move |_| {
        Ok(Arc::new(driver.clone()))
    })
    .connection()
    .unwrap();
    (conn, finds)
}

#[derive(Clone)]
pub struct CountingDriver {
    inner: MemoryDriver,
    finds: Arc<AtomicUsize>,
}

impl Driver for CountingDriver {
    fn collection(&self, name: &str) -> Arc<dyn CollectionHandle> {
        Arc::new(CountingCollection {
            inner: self.inner.collection(name),
            finds: Arc::clone(&self.finds),
        })
    }

    fn grid(&self, name: &str) -> Arc<dyn GridHandle> {
        self.inner.grid(name)
    }
}

struct CountingCollection {
    inner: Arc<dyn CollectionHandle>,
    finds: Arc<AtomicUsize>,
}

impl CollectionHandle for CountingCollection {
    fn find(&self, filter: &Bag, options: &FindOptions) -> Result<Vec<Bag>, DriverError> {
        self.finds.fetch_add(1, Ordering::Relaxed);
        self.inner.find(filter, options)
    }

    fn find_one(&self, filter: &Bag) -> Result<Option<Bag>, DriverError> {
        self.finds.fetch_add(1, Ordering::Relaxed);
        self.inner.find_one(filter)
    }

    fn count(&self, filter: &Bag) -> Result<u64, DriverError> {
        self.inner.count(filter)
    }

    fn save(&self, record: Bag) -> Result<Value, DriverError> {
        self.inner.save(record)
    }

    fn update(&self, filter: &Bag, ops: &Bag) -> Result<u64, DriverError> {
        self.inner.update(filter, ops)
    }

    fn remove(&self, filter: &Bag) -> Result<u64, DriverError> {
        self.inner.remove(filter)
    }

    fn find_and_modify(
        &self,
        filter: &Bag,
        ops: &Bag,
        sort: &[(String, i32)],
        options: ModifyOptions,
    ) -> Result<Option<Bag>, DriverError> {
        self.inner.find_and_modify(filter, ops, sort, options)
    }

    fn aggregate(&self, pipeline: &[Bag]) -> Result<Vec<Bag>, DriverError> {
        self.inner.aggregate(pipeline)
    }

    fn distinct(&self, field: &str, filter: &Bag) -> Result<Vec<Value>, DriverError> {
        self.inner.distinct(field, filter)
    }

    fn drop_collection(&self) -> Result<(), DriverError> {
        self.inner.drop_collection()
    }
}
