//! Driver - The store driver seam.
//!
//! The mapper's boundary is a document-store driver exposing collection
//! handles with find/count/save/update/remove/findAndModify/aggregate/
//! distinct/drop, plus a grid handle for large-object storage. The traits
//! here are that boundary; [`MemoryDriver`] is the in-tree implementation
//! used for tests and development.

mod memory;

pub use memory::MemoryDriver;

use std::fmt;
use std::sync::Arc;

use crate::value::{Bag, Value};

/// Backend-level failure, carrying the backend message and code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    pub message: String,
    pub code: i32,
}

impl DriverError {
    pub fn new(message: impl Into<String>, code: i32) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for DriverError {}

/// Options for a find dispatch. Skip/limit are applied only when present;
/// the mapper has already dropped non-positive values by this point.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Field names to project; empty means the full record.
    pub projection: Vec<String>,
    /// (field, direction) pairs; negative direction sorts descending.
    pub sort: Vec<(String, i32)>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

/// Options for a findAndModify dispatch.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModifyOptions {
    /// Insert the document when the filter matches nothing.
    pub upsert: bool,
    /// Return the record as it is after the modification instead of before.
    pub return_new: bool,
}

/// A queryable collection handle.
pub trait CollectionHandle: Send + Sync {
    fn find(&self, filter: &Bag, options: &FindOptions) -> Result<Vec<Bag>, DriverError>;

    fn find_one(&self, filter: &Bag) -> Result<Option<Bag>, DriverError>;

    fn count(&self, filter: &Bag) -> Result<u64, DriverError>;

    /// Upserts by `_id` when the record carries one, else inserts and
    /// assigns an id. Returns the record's id either way.
    fn save(&self, record: Bag) -> Result<Value, DriverError>;

    fn update(&self, filter: &Bag, ops: &Bag) -> Result<u64, DriverError>;

    fn remove(&self, filter: &Bag) -> Result<u64, DriverError>;

    fn find_and_modify(
        &self,
        filter: &Bag,
        ops: &Bag,
        sort: &[(String, i32)],
        options: ModifyOptions,
    ) -> Result<Option<Bag>, DriverError>;

    fn aggregate(&self, pipeline: &[Bag]) -> Result<Vec<Bag>, DriverError>;

    fn distinct(&self, field: &str, filter: &Bag) -> Result<Vec<Value>, DriverError>;

    fn drop_collection(&self) -> Result<(), DriverError>;
}

/// A stored large object: the logical record plus its payload handle.
#[derive(Debug, Clone)]
pub struct GridFile {
    /// The logical file's stored fields (filename, length, metadata).
    pub record: Bag,
    /// Base64-encoded payload chunks.
    chunks: Vec<String>,
}

impl GridFile {
    pub fn new(record: Bag, chunks: Vec<String>) -> Self {
        Self { record, chunks }
    }

    /// Decodes and concatenates the payload chunks.
    pub fn bytes(&self) -> Result<Vec<u8>, DriverError> {
        use base64::Engine as _;

        let engine = base64::engine::general_purpose::STANDARD;
        let mut out = Vec::new();
        for chunk in &self.chunks {
            let decoded = engine
                .decode(chunk)
                .map_err(|e| DriverError::new(format!("corrupt grid chunk: {}", e), 17))?;
            out.extend_from_slice(&decoded);
        }
        Ok(out)
    }
}

/// A large-object storage handle (GridFS-like).
pub trait GridHandle: Send + Sync {
    /// Stores a payload with its logical record; returns the assigned id.
    fn store(&self, record: Bag, bytes: &[u8]) -> Result<Value, DriverError>;

    fn find_one(&self, filter: &Bag) -> Result<Option<GridFile>, DriverError>;

    fn remove(&self, filter: &Bag) -> Result<u64, DriverError>;
}

/// A connected store driver handing out collection and grid handles.
pub trait Driver: Send + Sync {
    fn collection(&self, name: &str) -> Arc<dyn CollectionHandle>;

    fn grid(&self, name: &str) -> Arc<dyn GridHandle>;
}
