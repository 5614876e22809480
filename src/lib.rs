mod base;
mod cache;
mod connection;
mod document;
mod driver;
mod error;
mod file;
mod paginator;
mod subdocument;
mod value;

pub use base::{Attributes, Getter, Model, Setter, Status};
pub use cache::{IdentityCache, RefCache};
pub use connection::{ClassEntry, Connection, MongoConfig, MongoResource};
pub use document::{
    normalize_query, sort_direction, Collection, Command, DistinctValue, Document,
    DocumentRepository, DocumentsExt, FindArgs, Gettable, UpdatedHook, SEQUENCE_COLLECTION,
};
pub use driver::{
    CollectionHandle, Driver, DriverError, FindOptions, GridFile, GridHandle, MemoryDriver,
    ModifyOptions,
};
pub use error::OdmError;
pub use file::{FileDocument, FileRepository, FilesExt, StorageKind};
pub use paginator::Paginator;
pub use subdocument::Subdocument;
pub use value::{Bag, MongoDate, Reference, Value};
