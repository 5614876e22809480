//! File-backed documents - Collections whose payload lives either in
//! large-object (grid) storage or on a local filesystem path.
//!
//! The backend is selected by configuration: a collection with a `storage`
//! path in the connection options keeps payloads on disk, anything else
//! goes through the driver's grid storage. Calling code reads bytes the
//! same way for both.

use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

use crate::connection::Connection;
use crate::document::{Collection, Document, DocumentsExt};
use crate::driver::{GridFile, GridHandle};
use crate::error::OdmError;
use crate::value::Bag;

/// Which backend holds a file collection's payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Filesystem,
    Grid,
}

/// A document of a file-backed collection, optionally carrying the grid
/// handle its payload came with.
#[derive(Debug, Clone)]
pub struct FileDocument<C: Collection> {
    doc: Document<C>,
    handle: Option<GridFile>,
}

impl<C: Collection> FileDocument<C> {
    /// Hydrates from a grid record: the logical file's stored fields become
    /// the document, the record itself stays attached as the byte handle.
    pub fn from_grid(file: GridFile) -> Self {
        Self {
            doc: Document::map(file.record.clone()),
            handle: Some(file),
        }
    }

    pub fn from_document(doc: Document<C>) -> Self {
        Self { doc, handle: None }
    }

    pub fn document(&self) -> &Document<C> {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut Document<C> {
        &mut self.doc
    }

    pub fn handle(&self) -> Option<&GridFile> {
        self.handle.as_ref()
    }

    fn filename(&self) -> Result<String, OdmError> {
        self.doc
            .get("filename")
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| {
                OdmError::Configuration(format!(
                    "file document of '{}' has no filename entry",
                    C::COLLECTION
                ))
            })
    }
}

/// Typed repository for a file-backed collection, abstracting over the
/// two storage backends.
pub struct FileRepository<'a, C: Collection> {
    conn: &'a Connection,
    kind: StorageKind,
    _marker: PhantomData<C>,
}

/// Extension trait for typed file-collection access on a connection.
pub trait FilesExt {
    fn files<C: Collection>(&self) -> Result<FileRepository<'_, C>, OdmError>;
}

impl FilesExt for Connection {
    fn files<C: Collection>(&self) -> Result<FileRepository<'_, C>, OdmError> {
        if C::COLLECTION.is_empty() {
            return Err(OdmError::Configuration(format!(
                "please specify the collection name of {}",
                std::any::type_name::<C>()
            )));
        }
        self.register::<C>();
        let kind = match self.storage_path(C::COLLECTION) {
            Some(_) => StorageKind::Filesystem,
            None => StorageKind::Grid,
        };
        Ok(FileRepository {
            conn: self,
            kind,
            _marker: PhantomData,
        })
    }
}

impl<'a, C: Collection> FileRepository<'a, C> {
    pub fn storage_kind(&self) -> StorageKind {
        self.kind
    }

    fn grid(&self) -> Arc<dyn GridHandle> {
        self.conn.driver().grid(C::COLLECTION)
    }

    fn storage_path(&self) -> Result<&PathBuf, OdmError> {
        self.conn.storage_path(C::COLLECTION).ok_or_else(|| {
            OdmError::Configuration(format!(
                "no storage path configured for '{}'",
                C::COLLECTION
            ))
        })
    }

    /// Stores a payload with its logical record on the configured backend;
    /// returns the stored document.
    pub fn store(&self, record: Bag, bytes: &[u8]) -> Result<FileDocument<C>, OdmError> {
        match self.kind {
            StorageKind::Grid => {
                let id = self.grid().store(record, bytes).map_err(OdmError::from)?;
                let mut filter = Bag::new();
                filter.insert("_id".to_string(), id);
                self.find_one(&filter)?.ok_or_else(|| OdmError::Operation {
                    message: "stored grid file vanished".to_string(),
                    code: 0,
                })
            }
            StorageKind::Filesystem => {
                let mut doc = FileDocument::from_document(Document::map(record));
                let path = self.storage_path()?.join(doc.filename()?);
                std::fs::write(&path, bytes).map_err(|e| OdmError::Operation {
                    message: format!("cannot write {}: {}", path.display(), e),
                    code: 0,
                })?;
                self.conn.documents::<C>()?.save(doc.document_mut())?;
                Ok(doc)
            }
        }
    }

    /// Finds a single file document on either backend.
    pub fn find_one(&self, filter: &Bag) -> Result<Option<FileDocument<C>>, OdmError> {
        match self.kind {
            StorageKind::Grid => {
                let file = self.grid().find_one(filter).map_err(OdmError::from)?;
                Ok(file.map(FileDocument::from_grid))
            }
            StorageKind::Filesystem => {
                let doc = self.conn.documents::<C>()?.find_one(filter)?;
                Ok(doc.map(FileDocument::from_document))
            }
        }
    }

    /// Absolute path of a filesystem-backed payload.
    pub fn path(&self, doc: &FileDocument<C>) -> Result<PathBuf, OdmError> {
        let path = self.storage_path()?.join(doc.filename()?);
        if !path.exists() {
            return Err(OdmError::Operation {
                message: format!("file not found: {}", path.display()),
                code: 0,
            });
        }
        Ok(path)
    }

    /// The payload bytes, from whichever backend holds them.
    pub fn bytes(&self, doc: &FileDocument<C>) -> Result<Vec<u8>, OdmError> {
        match self.kind {
            StorageKind::Grid => match doc.handle() {
                Some(handle) => handle.bytes().map_err(OdmError::from),
                None => Err(OdmError::Operation {
                    message: "file document carries no grid handle".to_string(),
                    code: 0,
                }),
            },
            StorageKind::Filesystem => {
                let path = self.path(doc)?;
                std::fs::read(&path).map_err(|e| OdmError::Operation {
                    message: format!("cannot read {}: {}", path.display(), e),
                    code: 0,
                })
            }
        }
    }

    /// Removes a file document from either backend.
    pub fn delete(&self, doc: &FileDocument<C>) -> Result<bool, OdmError> {
        match self.kind {
            StorageKind::Grid => {
                let id = match doc.document().id() {
                    Some(id) => id.clone(),
                    None => return Ok(false),
                };
                let mut filter = Bag::new();
                filter.insert("_id".to_string(), id);
                Ok(self.grid().remove(&filter).map_err(OdmError::from)? > 0)
            }
            StorageKind::Filesystem => {
                // A payload that is already gone does not block dropping the
                // record; any other filesystem failure does.
                match self.path(doc) {
                    Ok(path) => {
                        std::fs::remove_file(&path).map_err(|e| OdmError::Operation {
                            message: format!("cannot remove {}: {}", path.display(), e),
                            code: 0,
                        })?;
                    }
                    Err(_) => {
                        tracing::warn!(
                            collection = C::COLLECTION,
                            "payload file already missing on delete"
                        );
                    }
                }
                self.conn.documents::<C>()?.delete(doc.document())
            }
        }
    }
}
