use std::fmt;

use crate::driver::DriverError;

/// Error type for mapper operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OdmError {
    /// A required setup option is missing (database name, collection name,
    /// storage path).
    Configuration(String),
    /// `save()` was called on a class flagged `PERSISTABLE = false`.
    NotPersistable(&'static str),
    /// A reference points at a collection with no registered class, or the
    /// registered class does not match the requested type.
    UnmappedEntity { collection: String },
    /// A forwarded command name outside the fixed allow-list.
    UnknownCommand(String),
    /// The backend reported a non-success status; carries the backend
    /// message and code.
    Operation { message: String, code: i32 },
    /// A translation accessor was used on a field not declared translated.
    NotTranslated {
        field: String,
        model: &'static str,
    },
}

impl fmt::Display for OdmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OdmError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            OdmError::NotPersistable(collection) => {
                write!(
                    f,
                    "documents of collection '{}' are not persistable",
                    collection
                )
            }
            OdmError::UnmappedEntity { collection } => write!(
                f,
                "there is no model registered for the referred entity '{}'; \
                 register one or add a class mapping in the connection config",
                collection
            ),
            OdmError::UnknownCommand(name) => {
                write!(f, "unknown or disallowed command '{}'", name)
            }
            OdmError::Operation { message, code } => {
                write!(f, "store operation failed: {} (code {})", message, code)
            }
            OdmError::NotTranslated { field, model } => write!(
                f,
                "field '{}' is not a translated entry of {}; check its translated_fields()",
                field, model
            ),
        }
    }
}

impl std::error::Error for OdmError {}

impl From<DriverError> for OdmError {
    fn from(err: DriverError) -> Self {
        OdmError::Operation {
            message: err.message,
            code: err.code,
        }
    }
}
