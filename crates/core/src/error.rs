//! Error types for the Vela reactive query layer.

use crate::document::PrimaryKey;
use thiserror::Error;

/// Result type alias for Vela operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for query, recomputation and storage operations.
///
/// The error is `Clone` so a single failed recomputation can be delivered to
/// every subscriber of the affected query.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The query's selector or sort is not well formed.
    #[error("Invalid query shape: {message}")]
    InvalidQueryShape { message: String },

    /// The sort comparator could not strictly order two distinct documents.
    #[error("Ambiguous sort order between documents {left} and {right}")]
    AmbiguousSortOrder { left: PrimaryKey, right: PrimaryKey },

    /// An optional capability was used but never installed.
    #[error("Unsupported operation: extension not installed ({capability})")]
    UnsupportedOperation { capability: String },

    /// A document is missing its primary key or is not a JSON object.
    #[error("Invalid document: {message}")]
    InvalidDocument { message: String },

    /// A document with the same primary key already exists.
    #[error("Document conflict in collection {collection}: {key}")]
    DocumentConflict {
        collection: String,
        key: PrimaryKey,
    },

    /// A required document was not found.
    #[error("Document not found in collection {collection}: {query}")]
    DocumentNotFound { collection: String, query: String },

    /// The storage query executor failed.
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// The owning collection or database has been destroyed.
    #[error("Collection {collection} has been destroyed")]
    Destroyed { collection: String },

    /// Configuration could not be parsed or is out of range.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Invalid operation.
    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },
}

impl Error {
    /// Creates an invalid query shape error.
    pub fn invalid_query_shape(message: impl Into<String>) -> Self {
        Error::InvalidQueryShape {
            message: message.into(),
        }
    }

    /// Creates an ambiguous sort order error.
    pub fn ambiguous_sort_order(left: PrimaryKey, right: PrimaryKey) -> Self {
        Error::AmbiguousSortOrder { left, right }
    }

    /// Creates an "extension not installed" error for the named capability.
    pub fn unsupported(capability: impl Into<String>) -> Self {
        Error::UnsupportedOperation {
            capability: capability.into(),
        }
    }

    /// Creates an invalid document error.
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Error::InvalidDocument {
            message: message.into(),
        }
    }

    /// Creates a document conflict error.
    pub fn document_conflict(collection: impl Into<String>, key: PrimaryKey) -> Self {
        Error::DocumentConflict {
            collection: collection.into(),
            key,
        }
    }

    /// Creates a document not found error.
    pub fn document_not_found(collection: impl Into<String>, query: impl Into<String>) -> Self {
        Error::DocumentNotFound {
            collection: collection.into(),
            query: query.into(),
        }
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage {
            message: message.into(),
        }
    }

    /// Creates a destroyed error.
    pub fn destroyed(collection: impl Into<String>) -> Self {
        Error::Destroyed {
            collection: collection.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true for errors raised by pure computation (selector, sort),
    /// which abort a single recomputation but leave the cached result intact.
    pub fn is_computation_error(&self) -> bool {
        matches!(
            self,
            Error::AmbiguousSortOrder { .. } | Error::InvalidQueryShape { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::invalid_config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::invalid_query_shape("selector must be an object");
        assert!(err.to_string().contains("Invalid query shape"));

        let err = Error::unsupported("query-builder");
        assert!(err.to_string().contains("extension not installed"));
        assert!(err.to_string().contains("query-builder"));

        let err = Error::ambiguous_sort_order("a".into(), "b".into());
        assert!(err.to_string().contains("a"));
        assert!(err.to_string().contains("b"));
    }

    #[test]
    fn test_error_constructors() {
        let err = Error::document_conflict("users", "alice".into());
        match err {
            Error::DocumentConflict { collection, key } => {
                assert_eq!(collection, "users");
                assert_eq!(key, PrimaryKey::from("alice"));
            }
            _ => panic!("Wrong error type"),
        }
    }

    #[test]
    fn test_computation_errors() {
        assert!(Error::ambiguous_sort_order("a".into(), "b".into()).is_computation_error());
        assert!(!Error::storage("disk on fire").is_computation_error());
    }
}
