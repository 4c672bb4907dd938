//! Vela Core - Core types for the Vela reactive query layer.
//!
//! This crate provides the foundational types shared by every other layer:
//!
//! - `Document`: an immutable point-in-time snapshot of a stored document
//! - `PrimaryKey`: the string form of a document's primary field
//! - `ChangeEvent`: an immutable record of one committed write
//! - `collate`: CouchDB-style total ordering over JSON values
//! - `pattern_match`: the regex subset used by the `$regex` operator
//! - `Error`: error types for query and recomputation failures
//!
//! # Example
//!
//! ```rust
//! use vela_core::{Document, PrimaryKey};
//! use serde_json::json;
//!
//! let doc = Document::new("id", json!({"id": "alice", "age": 30})).unwrap();
//!
//! assert_eq!(doc.primary(), &PrimaryKey::from("alice"));
//! assert_eq!(doc.get_path("age"), Some(&json!(30)));
//! assert!(!doc.is_deleted());
//! ```

mod change;
pub mod collate;
mod document;
mod error;
mod id;
pub mod pattern_match;

pub use change::{ChangeEvent, ChangeKind, SequenceId};
pub use document::{lookup_path, Document, PrimaryKey, DELETED_FIELD};
pub use error::{Error, Result};
pub use id::{next_query_id, set_next_query_id, QueryId};
