//! Vela Incremental - EventReduce for Vela live queries.
//!
//! This crate keeps a cached query result correct from the change events it
//! has missed, without asking storage, whenever that is provably possible.
//!
//! # Core Concepts
//!
//! - `BatchDiff`: events compacted to one net change per document
//! - `Window`: the skip/limit range a query returns
//! - `EventReduce`: applies a batch to an ordered result
//! - `ReduceOutcome`: unchanged, the new result, or "execute the query again"
//!
//! # Example
//!
//! ```rust
//! use vela_core::{ChangeEvent, ChangeKind, Document};
//! use vela_incremental::{EventReduce, ReduceOutcome, Window};
//! use vela_query::{MangoQuery, MangoStatics, Schema, SortPart, StorageStatics};
//! use serde_json::json;
//!
//! let schema = Schema::new("id");
//! let query = MangoQuery::new()
//!     .selector(json!({"age": {"$gt": 10}}))
//!     .sort_by(SortPart::asc("age"));
//! let prepared = MangoStatics.prepare_query(&schema, &query).unwrap();
//! let engine = EventReduce::new(
//!     Window::unbounded(),
//!     MangoStatics.query_matcher(&schema, &prepared).unwrap(),
//!     MangoStatics.sort_comparator(&schema, &prepared).unwrap(),
//! );
//!
//! let doc = Document::new("id", json!({"id": "a", "age": 15})).unwrap();
//! let event = ChangeEvent::stamped(1, "users", ChangeKind::Insert, None, Some(doc.clone()));
//! let outcome = engine.reduce(&[], [&event]).unwrap();
//!
//! assert_eq!(outcome, ReduceOutcome::Changed(vec![doc]));
//! ```

pub mod compaction;
pub mod reduce;

pub use compaction::{BatchDiff, DocChange};
pub use reduce::{EventReduce, ReExecuteReason, ReduceOutcome, Window};
