//! Vela Query - Mango queries and the match/sort oracle for Vela.
//!
//! This crate provides everything needed to describe a live query and to
//! decide locally whether, and where, a document belongs in its result:
//!
//! - `query`: `MangoQuery`, `QueryOp` and sort parts
//! - `descriptor`: canonical, order-independent query identity
//! - `schema`: the collection facts query preparation relies on
//! - `prepare`: backend normalization into a `PreparedQuery`
//! - `selector`: compiled selector matching
//! - `sort`: strict document ordering
//! - `statics`: the `StorageStatics` oracle trait and its Mango implementation
//! - `builder`: the optional chained query builder capability
//!
//! # Example
//!
//! ```rust
//! use vela_query::{MangoQuery, MangoStatics, Schema, SortPart, StorageStatics};
//! use vela_core::Document;
//! use serde_json::json;
//!
//! let schema = Schema::new("id");
//! let query = MangoQuery::new()
//!     .selector(json!({"age": {"$gt": 10}}))
//!     .sort_by(SortPart::asc("age"));
//! let prepared = MangoStatics.prepare_query(&schema, &query).unwrap();
//! let matcher = MangoStatics.query_matcher(&schema, &prepared).unwrap();
//!
//! let doc = Document::new("id", json!({"id": "a", "age": 15})).unwrap();
//! assert!(matcher(&doc));
//! ```

pub mod builder;
pub mod descriptor;
pub mod prepare;
pub mod query;
pub mod schema;
pub mod selector;
pub mod sort;
pub mod statics;

pub use builder::{DocumentUpdater, MangoQueryBuilder, NoQueryBuilder, QueryBuilder};
pub use descriptor::QueryDescriptor;
pub use prepare::{prepare_query, PreparedQuery};
pub use query::{MangoQuery, QueryOp, SortDirection, SortPart};
pub use schema::Schema;
pub use selector::Selector;
pub use sort::{insertion_point_by, verify_sorted_by, SortComparator};
pub use statics::{DeterministicSortComparator, MangoStatics, QueryMatcher, StorageStatics};
