//! Vela Database - Collections and live queries over a pluggable store.
//!
//! This crate wires the reactive query layer to a storage backend: writes go
//! through a `Collection`, which records them in its change event buffer,
//! and live queries obtained from the collection stay equal to what the
//! backend would return for them.
//!
//! # Core Components
//!
//! - `Database`: owns collections, configuration and extensions
//! - `Collection`: the write path and the `find`/`find_one` entry points
//! - `DatabaseConfig`: buffer, cache and channel sizing
//! - `ExtensionRegistry`: per-database singletons with teardown
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use vela_database::{Database, DatabaseConfig};
//! use vela_query::{MangoQuery, Schema, SortPart};
//! use vela_storage::MemoryStorage;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let db = Database::new(DatabaseConfig::default(), Arc::new(MemoryStorage::new())).unwrap();
//! let users = db.create_collection("users", Schema::new("id")).unwrap();
//!
//! let adults = users
//!     .find(
//!         MangoQuery::new()
//!             .selector(json!({"age": {"$gte": 18}}))
//!             .sort_by(SortPart::asc("age")),
//!     )
//!     .unwrap();
//!
//! users.insert(json!({"id": "alice", "age": 30})).unwrap();
//! users.insert(json!({"id": "bob", "age": 12})).unwrap();
//! users.insert(json!({"id": "carol", "age": 25})).unwrap();
//!
//! let result = adults.exec().await.unwrap();
//! assert_eq!(result.keys(), vec!["carol", "alice"]);
//!
//! db.destroy();
//! # });
//! ```

pub mod collection;
pub mod config;
pub mod database;
pub mod registry;

pub use collection::Collection;
pub use config::{DatabaseConfig, QueryCacheSettings};
pub use database::Database;
pub use registry::{Extension, ExtensionRegistry};

pub use vela_core::{Document, Error, PrimaryKey, Result};
pub use vela_query::{MangoQuery, QueryOp, Schema, SortPart};
pub use vela_reactive::{ChangeSet, QueryInstance, QueryResult, Subscription};
