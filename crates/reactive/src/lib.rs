//! Vela Reactive - Live queries for the Vela reactive query layer.
//!
//! This crate keeps query results continuously equal to what storage would
//! return, without re-running every query on every write.
//!
//! # Core Concepts
//!
//! - `QueryInstance`: one live query with its cached result and the
//!   `ensure_equal` recomputation state machine
//! - `QueryCache`: deduplicates equivalent queries and evicts idle ones
//! - `CollectionContext`: the collaborators a collection shares with its queries
//! - `ChangeSet`: the difference between two emitted results
//!
//! # Recomputation
//!
//! `ensure_equal` returns at once when no write happened since the last
//! applied change event. Otherwise the missed events are replayed through the
//! EventReduce engine, and only when that is impossible (first execution,
//! buffer overflow, window boundary touched) is the query executed against
//! storage.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use vela_core::{ChangeKind, Document};
//! use vela_query::{MangoQuery, QueryOp, Schema};
//! use vela_reactive::{CollectionContext, QueryCache, QueryCacheConfig};
//! use vela_storage::{DocumentStore, MemoryStorage};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let storage = Arc::new(MemoryStorage::new());
//! let ctx = CollectionContext::new("users", Schema::new("id"), storage.clone(), 100, 16);
//! let cache = QueryCache::new(ctx.clone(), QueryCacheConfig::default());
//!
//! let query = MangoQuery::new().selector(json!({"age": {"$gt": 10}}));
//! let live = cache.get_or_create(QueryOp::Find, query).unwrap();
//! assert!(live.exec().await.unwrap().is_empty());
//!
//! let doc = Document::new("id", json!({"id": "alice", "age": 30})).unwrap();
//! storage.put("users", doc.clone()).unwrap();
//! ctx.buffer.append(ChangeKind::Insert, None, Some(doc));
//!
//! assert_eq!(live.exec().await.unwrap().len(), 1);
//! assert_eq!(live.stats().exec_over_database, 1);
//! # });
//! ```

pub mod change_set;
pub mod context;
pub mod query;
pub mod query_cache;
pub mod result;
pub mod subscription;

pub use change_set::ChangeSet;
pub use context::CollectionContext;
pub use query::{QueryInstance, QueryStats};
pub use query_cache::{QueryCache, QueryCacheConfig};
pub use result::QueryResult;
pub use subscription::{ChangeCallback, Subscription, SubscriptionId};
