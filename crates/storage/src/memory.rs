//! In-memory storage backend.
//!
//! Documents are kept per collection in primary key order. Queries are
//! evaluated with the Mango oracle, so results agree exactly with what the
//! incremental path computes.

use crate::executor::{DocumentStore, StorageExecutor};
use async_trait::async_trait;
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use vela_core::{Document, PrimaryKey, Result};
use vela_query::{MangoStatics, PreparedQuery, Schema, SortComparator, StorageStatics};

type DocumentMap = BTreeMap<PrimaryKey, Document>;

/// Ground-truth store for tests and embedded use.
#[derive(Default)]
pub struct MemoryStorage {
    collections: RwLock<HashMap<String, DocumentMap>>,
    executions: AtomicU64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many queries have been executed.
    pub fn execution_count(&self) -> u64 {
        self.executions.load(Ordering::SeqCst)
    }

    /// Returns the number of documents in a collection.
    pub fn document_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, |docs| docs.len())
    }

    /// Evaluates a query over a snapshot. Synchronous core of `execute_query`.
    pub fn query_snapshot(
        &self,
        collection: &str,
        prepared: &PreparedQuery,
        limit_override: Option<usize>,
    ) -> Result<Vec<Document>> {
        let snapshot: Vec<Document> = self
            .collections
            .read()
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default();

        let schema = Schema::new(prepared.primary_path());
        let matcher = MangoStatics.query_matcher(&schema, prepared)?;
        let mut matching: Vec<Document> = snapshot.into_iter().filter(|d| matcher(d)).collect();
        SortComparator::new(prepared.sort().to_vec()).sort(&mut matching)?;

        let limit = limit_override.or(prepared.limit()).unwrap_or(usize::MAX);
        Ok(matching
            .into_iter()
            .skip(prepared.skip())
            .take(limit)
            .collect())
    }
}

#[async_trait]
impl StorageExecutor for MemoryStorage {
    async fn execute_query(
        &self,
        collection: &str,
        prepared: &PreparedQuery,
        limit_override: Option<usize>,
    ) -> Result<Vec<Document>> {
        let n = self.executions.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.query_snapshot(collection, prepared, limit_override)?;
        debug!(collection, execution = n, found = result.len(), "memory query executed");
        Ok(result)
    }
}

impl DocumentStore for MemoryStorage {
    fn get(&self, collection: &str, key: &PrimaryKey) -> Result<Option<Document>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(key))
            .cloned())
    }

    fn put(&self, collection: &str, doc: Document) -> Result<Option<Document>> {
        let mut collections = self.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();
        Ok(docs.insert(doc.primary().clone(), doc))
    }

    fn delete(&self, collection: &str, key: &PrimaryKey) -> Result<Option<Document>> {
        Ok(self
            .collections
            .write()
            .get_mut(collection)
            .and_then(|docs| docs.remove(key)))
    }
}
