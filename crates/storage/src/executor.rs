//! Storage collaborators used by collections.

use async_trait::async_trait;
use vela_core::{Document, PrimaryKey, Result};
use vela_query::PreparedQuery;

/// Executes prepared queries against ground truth.
///
/// The result must reflect one point-in-time snapshot, be ordered by the
/// prepared sort and be cut to the skip/limit window. `limit_override`
/// replaces the prepared limit when set.
#[async_trait]
pub trait StorageExecutor: Send + Sync {
    async fn execute_query(
        &self,
        collection: &str,
        prepared: &PreparedQuery,
        limit_override: Option<usize>,
    ) -> Result<Vec<Document>>;
}

/// Synchronous document writes.
///
/// Writes are synchronous so that a collection can commit a write and
/// append its change event under one lock.
pub trait DocumentStore: Send + Sync {
    /// Reads one document.
    fn get(&self, collection: &str, key: &PrimaryKey) -> Result<Option<Document>>;

    /// Inserts or replaces a document, returning the replaced version.
    fn put(&self, collection: &str, doc: Document) -> Result<Option<Document>>;

    /// Deletes a document, returning the deleted version.
    fn delete(&self, collection: &str, key: &PrimaryKey) -> Result<Option<Document>>;
}

/// A complete storage backend.
pub trait StorageBackend: StorageExecutor + DocumentStore {}

impl<T: StorageExecutor + DocumentStore> StorageBackend for T {}
