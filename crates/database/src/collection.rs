//! Collections: the write path and query entry points.
//!
//! Every write commits to the document store and appends its change event
//! under one lock, so the buffer's sequence order is the commit order. The
//! new counter is published on the write channel after the lock is released.

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};
use vela_core::{ChangeKind, Document, Error, PrimaryKey, Result};
use vela_query::{MangoQuery, QueryOp, Schema};
use vela_reactive::{CollectionContext, QueryCache, QueryInstance};
use vela_storage::{ChangeEventBuffer, DocumentStore};

/// A named set of documents sharing one schema.
pub struct Collection {
    name: String,
    store: Arc<dyn DocumentStore>,
    ctx: CollectionContext,
    cache: QueryCache,
    write_lock: Mutex<()>,
}

impl Collection {
    pub(crate) fn new(name: &str, store: Arc<dyn DocumentStore>, ctx: CollectionContext, cache: QueryCache) -> Self {
        Self {
            name: name.to_string(),
            store,
            ctx,
            cache,
            write_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.ctx.schema
    }

    pub fn buffer(&self) -> &ChangeEventBuffer {
        &self.ctx.buffer
    }

    pub fn query_cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn is_destroyed(&self) -> bool {
        self.ctx.is_closed()
    }

    fn check_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            Err(Error::destroyed(self.name.as_str()))
        } else {
            Ok(())
        }
    }

    fn document(&self, data: Value) -> Result<Document> {
        Document::new(self.ctx.schema.primary_path(), data)
    }

    /// Commits one write and appends its event. Caller holds the write lock.
    fn commit(&self, kind: ChangeKind, doc: Document, previous: Option<Document>) -> Result<()> {
        match kind {
            ChangeKind::Delete => {
                self.store.delete(&self.name, doc.primary())?;
                self.ctx.buffer.append(kind, Some(doc), None);
            }
            ChangeKind::Insert | ChangeKind::Update => {
                self.store.put(&self.name, doc.clone())?;
                self.ctx.buffer.append(kind, previous, Some(doc));
            }
        }
        Ok(())
    }

    fn publish(&self) {
        let counter = self.ctx.buffer.counter();
        trace!(collection = %self.name, counter, "write published");
        self.ctx.notify_write(counter);
    }

    /// Reads one document from the store.
    pub fn get(&self, key: &PrimaryKey) -> Result<Option<Document>> {
        self.store.get(&self.name, key)
    }

    /// Inserts a new document. Fails with `DocumentConflict` if the primary
    /// key is taken.
    pub fn insert(&self, data: Value) -> Result<Document> {
        self.check_alive()?;
        let doc = self.document(data)?;
        {
            let _write = self.write_lock.lock();
            if self.store.get(&self.name, doc.primary())?.is_some() {
                return Err(Error::document_conflict(self.name.as_str(), doc.primary().clone()));
            }
            self.commit(ChangeKind::Insert, doc.clone(), None)?;
        }
        self.publish();
        Ok(doc)
    }

    /// Inserts many documents atomically with respect to queries.
    ///
    /// Nothing is written if any document is invalid or conflicts.
    pub fn bulk_insert(&self, data: Vec<Value>) -> Result<Vec<Document>> {
        self.check_alive()?;
        let docs = data
            .into_iter()
            .map(|d| self.document(d))
            .collect::<Result<Vec<_>>>()?;
        if docs.is_empty() {
            return Ok(docs);
        }
        {
            let _write = self.write_lock.lock();
            let mut keys = hashbrown::HashSet::with_capacity(docs.len());
            for doc in &docs {
                if !keys.insert(doc.primary()) || self.store.get(&self.name, doc.primary())?.is_some() {
                    return Err(Error::document_conflict(self.name.as_str(), doc.primary().clone()));
                }
            }
            for doc in &docs {
                self.commit(ChangeKind::Insert, doc.clone(), None)?;
            }
        }
        debug!(collection = %self.name, count = docs.len(), "bulk insert");
        self.publish();
        Ok(docs)
    }

    /// Inserts or replaces a document.
    pub fn upsert(&self, data: Value) -> Result<Document> {
        self.check_alive()?;
        let doc = self.document(data)?;
        {
            let _write = self.write_lock.lock();
            let previous = self.store.get(&self.name, doc.primary())?;
            let kind = if previous.is_some() { ChangeKind::Update } else { ChangeKind::Insert };
            self.commit(kind, doc.clone(), previous)?;
        }
        self.publish();
        Ok(doc)
    }

    /// Replaces an existing document. Fails with `DocumentNotFound` if there
    /// is none with the same primary key.
    pub fn update(&self, data: Value) -> Result<Document> {
        self.check_alive()?;
        let doc = self.document(data)?;
        {
            let _write = self.write_lock.lock();
            let previous = self
                .store
                .get(&self.name, doc.primary())?
                .ok_or_else(|| Error::document_not_found(self.name.as_str(), doc.primary().as_str()))?;
            self.commit(ChangeKind::Update, doc.clone(), Some(previous))?;
        }
        self.publish();
        Ok(doc)
    }

    /// Deletes a document and returns its last state.
    pub fn remove(&self, key: &PrimaryKey) -> Result<Document> {
        self.check_alive()?;
        let previous = {
            let _write = self.write_lock.lock();
            let previous = self
                .store
                .get(&self.name, key)?
                .ok_or_else(|| Error::document_not_found(self.name.as_str(), key.as_str()))?;
            self.commit(ChangeKind::Delete, previous.clone(), None)?;
            previous
        };
        self.publish();
        Ok(previous)
    }

    /// Returns the live `find` query for `query`.
    pub fn find(&self, query: MangoQuery) -> Result<Arc<QueryInstance>> {
        self.query(QueryOp::Find, query)
    }

    /// Returns the live `findOne` query for `query`.
    pub fn find_one(&self, query: MangoQuery) -> Result<Arc<QueryInstance>> {
        self.query(QueryOp::FindOne, query)
    }

    fn query(&self, op: QueryOp, query: MangoQuery) -> Result<Arc<QueryInstance>> {
        self.check_alive()?;
        let instance = self.cache.get_or_create(op, query)?;
        self.cache.trigger_replacement();
        Ok(instance)
    }

    /// Releases one subscriber of a query obtained from this collection.
    pub fn release(&self, instance: &QueryInstance) {
        self.cache.release(instance);
    }

    /// Deletes every document the query currently finds.
    pub async fn remove_query(&self, instance: &QueryInstance) -> Result<Vec<Document>> {
        let found = instance.exec().await?;
        let mut removed = Vec::with_capacity(found.len());
        for doc in found.docs() {
            match self.remove(doc.primary()) {
                Ok(doc) => removed.push(doc),
                // Removed concurrently
                Err(Error::DocumentNotFound { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(removed)
    }

    /// Applies `update` to every document the query currently finds and
    /// returns the new states.
    ///
    /// Needs a query builder with the update capability; without one this
    /// fails with `UnsupportedOperation` before the query runs.
    pub async fn update_query(&self, instance: &QueryInstance, update: Value) -> Result<Vec<Document>> {
        self.check_alive()?;
        let updater = self.ctx.builder.update(&update)?;
        let found = instance.exec().await?;
        let mut updated = Vec::with_capacity(found.len());
        for doc in found.docs() {
            let next = self.document(updater(doc)?)?;
            if next.primary() != doc.primary() {
                return Err(Error::invalid_operation("an update may not change the primary key"));
            }
            match self.update(next.data().clone()) {
                Ok(doc) => updated.push(doc),
                // Removed concurrently
                Err(Error::DocumentNotFound { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        debug!(collection = %self.name, count = updated.len(), "query update");
        Ok(updated)
    }

    /// Refuses further writes and queries. Every query of the collection is
    /// destroyed, including instances already evicted from the cache.
    pub(crate) fn destroy(&self) {
        if self.ctx.close() {
            self.cache.destroy_all();
            debug!(collection = %self.name, "collection destroyed");
        }
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("counter", &self.ctx.buffer.counter())
            .field("queries", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vela_query::{DocumentUpdater, QueryBuilder};
    use vela_reactive::QueryCacheConfig;
    use vela_storage::MemoryStorage;

    fn collection() -> (Collection, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let ctx = CollectionContext::new("users", Schema::new("id"), storage.clone(), 100, 16);
        let cache = QueryCache::new(ctx.clone(), QueryCacheConfig::default());
        (Collection::new("users", storage.clone(), ctx, cache), storage)
    }

    fn kinds(collection: &Collection) -> Vec<ChangeKind> {
        collection
            .buffer()
            .get_from(1)
            .unwrap()
            .iter()
            .map(|e| e.kind())
            .collect()
    }

    #[test]
    fn test_writes_append_events() {
        let (users, storage) = collection();
        users.insert(json!({"id": "a", "age": 1})).unwrap();
        users.upsert(json!({"id": "a", "age": 2})).unwrap();
        users.upsert(json!({"id": "b", "age": 3})).unwrap();
        users.update(json!({"id": "b", "age": 4})).unwrap();
        let removed = users.remove(&"a".into()).unwrap();

        assert_eq!(removed.get_path("age"), Some(&json!(2)));
        assert_eq!(
            kinds(&users),
            vec![
                ChangeKind::Insert,
                ChangeKind::Update,
                ChangeKind::Insert,
                ChangeKind::Update,
                ChangeKind::Delete
            ]
        );
        assert_eq!(users.buffer().counter(), 5);
        assert_eq!(storage.document_count("users"), 1);

        let events = users.buffer().get_from(2).unwrap();
        assert_eq!(events[0].previous_doc().and_then(|d| d.get_path("age")), Some(&json!(1)));
    }

    #[test]
    fn test_write_errors() {
        let (users, _) = collection();
        users.insert(json!({"id": "a"})).unwrap();
        assert!(matches!(
            users.insert(json!({"id": "a"})),
            Err(Error::DocumentConflict { .. })
        ));
        assert!(matches!(
            users.update(json!({"id": "z"})),
            Err(Error::DocumentNotFound { .. })
        ));
        assert!(matches!(users.remove(&"z".into()), Err(Error::DocumentNotFound { .. })));
        assert!(matches!(users.insert(json!({"name": "x"})), Err(Error::InvalidDocument { .. })));
        assert_eq!(users.buffer().counter(), 1);
    }

    #[test]
    fn test_bulk_insert_is_all_or_nothing() {
        let (users, storage) = collection();
        users.insert(json!({"id": "c"})).unwrap();
        let err = users
            .bulk_insert(vec![json!({"id": "a"}), json!({"id": "c"})])
            .unwrap_err();
        assert!(matches!(err, Error::DocumentConflict { .. }));
        let err = users
            .bulk_insert(vec![json!({"id": "x"}), json!({"id": "x"})])
            .unwrap_err();
        assert!(matches!(err, Error::DocumentConflict { .. }));
        assert_eq!(storage.document_count("users"), 1);

        let docs = users
            .bulk_insert(vec![json!({"id": "a"}), json!({"id": "b"})])
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(users.buffer().counter(), 3);
        assert!(users.bulk_insert(vec![]).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_dedups_and_follows_writes() {
        let (users, _) = collection();
        let query = MangoQuery::new().selector(json!({"age": {"$gte": 18}}));
        let live = users.find(query.clone()).unwrap();
        assert!(Arc::ptr_eq(&live, &users.find(query).unwrap()));

        users.insert(json!({"id": "a", "age": 30})).unwrap();
        users.insert(json!({"id": "b", "age": 10})).unwrap();
        assert_eq!(live.exec().await.unwrap().keys(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_remove_query() {
        let (users, storage) = collection();
        users
            .bulk_insert(vec![
                json!({"id": "a", "age": 30}),
                json!({"id": "b", "age": 10}),
                json!({"id": "c", "age": 40}),
            ])
            .unwrap();
        let adults = users.find(MangoQuery::new().selector(json!({"age": {"$gte": 18}}))).unwrap();
        let removed = users.remove_query(&adults).await.unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(storage.document_count("users"), 1);
        assert!(adults.exec().await.unwrap().is_empty());
    }

    /// Supports `$set` updates only.
    struct SetBuilder;

    impl QueryBuilder for SetBuilder {
        fn update(&self, update: &Value) -> Result<DocumentUpdater> {
            let fields = update
                .get("$set")
                .and_then(Value::as_object)
                .cloned()
                .ok_or_else(|| Error::invalid_query_shape("expected a $set update"))?;
            Ok(Arc::new(move |doc: &Document| {
                let mut data = doc.data().clone();
                if let Value::Object(map) = &mut data {
                    map.extend(fields.clone());
                }
                Ok(data)
            }))
        }
    }

    #[tokio::test]
    async fn test_update_query_needs_capability() {
        let (users, _) = collection();
        users.insert(json!({"id": "a", "age": 30})).unwrap();
        let all = users.find(MangoQuery::new()).unwrap();
        let err = users.update_query(&all, json!({"$set": {"age": 1}})).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation { .. }));
        assert_eq!(all.stats().exec_over_database, 0);
        assert_eq!(users.buffer().counter(), 1);
    }

    #[tokio::test]
    async fn test_update_query_rewrites_found_documents() {
        let storage = Arc::new(MemoryStorage::new());
        let ctx = CollectionContext::new("users", Schema::new("id"), storage.clone(), 100, 16)
            .with_builder(Arc::new(SetBuilder));
        let cache = QueryCache::new(ctx.clone(), QueryCacheConfig::default());
        let users = Collection::new("users", storage, ctx, cache);
        users
            .bulk_insert(vec![json!({"id": "a", "age": 30}), json!({"id": "b", "age": 10})])
            .unwrap();

        let adults = users.find(MangoQuery::new().selector(json!({"age": {"$gte": 18}}))).unwrap();
        let updated = users.update_query(&adults, json!({"$set": {"adult": true}})).await.unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(users.get(&"a".into()).unwrap().unwrap().get_path("adult"), Some(&json!(true)));
        assert_eq!(users.get(&"b".into()).unwrap().unwrap().get_path("adult"), None);

        let err = users.update_query(&adults, json!({"$set": {"id": "z"}})).await.unwrap_err();
        assert!(matches!(err, Error::InvalidOperation { .. }));
        assert!(users.get(&"z".into()).unwrap().is_none());
    }

    #[test]
    fn test_destroyed_collection_refuses_work() {
        let (users, _) = collection();
        let live = users.find(MangoQuery::new()).unwrap();
        users.destroy();
        assert!(live.is_destroyed());
        assert!(users.query_cache().is_empty());
        assert!(matches!(users.insert(json!({"id": "a"})), Err(Error::Destroyed { .. })));
        assert!(matches!(users.find(MangoQuery::new()), Err(Error::Destroyed { .. })));
    }
}
