//! Database - Main entry point for Vela.
//!
//! A `Database` owns its collections, the storage backend they share and the
//! extension registry. Destroying it destroys every collection and live
//! query and runs the registered teardown hooks.

use crate::collection::Collection;
use crate::config::DatabaseConfig;
use crate::registry::{Extension, ExtensionRegistry};
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use vela_core::{Error, Result};
use vela_query::{NoQueryBuilder, QueryBuilder, Schema};
use vela_reactive::{CollectionContext, QueryCache};
use vela_storage::{DocumentStore, StorageBackend, StorageExecutor};

/// The main database interface.
pub struct Database {
    config: DatabaseConfig,
    store: Arc<dyn DocumentStore>,
    executor: Arc<dyn StorageExecutor>,
    builder: Arc<dyn QueryBuilder>,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
    registry: ExtensionRegistry,
    destroyed: AtomicBool,
}

impl Database {
    /// Creates a database over `storage`. Fails if the configuration is
    /// invalid.
    pub fn new<S>(config: DatabaseConfig, storage: Arc<S>) -> Result<Self>
    where
        S: StorageBackend + 'static,
    {
        config.validate()?;
        Ok(Self {
            config,
            store: storage.clone(),
            executor: storage,
            builder: Arc::new(NoQueryBuilder),
            collections: RwLock::new(HashMap::new()),
            registry: ExtensionRegistry::new(),
            destroyed: AtomicBool::new(false),
        })
    }

    /// Installs a query builder for collections created afterwards.
    pub fn with_query_builder(mut self, builder: Arc<dyn QueryBuilder>) -> Self {
        self.builder = builder;
        self
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Creates a collection. Fails if one with the same name exists.
    pub fn create_collection(&self, name: &str, schema: Schema) -> Result<Arc<Collection>> {
        if self.is_destroyed() {
            return Err(Error::destroyed(name));
        }
        let mut collections = self.collections.write();
        if collections.contains_key(name) {
            return Err(Error::invalid_operation(format!("collection '{}' already exists", name)));
        }

        let ctx = CollectionContext::new(
            name,
            schema,
            Arc::clone(&self.executor),
            self.config.change_buffer_capacity,
            self.config.event_channel_capacity,
        )
        .with_builder(Arc::clone(&self.builder));
        let cache = QueryCache::new(ctx.clone(), self.config.query_cache.to_cache_config());
        let collection = Arc::new(Collection::new(name, Arc::clone(&self.store), ctx, cache));
        collections.insert(name.to_string(), Arc::clone(&collection));
        debug!(collection = name, "collection created");
        Ok(collection)
    }

    pub fn collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.read().get(name).cloned()
    }

    /// Returns all collection names.
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns this database's singleton of extension `T`.
    pub fn extension<T: Extension>(&self) -> Result<Arc<T>> {
        if self.is_destroyed() {
            return Err(Error::invalid_operation("database has been destroyed"));
        }
        self.registry.get_or_create(|| T::create(self))
    }

    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.registry
    }

    /// Registers a hook that runs when the database is destroyed.
    pub fn on_destroy(&self, hook: impl FnOnce() + Send + 'static) {
        self.registry.on_teardown(hook);
    }

    /// Destroys every collection and live query, then runs teardown hooks.
    /// Results of in-flight query executions are discarded.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let collections: Vec<Arc<Collection>> = self.collections.write().drain().map(|(_, c)| c).collect();
        for collection in &collections {
            collection.destroy();
        }
        self.registry.teardown();
        debug!(collections = collections.len(), "database destroyed");
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("collections", &self.collection_names())
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}
