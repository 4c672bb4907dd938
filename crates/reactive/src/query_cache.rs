//! Per-collection cache of live query instances.
//!
//! Equivalent queries share one instance: the cache is keyed by the
//! canonical descriptor string. Lookup and construction happen under one
//! lock, so two callers asking for the same descriptor never build two
//! instances. Replacement removes zero-subscriber instances beyond the
//! configured size, oldest first. Evicted instances are uncached, not
//! destroyed; holders may keep using them.

use crate::context::CollectionContext;
use crate::query::QueryInstance;
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};
use vela_core::Result;
use vela_query::{MangoQuery, QueryDescriptor, QueryOp};

/// Replacement policy settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueryCacheConfig {
    /// Number of instances kept before replacement starts evicting.
    pub try_to_keep_max: usize,
    /// Never-executed instances younger than this are not evicted.
    pub unexecuted_lifetime: Duration,
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self {
            try_to_keep_max: 100,
            unexecuted_lifetime: Duration::from_secs(30),
        }
    }
}

struct Entry {
    instance: Arc<QueryInstance>,
    created: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    next_created: u64,
}

/// Deduplicating store of a collection's query instances.
pub struct QueryCache {
    ctx: CollectionContext,
    config: QueryCacheConfig,
    inner: Mutex<Inner>,
}

impl QueryCache {
    pub fn new(ctx: CollectionContext, config: QueryCacheConfig) -> Self {
        Self {
            ctx,
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn config(&self) -> QueryCacheConfig {
        self.config
    }

    pub fn context(&self) -> &CollectionContext {
        &self.ctx
    }

    /// Returns the shared instance for `(op, query)`, creating it if needed.
    ///
    /// Malformed queries fail before the cache is touched.
    pub fn get_or_create(&self, op: QueryOp, query: MangoQuery) -> Result<Arc<QueryInstance>> {
        let descriptor = QueryDescriptor::new(op, query)?;
        self.get_or_create_descriptor(descriptor)
    }

    pub fn get_or_create_descriptor(&self, descriptor: QueryDescriptor) -> Result<Arc<QueryInstance>> {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get(descriptor.canonical()) {
            trace!(query = entry.instance.id(), "query cache hit");
            return Ok(Arc::clone(&entry.instance));
        }

        let key = descriptor.canonical().to_string();
        let instance = Arc::new(QueryInstance::new(descriptor, self.ctx.clone())?);
        let created = inner.next_created;
        inner.next_created += 1;
        inner.entries.insert(
            key,
            Entry {
                instance: Arc::clone(&instance),
                created,
            },
        );
        Ok(instance)
    }

    /// Drops one subscriber of `instance` and runs replacement.
    pub fn release(&self, instance: &QueryInstance) {
        instance.remove_subscriber();
        self.trigger_replacement();
    }

    /// Evicts zero-subscriber instances beyond `try_to_keep_max`, oldest
    /// first. Returns the number of evicted instances.
    pub fn trigger_replacement(&self) -> usize {
        let mut inner = self.inner.lock();
        let excess = inner.entries.len().saturating_sub(self.config.try_to_keep_max);
        if excess == 0 {
            return 0;
        }

        let lifetime = self.config.unexecuted_lifetime;
        let mut candidates: Vec<(u64, String)> = inner
            .entries
            .iter()
            .filter(|(_, entry)| {
                let instance = &entry.instance;
                instance.subscriber_count() == 0
                    && (instance.has_executed() || instance.created_at().elapsed() >= lifetime)
            })
            .map(|(key, entry)| (entry.created, key.clone()))
            .collect();
        candidates.sort_unstable();

        let mut evicted = 0;
        for (_, key) in candidates.into_iter().take(excess) {
            if let Some(entry) = inner.entries.remove(&key) {
                debug!(
                    query = entry.instance.id(),
                    collection = %self.ctx.name,
                    "query evicted from cache"
                );
                evicted += 1;
            }
        }
        evicted
    }

    /// Returns true if an instance for `descriptor` is cached.
    pub fn contains(&self, descriptor: &QueryDescriptor) -> bool {
        self.inner.lock().entries.contains_key(descriptor.canonical())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Destroys and removes every cached instance.
    pub fn destroy_all(&self) {
        let entries: Vec<Entry> = self.inner.lock().entries.drain().map(|(_, e)| e).collect();
        for entry in &entries {
            entry.instance.destroy();
        }
        debug!(collection = %self.ctx.name, destroyed = entries.len(), "query cache cleared");
    }
}
