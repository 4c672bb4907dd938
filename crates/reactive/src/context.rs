//! Shared collaborators of a collection's live queries.

use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use vela_core::SequenceId;
use vela_query::{MangoStatics, NoQueryBuilder, QueryBuilder, Schema, StorageStatics};
use vela_storage::{ChangeEventBuffer, StorageExecutor};

/// Everything a query instance needs from its owning collection.
///
/// Cloning is cheap; all collaborators are shared.
#[derive(Clone)]
pub struct CollectionContext {
    pub name: Arc<str>,
    pub schema: Arc<Schema>,
    pub statics: Arc<dyn StorageStatics>,
    pub executor: Arc<dyn StorageExecutor>,
    pub buffer: Arc<ChangeEventBuffer>,
    /// Carries the buffer counter after every committed write.
    pub writes: broadcast::Sender<SequenceId>,
    pub builder: Arc<dyn QueryBuilder>,
    /// Set once the owning collection is torn down. Every query of the
    /// collection observes it, cached or not.
    closed: Arc<watch::Sender<bool>>,
}

impl CollectionContext {
    /// Creates a context with Mango statics and no query builder.
    pub fn new(
        name: impl Into<Arc<str>>,
        schema: Schema,
        executor: Arc<dyn StorageExecutor>,
        buffer_capacity: usize,
        channel_capacity: usize,
    ) -> Self {
        let name: Arc<str> = name.into();
        let (writes, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            buffer: Arc::new(ChangeEventBuffer::new(name.as_ref(), buffer_capacity)),
            name,
            schema: Arc::new(schema),
            statics: Arc::new(MangoStatics),
            executor,
            writes,
            builder: Arc::new(NoQueryBuilder),
            closed: Arc::new(watch::Sender::new(false)),
        }
    }

    /// Replaces the query builder.
    pub fn with_builder(mut self, builder: Arc<dyn QueryBuilder>) -> Self {
        self.builder = builder;
        self
    }

    /// Replaces the match/sort oracle.
    pub fn with_statics(mut self, statics: Arc<dyn StorageStatics>) -> Self {
        self.statics = statics;
        self
    }

    /// Publishes the buffer counter to every live result stream.
    pub fn notify_write(&self, counter: SequenceId) {
        // No receivers just means nobody is subscribed
        let _ = self.writes.send(counter);
    }

    /// Marks the collection as torn down. Returns false if it already was.
    pub fn close(&self) -> bool {
        !self.closed.send_replace(true)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Returns a receiver notified when the collection is torn down.
    pub fn closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }
}

impl fmt::Debug for CollectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionContext")
            .field("name", &self.name)
            .field("counter", &self.buffer.counter())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
