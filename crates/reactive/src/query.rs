//! Live query instances.
//!
//! A `QueryInstance` owns the cached result of one query descriptor and keeps
//! it equal to what a full execution against storage would return. Every call
//! to `ensure_equal` either proves the cache is in sync, replays missed change
//! events through the EventReduce engine, or falls back to a full execution.
//! Passes are serialized per instance; callers that queue behind a pass reuse
//! its outcome.

use crate::change_set::ChangeSet;
use crate::context::CollectionContext;
use crate::result::QueryResult;
use crate::subscription::{SubscriberGuard, Subscription};
use core::fmt;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio::sync::{broadcast::error::RecvError, watch};
use tracing::{debug, trace};
use vela_core::{next_query_id, Document, Error, QueryId, Result, SequenceId};
use vela_incremental::{EventReduce, ReduceOutcome, Window};
use vela_query::{
    verify_sorted_by, DeterministicSortComparator, MangoQuery, PreparedQuery, QueryDescriptor, QueryOp,
};

/// Query artifacts computed once per instance.
struct Prepared {
    query: PreparedQuery,
    comparator: DeterministicSortComparator,
    reduce: EventReduce,
}

impl Prepared {
    fn build(ctx: &CollectionContext, descriptor: &QueryDescriptor) -> Result<Self> {
        let query = ctx.statics.prepare_query(&ctx.schema, descriptor.query())?;
        let matcher = ctx.statics.query_matcher(&ctx.schema, &query)?;
        let comparator = ctx.statics.sort_comparator(&ctx.schema, &query)?;
        let window = Window::new(query.skip(), query.limit());
        Ok(Self {
            reduce: EventReduce::new(window, matcher, comparator.clone()),
            comparator,
            query,
        })
    }
}

#[derive(Default)]
struct State {
    /// Sequence id of the last change event reflected in the result.
    last_applied: Option<SequenceId>,
    passes_completed: u64,
    /// Outcome of the most recent pass, handed to callers queued behind it.
    last_outcome: Option<Result<bool>>,
    last_ensure_equal: Option<Instant>,
}

/// Point-in-time statistics of a query instance.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryStats {
    pub id: QueryId,
    pub last_applied: Option<SequenceId>,
    /// Number of full executions against storage.
    pub exec_over_database: u64,
    pub subscribers: usize,
    pub last_ensure_equal: Option<Instant>,
}

enum Wake {
    Result,
    Write,
    Closed,
}

/// A live query whose result follows the collection's writes.
pub struct QueryInstance {
    id: QueryId,
    descriptor: QueryDescriptor,
    ctx: CollectionContext,
    created_at: Instant,
    prepared: OnceLock<Prepared>,
    state: Mutex<State>,
    /// Serializes recomputation passes.
    recompute: tokio::sync::Mutex<()>,
    result: watch::Sender<Arc<QueryResult>>,
    destroyed: watch::Sender<bool>,
    subscribers: AtomicUsize,
    exec_over_database: AtomicU64,
}

impl QueryInstance {
    /// Creates a never-executed instance.
    ///
    /// Fails with `InvalidQueryShape` if the query cannot be prepared.
    pub fn new(descriptor: QueryDescriptor, ctx: CollectionContext) -> Result<Self> {
        let instance = Self {
            id: next_query_id(),
            descriptor,
            ctx,
            created_at: Instant::now(),
            prepared: OnceLock::new(),
            state: Mutex::new(State::default()),
            recompute: tokio::sync::Mutex::new(()),
            result: watch::Sender::new(Arc::new(QueryResult::empty())),
            destroyed: watch::Sender::new(false),
            subscribers: AtomicUsize::new(0),
            exec_over_database: AtomicU64::new(0),
        };
        instance.prepared()?;
        debug!(
            query = instance.id,
            collection = %instance.ctx.name,
            descriptor = %instance.descriptor,
            "query instance created"
        );
        Ok(instance)
    }

    #[inline]
    pub fn id(&self) -> QueryId {
        self.id
    }

    #[inline]
    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    #[inline]
    pub fn op(&self) -> QueryOp {
        self.descriptor.op()
    }

    pub fn collection(&self) -> &str {
        &self.ctx.name
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Returns the prepared query, preparing it on first access.
    pub fn prepared_query(&self) -> Result<&PreparedQuery> {
        self.prepared().map(|p| &p.query)
    }

    fn prepared(&self) -> Result<&Prepared> {
        if let Some(prepared) = self.prepared.get() {
            return Ok(prepared);
        }
        let prepared = Prepared::build(&self.ctx, &self.descriptor)?;
        Ok(self.prepared.get_or_init(|| prepared))
    }

    /// Returns the cached result without recomputing.
    pub fn current(&self) -> Arc<QueryResult> {
        self.result.borrow().clone()
    }

    /// Returns the sequence id of the last applied change event.
    pub fn last_applied(&self) -> Option<SequenceId> {
        self.state.lock().last_applied
    }

    /// Returns true if the instance has completed at least one execution.
    pub fn has_executed(&self) -> bool {
        self.last_applied().is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(AtomicOrdering::SeqCst)
    }

    pub fn add_subscriber(&self) {
        self.subscribers.fetch_add(1, AtomicOrdering::SeqCst);
    }

    /// Decrements the subscriber count, never below zero.
    pub fn remove_subscriber(&self) {
        let _ = self
            .subscribers
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn stats(&self) -> QueryStats {
        let state = self.state.lock();
        QueryStats {
            id: self.id,
            last_applied: state.last_applied,
            exec_over_database: self.exec_over_database.load(AtomicOrdering::SeqCst),
            subscribers: self.subscriber_count(),
            last_ensure_equal: state.last_ensure_equal,
        }
    }

    /// Returns true once the instance or its collection is torn down.
    pub fn is_destroyed(&self) -> bool {
        *self.destroyed.borrow() || self.ctx.is_closed()
    }

    /// Stops all further recomputation. Results of in-flight executions are
    /// discarded and every result stream ends. Tearing down the collection
    /// has the same effect on all of its queries.
    pub fn destroy(&self) {
        if !self.destroyed.send_replace(true) {
            debug!(query = self.id, collection = %self.ctx.name, "query instance destroyed");
        }
    }

    fn check_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            Err(Error::destroyed(self.ctx.name.as_ref()))
        } else {
            Ok(())
        }
    }

    fn applied_through(state: &State, counter: SequenceId) -> bool {
        state.last_applied.map_or(false, |last| last >= counter)
    }

    /// Brings the cached result up to date with the collection.
    ///
    /// Returns whether the result changed. Concurrent callers share one
    /// recomputation pass: a caller queued behind a pass takes its outcome,
    /// failure included, and only starts a pass of its own if a successful
    /// one still left writes it observed unapplied.
    pub async fn ensure_equal(&self) -> Result<bool> {
        self.check_alive()?;
        let (ticket, target) = {
            let mut state = self.state.lock();
            state.last_ensure_equal = Some(Instant::now());
            let target = self.ctx.buffer.counter();
            if Self::applied_through(&state, target) {
                trace!(query = self.id, "query already in sync");
                return Ok(false);
            }
            (state.passes_completed, target)
        };

        let _pass = self.recompute.lock().await;
        self.check_alive()?;
        {
            let state = self.state.lock();
            if state.passes_completed > ticket {
                match &state.last_outcome {
                    Some(Err(err)) => {
                        trace!(query = self.id, error = %err, "sharing failed pass");
                        return Err(err.clone());
                    }
                    Some(Ok(changed)) if Self::applied_through(&state, target) => return Ok(*changed),
                    _ => {}
                }
            } else if Self::applied_through(&state, target) {
                return Ok(false);
            }
        }

        let outcome = self.recompute_pass().await;
        let mut state = self.state.lock();
        state.passes_completed += 1;
        state.last_outcome = Some(outcome.clone());
        outcome
    }

    async fn recompute_pass(&self) -> Result<bool> {
        let prepared = self.prepared()?;
        let Some(last) = self.last_applied() else {
            debug!(query = self.id, reason = "never executed", "full query execution");
            return self.execute_full(prepared).await;
        };

        let (events, counter) = self.ctx.buffer.snapshot_from(last + 1);
        let Some(events) = events else {
            debug!(query = self.id, last_applied = last, reason = "buffer overflow", "full query execution");
            return self.execute_full(prepared).await;
        };

        let current = self.current();
        match prepared.reduce.reduce(current.docs(), events.iter().map(|e| e.as_ref()))? {
            ReduceOutcome::Unchanged => {
                trace!(query = self.id, events = events.len(), "events do not affect result");
                self.commit(None, counter)
            }
            ReduceOutcome::Changed(docs) => {
                debug!(query = self.id, events = events.len(), found = docs.len(), "incremental result applied");
                self.commit(Some(docs), counter)
            }
            ReduceOutcome::MustReExecute(reason) => {
                debug!(query = self.id, %reason, "full query execution");
                self.execute_full(prepared).await
            }
        }
    }

    async fn execute_full(&self, prepared: &Prepared) -> Result<bool> {
        // Events appended while the executor runs stay unapplied
        let counter = self.ctx.buffer.counter();
        self.exec_over_database.fetch_add(1, AtomicOrdering::SeqCst);
        let docs = self
            .ctx
            .executor
            .execute_query(&self.ctx.name, &prepared.query, None)
            .await?;

        verify_sorted_by(&docs, &*prepared.comparator)?;

        let changed = self.current().docs() != docs.as_slice();
        self.commit(changed.then_some(docs), counter)
    }

    /// Records `counter` as applied and publishes `docs` if given.
    fn commit(&self, docs: Option<Vec<Document>>, counter: SequenceId) -> Result<bool> {
        if self.is_destroyed() {
            debug!(query = self.id, "discarding result of destroyed query");
            return Err(Error::destroyed(self.ctx.name.as_ref()));
        }
        self.state.lock().last_applied = Some(counter);
        match docs {
            Some(docs) => {
                self.result.send_replace(Arc::new(QueryResult::new(docs)));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Runs `ensure_equal` and returns the up to date result.
    pub async fn exec(&self) -> Result<Arc<QueryResult>> {
        self.ensure_equal().await?;
        Ok(self.current())
    }

    /// Returns the document of a `findOne` query, failing if there is none.
    pub async fn exec_required(&self) -> Result<Document> {
        if self.op() != QueryOp::FindOne {
            return Err(Error::invalid_operation("exec_required is only defined for findOne"));
        }
        let result = self.exec().await?;
        result
            .first()
            .cloned()
            .ok_or_else(|| Error::document_not_found(self.ctx.name.as_ref(), self.descriptor.canonical()))
    }

    /// Streams the result: the current value first, then every changed value.
    ///
    /// Any write to the collection triggers `ensure_equal`; only actual
    /// changes are emitted. A failed recomputation is emitted as an error
    /// and the stream continues. The stream ends when the instance is
    /// destroyed. While it is alive it counts as a subscriber.
    pub fn results(self: &Arc<Self>) -> impl Stream<Item = Result<Arc<QueryResult>>> + Send + 'static {
        let this = Arc::clone(self);
        async_stream::stream! {
            let _guard = SubscriberGuard::new(Arc::clone(&this));
            let mut results = this.result.subscribe();
            let mut writes = this.ctx.writes.subscribe();
            let mut destroyed = this.destroyed.subscribe();
            let mut closed = this.ctx.closed();

            let mut open = true;
            let mut last_emitted = None;
            match this.ensure_equal().await {
                Ok(_) => {
                    let current = results.borrow_and_update().clone();
                    last_emitted = Some(Arc::clone(&current));
                    yield Ok(current);
                }
                Err(err) if this.is_destroyed() => {
                    trace!(query = this.id, error = %err, "result stream closed");
                    open = false;
                }
                Err(err) => yield Err(err),
            }

            while open {
                let wake = tokio::select! {
                    changed = results.changed() => match changed {
                        Ok(()) => Wake::Result,
                        Err(_) => Wake::Closed,
                    },
                    write = writes.recv() => match write {
                        Ok(_) | Err(RecvError::Lagged(_)) => Wake::Write,
                        Err(RecvError::Closed) => Wake::Closed,
                    },
                    _ = destroyed.changed() => Wake::Closed,
                    _ = closed.changed() => Wake::Closed,
                };
                match wake {
                    Wake::Result => {
                        let next = results.borrow_and_update().clone();
                        let repeated = last_emitted.as_ref().map_or(false, |last| Arc::ptr_eq(last, &next));
                        if !repeated {
                            last_emitted = Some(Arc::clone(&next));
                            yield Ok(next);
                        }
                    }
                    Wake::Write => {
                        if let Err(err) = this.ensure_equal().await {
                            if this.is_destroyed() {
                                open = false;
                            } else {
                                yield Err(err);
                            }
                        }
                    }
                    Wake::Closed => open = false,
                }
            }
        }
    }

    /// Like `results`, with every value expressed as a change against the
    /// previously emitted one. The first item contains the whole result as
    /// additions.
    pub fn changes(self: &Arc<Self>) -> impl Stream<Item = Result<ChangeSet>> + Send + 'static {
        let results = self.results();
        async_stream::stream! {
            let mut results = Box::pin(results);
            let mut previous: Option<Arc<QueryResult>> = None;
            while let Some(item) = results.next().await {
                match item {
                    Ok(result) => {
                        let changes = match &previous {
                            Some(old) => ChangeSet::between(old, Arc::clone(&result)),
                            None => ChangeSet::initial(Arc::clone(&result)),
                        };
                        previous = Some(result);
                        yield Ok(changes);
                    }
                    Err(err) => yield Err(err),
                }
            }
        }
    }

    /// Delivers every change set to `callback` on a spawned task.
    pub fn subscribe<F>(self: &Arc<Self>, callback: F) -> Subscription
    where
        F: FnMut(Result<ChangeSet>) + Send + 'static,
    {
        Subscription::spawn(self.changes(), Box::new(callback))
    }

    /// Adds a condition on `field` using the installed query builder.
    pub fn where_field(&self, field: &str, condition: Value) -> Result<MangoQuery> {
        self.ctx
            .builder
            .where_field(self.descriptor.query(), field, condition)
    }

    /// Appends sort parts using the installed query builder.
    pub fn sort(&self, order: &str) -> Result<MangoQuery> {
        self.ctx.builder.sort(self.descriptor.query(), order)
    }

    pub fn skip(&self, skip: usize) -> Result<MangoQuery> {
        self.ctx.builder.skip(self.descriptor.query(), skip)
    }

    pub fn limit(&self, limit: usize) -> Result<MangoQuery> {
        self.ctx.builder.limit(self.descriptor.query(), limit)
    }
}

impl fmt::Debug for QueryInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryInstance")
            .field("id", &self.id)
            .field("collection", &self.ctx.name)
            .field("descriptor", &self.descriptor.canonical())
            .field("last_applied", &self.last_applied())
            .finish_non_exhaustive()
    }
}
