//! Callback subscriptions for live queries.
//!
//! A `Subscription` drives a query's change stream on a tokio task and hands
//! every item to a callback. Dropping the handle or calling `unsubscribe`
//! stops the task; this only affects the query's subscriber count, never the
//! correctness of its result.

use crate::change_set::ChangeSet;
use crate::query::QueryInstance;
use futures::{Stream, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use vela_core::Result;

/// Unique identifier for a subscription.
pub type SubscriptionId = u64;

/// Callback type for change notifications.
pub type ChangeCallback = Box<dyn FnMut(Result<ChangeSet>) + Send + 'static>;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Counts one subscriber of a query for as long as it is alive.
pub(crate) struct SubscriberGuard {
    instance: Arc<QueryInstance>,
}

impl SubscriberGuard {
    pub(crate) fn new(instance: Arc<QueryInstance>) -> Self {
        instance.add_subscriber();
        Self { instance }
    }
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.instance.remove_subscriber();
    }
}

/// A running subscription to query changes.
pub struct Subscription {
    /// Unique identifier
    id: SubscriptionId,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Spawns a task that forwards `stream` to `callback` until the stream
    /// ends. Must be called inside a tokio runtime.
    pub(crate) fn spawn<S>(stream: S, mut callback: ChangeCallback) -> Self
    where
        S: Stream<Item = Result<ChangeSet>> + Send + 'static,
    {
        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
        let task = tokio::spawn(async move {
            let mut stream = Box::pin(stream);
            while let Some(item) = stream.next().await {
                callback(item);
            }
        });
        Self { id, task }
    }

    /// Returns the subscription ID.
    #[inline]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns whether the forwarding task is still running.
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops delivering changes.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn test_subscription_delivers_items() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let items = stream::iter(vec![Ok::<_, vela_core::Error>(ChangeSet::new()), Ok(ChangeSet::new())]);
        let sub = Subscription::spawn(
            items,
            Box::new(move |item: Result<ChangeSet>| sink.lock().push(item.is_ok())),
        );
        for _ in 0..100 {
            if !sub.is_active() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!sub.is_active());
        assert_eq!(*seen.lock(), vec![true, true]);
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let a = Subscription::spawn(stream::empty::<Result<ChangeSet>>(), Box::new(|_: Result<ChangeSet>| {}));
        let b = Subscription::spawn(stream::empty::<Result<ChangeSet>>(), Box::new(|_: Result<ChangeSet>| {}));
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_task() {
        let sub = Subscription::spawn(stream::pending::<Result<ChangeSet>>(), Box::new(|_: Result<ChangeSet>| {}));
        assert!(sub.is_active());
        sub.unsubscribe();
    }
}
