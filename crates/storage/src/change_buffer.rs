//! Bounded per-collection change event buffer.
//!
//! The buffer is the sequence authority of its collection: it stamps every
//! appended event with `counter + 1`. Once full, the oldest event is evicted
//! on each append. A reader that asks for events older than the oldest
//! retained one gets `None` and must fall back to a full query execution.

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::trace;
use vela_core::{ChangeEvent, ChangeKind, Document, SequenceId};

struct Inner {
    counter: SequenceId,
    events: VecDeque<Arc<ChangeEvent>>,
}

impl Inner {
    /// Sequence id of the oldest retained event, or `counter + 1` if empty.
    fn first_available(&self) -> SequenceId {
        self.counter + 1 - self.events.len() as SequenceId
    }

    fn get_from(&self, start: SequenceId) -> Option<Vec<Arc<ChangeEvent>>> {
        let first = self.first_available();
        if start < first && first > 1 {
            return None;
        }
        let skip = start.saturating_sub(first) as usize;
        Some(self.events.iter().skip(skip).cloned().collect())
    }
}

/// Append-only, capacity-bounded sequence of change events.
pub struct ChangeEventBuffer {
    collection: String,
    capacity: usize,
    inner: RwLock<Inner>,
}

impl ChangeEventBuffer {
    /// Creates an empty buffer. A capacity of zero is raised to one.
    pub fn new(collection: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            collection: collection.into(),
            capacity,
            inner: RwLock::new(Inner {
                counter: 0,
                events: VecDeque::with_capacity(capacity),
            }),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the sequence id of the most recently appended event, 0 if none.
    pub fn counter(&self) -> SequenceId {
        self.inner.read().counter
    }

    /// Returns the number of retained events.
    pub fn len(&self) -> usize {
        self.inner.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().events.is_empty()
    }

    /// Returns the sequence id of the oldest retained event.
    pub fn oldest_sequence(&self) -> Option<SequenceId> {
        self.inner.read().events.front().map(|e| e.sequence_id())
    }

    /// Stamps and appends an event, evicting the oldest one if full.
    pub fn append(
        &self,
        kind: ChangeKind,
        previous_doc: Option<Document>,
        current_doc: Option<Document>,
    ) -> Arc<ChangeEvent> {
        let mut inner = self.inner.write();
        inner.counter += 1;
        let event = Arc::new(ChangeEvent::stamped(
            inner.counter,
            self.collection.as_str(),
            kind,
            previous_doc,
            current_doc,
        ));
        if inner.events.len() == self.capacity {
            if let Some(evicted) = inner.events.pop_front() {
                trace!(
                    collection = %self.collection,
                    sequence = evicted.sequence_id(),
                    "change event evicted"
                );
            }
        }
        inner.events.push_back(event.clone());
        event
    }

    /// Returns every event with `sequence_id >= start`, in commit order.
    ///
    /// Returns `None` if an event at or after `start` has been evicted.
    pub fn get_from(&self, start: SequenceId) -> Option<Vec<Arc<ChangeEvent>>> {
        self.inner.read().get_from(start)
    }

    /// Like `get_from`, together with the counter observed at the same time.
    pub fn snapshot_from(&self, start: SequenceId) -> (Option<Vec<Arc<ChangeEvent>>>, SequenceId) {
        let inner = self.inner.read();
        (inner.get_from(start), inner.counter)
    }

    /// Keeps only the last event of each document, in commit order.
    pub fn reduce_by_last_of_doc(events: &[Arc<ChangeEvent>]) -> Vec<Arc<ChangeEvent>> {
        let mut seen = hashbrown::HashSet::new();
        let mut out: Vec<Arc<ChangeEvent>> = events
            .iter()
            .rev()
            .filter(|e| seen.insert(e.doc_id().clone()))
            .cloned()
            .collect();
        out.reverse();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, v: i64) -> Document {
        Document::new("id", json!({"id": id, "v": v})).unwrap()
    }

    fn fill(buffer: &ChangeEventBuffer, n: usize) {
        for i in 0..n {
            buffer.append(ChangeKind::Insert, None, Some(doc(&format!("d{}", i), i as i64)));
        }
    }

    fn seqs(events: &[Arc<ChangeEvent>]) -> Vec<SequenceId> {
        events.iter().map(|e| e.sequence_id()).collect()
    }

    #[test]
    fn test_append_stamps_sequence() {
        let buffer = ChangeEventBuffer::new("users", 10);
        assert_eq!(buffer.counter(), 0);
        let first = buffer.append(ChangeKind::Insert, None, Some(doc("a", 1)));
        let second = buffer.append(ChangeKind::Delete, Some(doc("a", 1)), None);
        assert_eq!(first.sequence_id(), 1);
        assert_eq!(second.sequence_id(), 2);
        assert_eq!(second.collection(), "users");
        assert_eq!(buffer.counter(), 2);
    }

    #[test]
    fn test_get_from_is_inclusive() {
        let buffer = ChangeEventBuffer::new("c", 10);
        fill(&buffer, 5);
        assert_eq!(seqs(&buffer.get_from(3).unwrap()), vec![3, 4, 5]);
        assert_eq!(seqs(&buffer.get_from(1).unwrap()), vec![1, 2, 3, 4, 5]);
        assert_eq!(seqs(&buffer.get_from(0).unwrap()), vec![1, 2, 3, 4, 5]);
        assert!(buffer.get_from(6).unwrap().is_empty());
        assert!(buffer.get_from(60).unwrap().is_empty());
    }

    #[test]
    fn test_eviction_reports_none() {
        let buffer = ChangeEventBuffer::new("c", 3);
        fill(&buffer, 5);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.oldest_sequence(), Some(3));
        assert_eq!(buffer.counter(), 5);
        assert!(buffer.get_from(2).is_none());
        assert_eq!(seqs(&buffer.get_from(3).unwrap()), vec![3, 4, 5]);
    }

    #[test]
    fn test_scenario_d_overflow() {
        let buffer = ChangeEventBuffer::new("c", 100);
        fill(&buffer, 205);
        assert!(buffer.get_from(6).is_none());
        let (events, counter) = buffer.snapshot_from(106);
        assert_eq!(counter, 205);
        assert_eq!(events.unwrap().len(), 100);
    }

    #[test]
    fn test_empty_buffer() {
        let buffer = ChangeEventBuffer::new("c", 0);
        assert_eq!(buffer.capacity(), 1);
        assert!(buffer.is_empty());
        assert_eq!(buffer.get_from(1), Some(vec![]));
        assert_eq!(buffer.oldest_sequence(), None);
    }

    #[test]
    fn test_reduce_by_last_of_doc() {
        let buffer = ChangeEventBuffer::new("c", 10);
        buffer.append(ChangeKind::Insert, None, Some(doc("a", 1)));
        buffer.append(ChangeKind::Insert, None, Some(doc("b", 1)));
        buffer.append(ChangeKind::Update, Some(doc("a", 1)), Some(doc("a", 2)));
        let events = buffer.get_from(1).unwrap();
        let reduced = ChangeEventBuffer::reduce_by_last_of_doc(&events);
        assert_eq!(seqs(&reduced), vec![2, 3]);
    }
}
