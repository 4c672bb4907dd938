//! Per-document compaction of a batch of change events.
//!
//! Several writes to the same document inside one batch collapse into a
//! single change carrying the state before the first write and the state
//! after the last one.

use hashbrown::HashMap;
use vela_core::{ChangeEvent, Document, PrimaryKey};

/// The net effect of a batch on one document.
#[derive(Clone, Debug, PartialEq)]
pub struct DocChange {
    doc_id: PrimaryKey,
    /// State before the first write of the batch.
    previous: Option<Document>,
    /// State after the last write of the batch.
    current: Option<Document>,
}

impl DocChange {
    #[inline]
    pub fn doc_id(&self) -> &PrimaryKey {
        &self.doc_id
    }

    #[inline]
    pub fn previous(&self) -> Option<&Document> {
        self.previous.as_ref()
    }

    #[inline]
    pub fn current(&self) -> Option<&Document> {
        self.current.as_ref()
    }

    /// Returns true if the document did not exist before and does not exist
    /// after the batch.
    pub fn is_transient(&self) -> bool {
        self.previous.is_none() && self.current.is_none()
    }
}

/// Compacted changes of a batch, in order of each document's first write.
#[derive(Clone, Debug, Default)]
pub struct BatchDiff {
    order: Vec<PrimaryKey>,
    changes: HashMap<PrimaryKey, DocChange>,
}

impl BatchDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compacts events given in commit order.
    pub fn from_events<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = &'a ChangeEvent>,
    {
        let mut diff = Self::new();
        for event in events {
            diff.record(event);
        }
        diff
    }

    /// Folds one event into the diff.
    pub fn record(&mut self, event: &ChangeEvent) {
        match self.changes.get_mut(event.doc_id()) {
            // Keep the original previous state, take the newest current state
            Some(change) => change.current = event.current_doc().cloned(),
            None => {
                self.order.push(event.doc_id().clone());
                self.changes.insert(
                    event.doc_id().clone(),
                    DocChange {
                        doc_id: event.doc_id().clone(),
                        previous: event.previous_doc().cloned(),
                        current: event.current_doc().cloned(),
                    },
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, doc_id: &PrimaryKey) -> Option<&DocChange> {
        self.changes.get(doc_id)
    }

    /// Iterates the compacted changes in first-write order.
    pub fn iter(&self) -> impl Iterator<Item = &DocChange> + '_ {
        self.order.iter().filter_map(move |id| self.changes.get(id))
    }
}
