//! Change events emitted by the write path.
//!
//! A `ChangeEvent` records one committed write with enough information to
//! re-evaluate query membership locally: the document state before and after.

use crate::document::{Document, PrimaryKey};

/// Position of an event in its collection's commit order. The first event
/// of a collection has sequence 1.
pub type SequenceId = u64;

/// The kind of write an event records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// A new document was inserted.
    Insert,
    /// An existing document was replaced.
    Update,
    /// A document was deleted.
    Delete,
}

/// An immutable record of one committed write.
///
/// `previous_doc` is absent for inserts, `current_doc` is absent for deletes.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    sequence_id: SequenceId,
    collection: String,
    doc_id: PrimaryKey,
    kind: ChangeKind,
    previous_doc: Option<Document>,
    current_doc: Option<Document>,
}

impl ChangeEvent {
    /// Creates an event with its sequence id already assigned. The change
    /// event buffer is the only producer outside of tests.
    pub fn stamped(
        sequence_id: SequenceId,
        collection: impl Into<String>,
        kind: ChangeKind,
        previous_doc: Option<Document>,
        current_doc: Option<Document>,
    ) -> Self {
        let doc_id = current_doc
            .as_ref()
            .or(previous_doc.as_ref())
            .map(|d| d.primary().clone())
            .unwrap_or_else(|| PrimaryKey::new(""));
        Self {
            sequence_id,
            collection: collection.into(),
            doc_id,
            kind,
            previous_doc,
            current_doc,
        }
    }

    /// Returns the sequence id.
    #[inline]
    pub fn sequence_id(&self) -> SequenceId {
        self.sequence_id
    }

    /// Returns the collection name.
    #[inline]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns the primary key of the written document.
    #[inline]
    pub fn doc_id(&self) -> &PrimaryKey {
        &self.doc_id
    }

    /// Returns the kind of write.
    #[inline]
    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    /// Returns the document state before the write.
    #[inline]
    pub fn previous_doc(&self) -> Option<&Document> {
        self.previous_doc.as_ref()
    }

    /// Returns the document state after the write.
    #[inline]
    pub fn current_doc(&self) -> Option<&Document> {
        self.current_doc.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, age: i64) -> Document {
        Document::new("id", json!({"id": id, "age": age})).unwrap()
    }

    #[test]
    fn test_change_event_insert() {
        let ev = ChangeEvent::stamped(1, "users", ChangeKind::Insert, None, Some(doc("a", 1)));
        assert_eq!(ev.sequence_id(), 1);
        assert_eq!(ev.doc_id().as_str(), "a");
        assert!(ev.previous_doc().is_none());
        assert_eq!(ev.collection(), "users");
    }

    #[test]
    fn test_change_event_delete_takes_key_from_previous() {
        let ev = ChangeEvent::stamped(7, "users", ChangeKind::Delete, Some(doc("b", 2)), None);
        assert_eq!(ev.doc_id().as_str(), "b");
        assert!(ev.current_doc().is_none());
        assert_eq!(ev.kind(), ChangeKind::Delete);
    }
}
