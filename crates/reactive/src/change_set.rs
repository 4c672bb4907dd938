//! Change set for tracking query result changes.
//!
//! A ChangeSet represents the difference between two query results,
//! containing added, removed, and modified documents.

use crate::result::QueryResult;
use std::sync::Arc;
use vela_core::Document;

/// A set of changes to a query result.
///
/// This struct tracks:
/// - `added`: documents that entered the result
/// - `removed`: documents that left the result
/// - `modified`: documents whose content changed (old value, new value)
/// - `current_result`: the complete result after the change
#[derive(Clone, Debug, Default)]
pub struct ChangeSet {
    /// Documents that entered the result
    pub added: Vec<Document>,
    /// Documents that left the result
    pub removed: Vec<Document>,
    /// Documents that stayed but changed (old, new)
    pub modified: Vec<(Document, Document)>,
    /// The complete result after applying the changes
    pub current_result: Arc<QueryResult>,
}

impl ChangeSet {
    /// Creates a new empty change set.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a change set representing an initial result.
    ///
    /// All documents are treated as additions.
    pub fn initial(result: Arc<QueryResult>) -> Self {
        Self {
            added: result.docs().to_vec(),
            removed: Vec::new(),
            modified: Vec::new(),
            current_result: result,
        }
    }

    /// Computes the difference between two results by primary key.
    ///
    /// Added and modified documents follow the order of `new`, removed ones
    /// the order of `old`. Pure reorderings produce no entries.
    pub fn between(old: &QueryResult, new: Arc<QueryResult>) -> Self {
        let mut changes = Self::new();
        for doc in new.docs() {
            match old.get(doc.primary()) {
                None => changes.added.push(doc.clone()),
                Some(before) if before != doc => changes.modified.push((before.clone(), doc.clone())),
                Some(_) => {}
            }
        }
        changes.removed = old
            .docs()
            .iter()
            .filter(|d| !new.contains(d.primary()))
            .cloned()
            .collect();
        changes.current_result = new;
        changes
    }

    /// Returns true if there are no changes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Returns the total number of changes.
    #[inline]
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, value: i64) -> Document {
        Document::new("id", json!({"id": id, "v": value})).unwrap()
    }

    fn result(docs: Vec<Document>) -> Arc<QueryResult> {
        Arc::new(QueryResult::new(docs))
    }

    #[test]
    fn test_change_set_new() {
        let cs = ChangeSet::new();
        assert!(cs.is_empty());
        assert_eq!(cs.len(), 0);
        assert!(cs.current_result.is_empty());
    }

    #[test]
    fn test_change_set_initial() {
        let cs = ChangeSet::initial(result(vec![doc("a", 1), doc("b", 2)]));
        assert_eq!(cs.added.len(), 2);
        assert!(cs.removed.is_empty());
        assert_eq!(cs.current_result.len(), 2);
    }

    #[test]
    fn test_change_set_between() {
        let old = QueryResult::new(vec![doc("a", 1), doc("b", 2), doc("c", 3)]);
        let new = result(vec![doc("b", 2), doc("c", 30), doc("d", 4)]);
        let cs = ChangeSet::between(&old, new);

        assert_eq!(cs.added, vec![doc("d", 4)]);
        assert_eq!(cs.removed, vec![doc("a", 1)]);
        assert_eq!(cs.modified, vec![(doc("c", 3), doc("c", 30))]);
        assert_eq!(cs.len(), 3);
        assert_eq!(cs.current_result.keys(), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_reorder_is_not_a_change() {
        let old = QueryResult::new(vec![doc("a", 1), doc("b", 2)]);
        let cs = ChangeSet::between(&old, result(vec![doc("b", 2), doc("a", 1)]));
        assert!(cs.is_empty());
    }
}
