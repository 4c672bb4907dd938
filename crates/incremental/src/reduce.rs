//! The EventReduce engine.
//!
//! Given a query's current ordered result and the events it has not seen
//! yet, computes the new result locally or reports that only a full
//! execution against storage can produce it. The engine never touches
//! storage and has no side effects.
//!
//! Each compacted document change is applied against the evolving result.
//! With a skip/limit window, a change is applied only when the window's new
//! contents are fully determined by the cached slice:
//!
//! - a removal from a full window needs the next document after the window;
//! - with `skip > 0`, a change sorting before the first cached document
//!   shifts the window by one;
//! - an insertion after the last document of a full window is invisible.

use crate::compaction::{BatchDiff, DocChange};
use core::cmp::Ordering;
use core::fmt;
use tracing::trace;
use vela_core::{ChangeEvent, Document, Result};
use vela_query::{insertion_point_by, DeterministicSortComparator, QueryMatcher};

/// The skip/limit window of a query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Window {
    pub skip: usize,
    pub limit: Option<usize>,
}

impl Window {
    pub fn new(skip: usize, limit: Option<usize>) -> Self {
        Self { skip, limit }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Returns true if the window cuts the match set at either end.
    #[inline]
    pub fn is_bounded(&self) -> bool {
        self.skip > 0 || self.limit.is_some()
    }

    /// Returns true if a result of `len` documents fills the window.
    #[inline]
    pub fn is_full(&self, len: usize) -> bool {
        self.limit.map_or(false, |limit| len >= limit)
    }
}

/// Why a batch could not be applied locally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReExecuteReason {
    /// A document left a full window; its replacement lies outside the cache.
    RemovedFromFullWindow,
    /// A change sorts into the skipped region and shifts the window.
    BeforeWindow,
    /// A previously matching document is missing from where it must be.
    InconsistentPosition,
}

impl fmt::Display for ReExecuteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReExecuteReason::RemovedFromFullWindow => "removed from full window",
            ReExecuteReason::BeforeWindow => "change before window",
            ReExecuteReason::InconsistentPosition => "inconsistent position",
        };
        f.write_str(s)
    }
}

/// Outcome of reducing a batch of events.
#[derive(Clone, Debug, PartialEq)]
pub enum ReduceOutcome {
    /// The result is unaffected.
    Unchanged,
    /// The new ordered result.
    Changed(Vec<Document>),
    /// Only a full execution can determine the result.
    MustReExecute(ReExecuteReason),
}

impl ReduceOutcome {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, ReduceOutcome::Unchanged)
    }

    pub fn must_re_execute(&self) -> bool {
        matches!(self, ReduceOutcome::MustReExecute(_))
    }
}

enum Step {
    Applied,
    ReExecute(ReExecuteReason),
}

enum Placement {
    BeforeWindow,
    At(usize),
}

/// Incremental result maintenance for one query.
#[derive(Clone)]
pub struct EventReduce {
    window: Window,
    matcher: QueryMatcher,
    comparator: DeterministicSortComparator,
}

impl fmt::Debug for EventReduce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventReduce")
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl EventReduce {
    pub fn new(window: Window, matcher: QueryMatcher, comparator: DeterministicSortComparator) -> Self {
        Self {
            window,
            matcher,
            comparator,
        }
    }

    #[inline]
    pub fn window(&self) -> Window {
        self.window
    }

    /// Reduces events given in commit order against `current`.
    ///
    /// Fails only if the comparator cannot order two distinct documents.
    pub fn reduce<'a, I>(&self, current: &[Document], events: I) -> Result<ReduceOutcome>
    where
        I: IntoIterator<Item = &'a ChangeEvent>,
    {
        let diff = BatchDiff::from_events(events);
        self.reduce_diff(current, &diff)
    }

    /// Reduces an already compacted batch.
    pub fn reduce_diff(&self, current: &[Document], diff: &BatchDiff) -> Result<ReduceOutcome> {
        if diff.is_empty() {
            return Ok(ReduceOutcome::Unchanged);
        }
        let mut result = current.to_vec();
        for change in diff.iter() {
            if let Step::ReExecute(reason) = self.step(&mut result, change)? {
                trace!(doc = %change.doc_id(), %reason, "event reduce needs full execution");
                return Ok(ReduceOutcome::MustReExecute(reason));
            }
        }
        if result.as_slice() == current {
            Ok(ReduceOutcome::Unchanged)
        } else {
            Ok(ReduceOutcome::Changed(result))
        }
    }

    fn step(&self, result: &mut Vec<Document>, change: &DocChange) -> Result<Step> {
        let position = result.iter().position(|d| d.primary() == change.doc_id());
        let previous_matched = change.previous().map_or(false, |d| (self.matcher)(d));
        let was_matching = position.is_some() || previous_matched;
        let now = change.current().filter(|d| (self.matcher)(*d));

        match (was_matching, now) {
            (false, None) => Ok(Step::Applied),
            (false, Some(doc)) => self.insert(result, doc, false),
            (true, None) => match position {
                Some(at) => self.remove_at(result, at),
                None => self.remove_outside(result, change.previous()),
            },
            (true, Some(doc)) => match position {
                Some(at) => {
                    let was_full = self.window.is_full(result.len());
                    result.remove(at);
                    self.insert(result, doc, was_full)
                }
                None => match self.remove_outside(result, change.previous())? {
                    Step::Applied => self.insert(result, doc, false),
                    reexecute => Ok(reexecute),
                },
            },
        }
    }

    /// Removes the document at `at` from the result.
    fn remove_at(&self, result: &mut Vec<Document>, at: usize) -> Result<Step> {
        if self.window.is_full(result.len()) {
            return Ok(Step::ReExecute(ReExecuteReason::RemovedFromFullWindow));
        }
        result.remove(at);
        Ok(Step::Applied)
    }

    /// Handles a previously matching document that is not in the result.
    fn remove_outside(&self, result: &[Document], previous: Option<&Document>) -> Result<Step> {
        if self.window.skip == 0 {
            // Either after the window or already removed
            return Ok(Step::Applied);
        }
        let (Some(previous), Some(first), Some(last)) = (previous, result.first(), result.last()) else {
            return Ok(Step::ReExecute(ReExecuteReason::BeforeWindow));
        };
        if (self.comparator)(previous, first)? == Ordering::Less {
            return Ok(Step::ReExecute(ReExecuteReason::BeforeWindow));
        }
        if (self.comparator)(previous, last)? == Ordering::Greater {
            return Ok(Step::Applied);
        }
        Ok(Step::ReExecute(ReExecuteReason::InconsistentPosition))
    }

    /// Inserts a matching document. `left_full_window` is set when the
    /// document was just taken out of a full window and must land inside it.
    fn insert(&self, result: &mut Vec<Document>, doc: &Document, left_full_window: bool) -> Result<Step> {
        let at = match self.place(result, doc)? {
            Placement::BeforeWindow => return Ok(Step::ReExecute(ReExecuteReason::BeforeWindow)),
            Placement::At(at) => at,
        };
        if at == result.len() {
            if left_full_window {
                return Ok(Step::ReExecute(ReExecuteReason::RemovedFromFullWindow));
            }
            if self.window.is_full(result.len()) {
                return Ok(Step::Applied);
            }
        }
        result.insert(at, doc.clone());
        if let Some(limit) = self.window.limit {
            result.truncate(limit);
        }
        Ok(Step::Applied)
    }

    fn place(&self, result: &[Document], doc: &Document) -> Result<Placement> {
        if self.window.skip > 0 {
            match result.first() {
                None => return Ok(Placement::BeforeWindow),
                Some(first) if (self.comparator)(doc, first)? == Ordering::Less => {
                    return Ok(Placement::BeforeWindow)
                }
                Some(_) => {}
            }
        }
        insertion_point_by(result, doc, &*self.comparator).map(Placement::At)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vela_core::{ChangeKind, Error};
    use vela_query::{MangoQuery, MangoStatics, Schema, SortPart, StorageStatics};

    fn doc(id: &str, age: i64) -> Document {
        Document::new("id", json!({"id": id, "age": age})).unwrap()
    }

    fn engine(selector: serde_json::Value, window: Window) -> EventReduce {
        let schema = Schema::new("id");
        let query = MangoQuery::new().selector(selector).sort_by(SortPart::asc("age"));
        let prepared = MangoStatics.prepare_query(&schema, &query).unwrap();
        EventReduce::new(
            window,
            MangoStatics.query_matcher(&schema, &prepared).unwrap(),
            MangoStatics.sort_comparator(&schema, &prepared).unwrap(),
        )
    }

    fn insert(seq: u64, d: Document) -> ChangeEvent {
        ChangeEvent::stamped(seq, "c", ChangeKind::Insert, None, Some(d))
    }

    fn update(seq: u64, old: Document, new: Document) -> ChangeEvent {
        ChangeEvent::stamped(seq, "c", ChangeKind::Update, Some(old), Some(new))
    }

    fn delete(seq: u64, old: Document) -> ChangeEvent {
        ChangeEvent::stamped(seq, "c", ChangeKind::Delete, Some(old), None)
    }

    fn ids(outcome: &ReduceOutcome) -> Vec<String> {
        match outcome {
            ReduceOutcome::Changed(docs) => docs.iter().map(|d| d.primary().to_string()).collect(),
            other => panic!("expected Changed, got {:?}", other),
        }
    }

    #[test]
    fn test_inserts_into_unbounded_query() {
        let e = engine(json!({"age": {"$gt": 10}}), Window::unbounded());
        let events = vec![insert(1, doc("a", 5)), insert(2, doc("b", 15)), insert(3, doc("c", 20))];
        let out = e.reduce(&[], &events).unwrap();
        assert_eq!(ids(&out), vec!["b", "c"]);
    }

    #[test]
    fn test_non_matching_insert_is_unchanged() {
        let e = engine(json!({"age": {"$gt": 10}}), Window::unbounded());
        let out = e.reduce(&[doc("b", 15)], &[insert(4, doc("x", 1))]).unwrap();
        assert_eq!(out, ReduceOutcome::Unchanged);
        assert_eq!(e.reduce(&[doc("b", 15)], &[]).unwrap(), ReduceOutcome::Unchanged);
    }

    #[test]
    fn test_update_repositions_and_removes() {
        let e = engine(json!({"age": {"$gt": 10}}), Window::unbounded());
        let current = vec![doc("a", 11), doc("b", 12), doc("c", 13)];
        let out = e.reduce(&current, &[update(1, doc("a", 11), doc("a", 20))]).unwrap();
        assert_eq!(ids(&out), vec!["b", "c", "a"]);
        let out = e.reduce(&current, &[update(1, doc("b", 12), doc("b", 2))]).unwrap();
        assert_eq!(ids(&out), vec!["a", "c"]);
        let out = e.reduce(&current, &[delete(1, doc("c", 13))]).unwrap();
        assert_eq!(ids(&out), vec!["a", "b"]);
    }

    #[test]
    fn test_removal_from_full_window_reexecutes() {
        let e = engine(json!({}), Window::new(0, Some(2)));
        let current = vec![doc("a", 1), doc("b", 2)];
        let out = e.reduce(&current, &[delete(4, doc("a", 1))]).unwrap();
        assert_eq!(out, ReduceOutcome::MustReExecute(ReExecuteReason::RemovedFromFullWindow));
    }

    #[test]
    fn test_removal_from_partial_window_is_local() {
        let e = engine(json!({}), Window::new(0, Some(3)));
        let current = vec![doc("a", 1), doc("b", 2)];
        let out = e.reduce(&current, &[delete(4, doc("a", 1))]).unwrap();
        assert_eq!(ids(&out), vec!["b"]);
    }

    #[test]
    fn test_insert_into_full_window_truncates() {
        let e = engine(json!({}), Window::new(0, Some(2)));
        let current = vec![doc("a", 1), doc("c", 3)];
        let out = e.reduce(&current, &[insert(5, doc("b", 2))]).unwrap();
        assert_eq!(ids(&out), vec!["a", "b"]);
        let out = e.reduce(&current, &[insert(5, doc("z", 9))]).unwrap();
        assert_eq!(out, ReduceOutcome::Unchanged);
    }

    #[test]
    fn test_skip_guards_window_start() {
        let e = engine(json!({}), Window::new(1, Some(2)));
        let current = vec![doc("b", 2), doc("c", 3)];
        let out = e.reduce(&current, &[insert(9, doc("a", 0))]).unwrap();
        assert_eq!(out, ReduceOutcome::MustReExecute(ReExecuteReason::BeforeWindow));
        let out = e.reduce(&[], &[insert(9, doc("a", 0))]).unwrap();
        assert!(out.must_re_execute());
        let out = e.reduce(&current, &[delete(9, doc("z", 0))]).unwrap();
        assert!(out.must_re_execute());
    }

    #[test]
    fn test_skip_removal_after_window_is_noop() {
        let e = engine(json!({}), Window::new(1, Some(2)));
        let current = vec![doc("b", 2), doc("c", 3)];
        let out = e.reduce(&current, &[delete(9, doc("z", 10))]).unwrap();
        assert_eq!(out, ReduceOutcome::Unchanged);
    }

    #[test]
    fn test_update_leaving_full_window_reexecutes() {
        let e = engine(json!({}), Window::new(0, Some(2)));
        let current = vec![doc("a", 1), doc("b", 2)];
        let out = e.reduce(&current, &[update(3, doc("a", 1), doc("a", 50))]).unwrap();
        assert!(out.must_re_execute());
        let out = e.reduce(&current, &[update(3, doc("b", 2), doc("b", 0))]).unwrap();
        assert_eq!(ids(&out), vec!["b", "a"]);
    }

    #[test]
    fn test_find_one_replaced_only_by_earlier_doc() {
        let e = engine(json!({}), Window::new(0, Some(1)));
        let current = vec![doc("m", 5)];
        let out = e.reduce(&current, &[insert(2, doc("a", 1))]).unwrap();
        assert_eq!(ids(&out), vec!["a"]);
        let out = e.reduce(&current, &[insert(2, doc("z", 9))]).unwrap();
        assert_eq!(out, ReduceOutcome::Unchanged);
    }

    #[test]
    fn test_insert_then_delete_within_batch() {
        let e = engine(json!({}), Window::unbounded());
        let events = vec![insert(1, doc("a", 1)), delete(2, doc("a", 1))];
        assert_eq!(e.reduce(&[], &events).unwrap(), ReduceOutcome::Unchanged);
        let out = e.reduce(&[doc("a", 1), doc("b", 2)], &events).unwrap();
        assert_eq!(ids(&out), vec!["b"]);
    }

    #[test]
    fn test_reapplying_events_is_idempotent() {
        let e = engine(json!({}), Window::unbounded());
        let current = vec![doc("a", 1), doc("b", 2)];
        let events = vec![insert(1, doc("b", 2)), delete(2, doc("c", 3))];
        assert_eq!(e.reduce(&current, &events).unwrap(), ReduceOutcome::Unchanged);
    }

    #[test]
    fn test_tombstone_update_removes() {
        let e = engine(json!({}), Window::unbounded());
        let current = vec![doc("a", 1)];
        let out = e
            .reduce(&current, &[update(2, doc("a", 1), doc("a", 1).into_tombstone())])
            .unwrap();
        assert_eq!(out, ReduceOutcome::Changed(vec![]));
    }

    #[test]
    fn test_ambiguous_sort_is_error() {
        let e = engine(json!({}), Window::unbounded());
        let err = e.reduce(&[doc("a", 1)], &[insert(2, doc("b", 1))]).unwrap_err();
        assert!(matches!(err, Error::AmbiguousSortOrder { .. }));
    }

    #[test]
    fn test_reduce_is_pure() {
        let e = engine(json!({"age": {"$gte": 2}}), Window::new(0, Some(3)));
        let current = vec![doc("b", 2), doc("c", 3)];
        let events = vec![insert(1, doc("d", 4)), update(2, doc("b", 2), doc("b", 1))];
        let first = e.reduce(&current, &events).unwrap();
        let second = e.reduce(&current, &events).unwrap();
        assert_eq!(first, second);
    }
}
