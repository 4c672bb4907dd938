//! Deterministic document ordering.

use crate::query::{SortDirection, SortPart};
use core::cmp::Ordering;
use vela_core::collate::collate_opt;
use vela_core::{Document, Error, Result};

/// Orders documents by a list of sort parts.
///
/// The order must be strict: two distinct documents that tie on every part
/// are an `AmbiguousSortOrder` error, never an arbitrary choice.
#[derive(Clone, Debug)]
pub struct SortComparator {
    parts: Vec<SortPart>,
}

impl SortComparator {
    pub fn new(parts: Vec<SortPart>) -> Self {
        Self { parts }
    }

    pub fn parts(&self) -> &[SortPart] {
        &self.parts
    }

    /// Compares two documents. The same document (by primary key) is `Equal`.
    pub fn compare(&self, a: &Document, b: &Document) -> Result<Ordering> {
        if a.primary() == b.primary() {
            return Ok(Ordering::Equal);
        }
        for part in &self.parts {
            let ord = collate_opt(a.get_path(&part.field), b.get_path(&part.field));
            let ord = match part.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return Ok(ord);
            }
        }
        Err(Error::ambiguous_sort_order(
            a.primary().clone(),
            b.primary().clone(),
        ))
    }

    /// Checks that `docs` is strictly ascending under this order.
    pub fn verify_sorted(&self, docs: &[Document]) -> Result<()> {
        verify_sorted_by(docs, |a, b| self.compare(a, b))
    }

    /// Sorts documents in place, failing on the first ambiguous pair.
    pub fn sort(&self, docs: &mut [Document]) -> Result<()> {
        let mut failure = None;
        docs.sort_by(|a, b| match self.compare(a, b) {
            Ok(ord) => ord,
            Err(err) => {
                failure.get_or_insert(err);
                Ordering::Equal
            }
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Returns the index at which `doc` would be inserted into the sorted
    /// slice `docs`.
    pub fn insertion_point(&self, docs: &[Document], doc: &Document) -> Result<usize> {
        insertion_point_by(docs, doc, |a, b| self.compare(a, b))
    }
}

/// Checks that `docs` is strictly ascending under `compare`. A pair out of
/// order, or the same document twice, is a `Storage` error.
pub fn verify_sorted_by<F>(docs: &[Document], compare: F) -> Result<()>
where
    F: Fn(&Document, &Document) -> Result<Ordering>,
{
    for pair in docs.windows(2) {
        if compare(&pair[0], &pair[1])? != Ordering::Less {
            return Err(Error::storage(format!(
                "executor returned {} before {} out of sort order",
                pair[0].primary(),
                pair[1].primary()
            )));
        }
    }
    Ok(())
}

/// Binary search for the first index of `docs` not ordered before `doc`.
pub fn insertion_point_by<F>(docs: &[Document], doc: &Document, compare: F) -> Result<usize>
where
    F: Fn(&Document, &Document) -> Result<Ordering>,
{
    let mut lo = 0;
    let mut hi = docs.len();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match compare(&docs[mid], doc)? {
            Ordering::Less => lo = mid + 1,
            _ => hi = mid,
        }
    }
    Ok(lo)
}
