//! The match/sort oracle a storage backend supplies to the query layer.
//!
//! Incremental maintenance is only correct if the matcher and comparator
//! agree with the backend's own full execution, so both are derived from the
//! same prepared query the executor receives.

use crate::prepare::{prepare_query, PreparedQuery};
use crate::query::MangoQuery;
use crate::schema::Schema;
use crate::selector::Selector;
use crate::sort::SortComparator;
use core::cmp::Ordering;
use std::sync::Arc;
use vela_core::{Document, Result};

/// Predicate deciding whether a document belongs to a query's match set.
pub type QueryMatcher = Arc<dyn Fn(&Document) -> bool + Send + Sync>;

/// Strict total order over a query's documents.
pub type DeterministicSortComparator =
    Arc<dyn Fn(&Document, &Document) -> Result<Ordering> + Send + Sync>;

/// Backend-specific query preparation, matching and ordering.
pub trait StorageStatics: Send + Sync {
    /// Normalizes a query. Must be pure.
    fn prepare_query(&self, schema: &Schema, query: &MangoQuery) -> Result<PreparedQuery>;

    /// Builds the membership predicate for a prepared query.
    fn query_matcher(&self, schema: &Schema, prepared: &PreparedQuery) -> Result<QueryMatcher>;

    /// Builds the sort comparator for a prepared query.
    fn sort_comparator(
        &self,
        schema: &Schema,
        prepared: &PreparedQuery,
    ) -> Result<DeterministicSortComparator>;
}

/// The Mango semantics used by the in-memory store.
#[derive(Clone, Copy, Debug, Default)]
pub struct MangoStatics;

impl StorageStatics for MangoStatics {
    fn prepare_query(&self, schema: &Schema, query: &MangoQuery) -> Result<PreparedQuery> {
        prepare_query(schema, query)
    }

    fn query_matcher(&self, _schema: &Schema, prepared: &PreparedQuery) -> Result<QueryMatcher> {
        let selector = Selector::compile(prepared.selector())?;
        Ok(Arc::new(move |doc: &Document| selector.matches(doc)))
    }

    fn sort_comparator(
        &self,
        _schema: &Schema,
        prepared: &PreparedQuery,
    ) -> Result<DeterministicSortComparator> {
        let comparator = SortComparator::new(prepared.sort().to_vec());
        Ok(Arc::new(move |a: &Document, b: &Document| comparator.compare(a, b)))
    }
}
