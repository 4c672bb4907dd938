//! Cached query results.

use hashbrown::HashMap;
use vela_core::{Document, PrimaryKey};

/// An ordered query result with a primary key index.
#[derive(Clone, Debug, Default)]
pub struct QueryResult {
    docs: Vec<Document>,
    index: HashMap<PrimaryKey, usize>,
}

impl QueryResult {
    pub fn new(docs: Vec<Document>) -> Self {
        let index = docs
            .iter()
            .enumerate()
            .map(|(i, d)| (d.primary().clone(), i))
            .collect();
        Self { docs, index }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the documents in result order.
    #[inline]
    pub fn docs(&self) -> &[Document] {
        &self.docs
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// The single result of a `findOne` query.
    pub fn first(&self) -> Option<&Document> {
        self.docs.first()
    }

    pub fn contains(&self, key: &PrimaryKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &PrimaryKey) -> Option<&Document> {
        self.index.get(key).map(|&i| &self.docs[i])
    }

    /// Returns the primary keys in result order.
    pub fn keys(&self) -> Vec<&str> {
        self.docs.iter().map(|d| d.primary().as_str()).collect()
    }

    pub fn into_docs(self) -> Vec<Document> {
        self.docs
    }
}

impl PartialEq for QueryResult {
    fn eq(&self, other: &Self) -> bool {
        self.docs == other.docs
    }
}
