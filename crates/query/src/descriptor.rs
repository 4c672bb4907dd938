//! Canonical query descriptors.
//!
//! A descriptor is the cache key of a live query. Two queries that differ
//! only in the order of object keys inside their selector produce the same
//! canonical string, and therefore share one query instance.

use crate::query::{MangoQuery, QueryOp};
use core::fmt;
use core::hash::{Hash, Hasher};
use serde_json::{Map, Value};
use vela_core::Result;

/// FNV-1a hasher for descriptor fingerprints.
struct FnvHasher {
    state: u64,
}

impl FnvHasher {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    fn new() -> Self {
        Self {
            state: Self::FNV_OFFSET,
        }
    }
}

impl Hasher for FnvHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.state ^= *byte as u64;
            self.state = self.state.wrapping_mul(Self::FNV_PRIME);
        }
    }
}

/// Immutable, canonicalized `{op, selector, sort, skip, limit}`.
#[derive(Clone, Debug)]
pub struct QueryDescriptor {
    op: QueryOp,
    query: MangoQuery,
    canonical: String,
    fingerprint: u64,
}

impl QueryDescriptor {
    /// Validates the query and computes its canonical form.
    ///
    /// `FindOne` always carries a limit of 1.
    pub fn new(op: QueryOp, mut query: MangoQuery) -> Result<Self> {
        query.validate()?;
        if op == QueryOp::FindOne {
            query.limit = Some(1);
        }
        let mut root = Map::new();
        root.insert("op".into(), Value::from(op.as_str()));
        root.insert("query".into(), query.to_value());
        let canonical = sorted(&Value::Object(root)).to_string();
        let mut hasher = FnvHasher::new();
        hasher.write(canonical.as_bytes());
        let fingerprint = hasher.finish();
        Ok(Self {
            op,
            query,
            canonical,
            fingerprint,
        })
    }

    /// Shorthand for `new(QueryOp::Find, query)`.
    pub fn find(query: MangoQuery) -> Result<Self> {
        Self::new(QueryOp::Find, query)
    }

    /// Shorthand for `new(QueryOp::FindOne, query)`.
    pub fn find_one(query: MangoQuery) -> Result<Self> {
        Self::new(QueryOp::FindOne, query)
    }

    #[inline]
    pub fn op(&self) -> QueryOp {
        self.op
    }

    #[inline]
    pub fn query(&self) -> &MangoQuery {
        &self.query
    }

    /// Returns the canonical string used as the cache key.
    #[inline]
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Returns the 64-bit fingerprint of the canonical string.
    #[inline]
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

impl PartialEq for QueryDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint && self.canonical == other.canonical
    }
}

impl Eq for QueryDescriptor {}

impl Hash for QueryDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint.hash(state);
    }
}

impl fmt::Display for QueryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

/// Rebuilds a value with object keys in ascending order at every depth.
/// Array order is significant and kept.
fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), sorted(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}
