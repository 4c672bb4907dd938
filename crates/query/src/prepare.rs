//! Backend normalization of a query before matching, sorting and execution.

use crate::query::{MangoQuery, SortPart};
use crate::schema::Schema;
use crate::selector::Selector;
use serde_json::{Map, Value};
use tracing::trace;
use vela_core::{Error, Result};

/// A query normalized against its collection schema.
///
/// The sort is never empty: a query without one is ordered by primary key.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedQuery {
    query: MangoQuery,
    primary_path: String,
}

impl PreparedQuery {
    #[inline]
    pub fn query(&self) -> &MangoQuery {
        &self.query
    }

    #[inline]
    pub fn selector(&self) -> &Value {
        &self.query.selector
    }

    #[inline]
    pub fn sort(&self) -> &[SortPart] {
        &self.query.sort
    }

    #[inline]
    pub fn skip(&self) -> usize {
        self.query.skip
    }

    #[inline]
    pub fn limit(&self) -> Option<usize> {
        self.query.limit
    }

    #[inline]
    pub fn primary_path(&self) -> &str {
        &self.primary_path
    }
}

/// Normalizes `query` for `schema`. Pure and deterministic.
pub fn prepare_query(schema: &Schema, query: &MangoQuery) -> Result<PreparedQuery> {
    query.validate()?;
    let primary = schema.primary_path();

    let mut prepared = query.clone();
    prepared.selector = strip_empty(&query.selector);
    reject_primary_regex(&prepared.selector, primary)?;
    Selector::compile(&prepared.selector)?;

    if prepared.sort.is_empty() {
        trace!(primary, "no sort given, ordering by primary key");
        prepared.sort.push(SortPart::asc(primary));
    }
    for part in &prepared.sort {
        if !schema.has_field(&part.field) {
            return Err(Error::invalid_query_shape(format!(
                "cannot sort on '{}', it is not part of the schema",
                part.field
            )));
        }
    }

    Ok(PreparedQuery {
        query: prepared,
        primary_path: primary.to_string(),
    })
}

/// Drops `{field: {}}` entries at every depth of the selector.
fn strip_empty(selector: &Value) -> Value {
    match selector {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                let value = strip_empty(value);
                let empty_ops = !key.starts_with('$') && value.as_object().map_or(false, Map::is_empty);
                if !empty_ops {
                    out.insert(key.clone(), value);
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(strip_empty).collect()),
        other => other.clone(),
    }
}

fn reject_primary_regex(selector: &Value, primary: &str) -> Result<()> {
    let Value::Object(map) = selector else {
        return Ok(());
    };
    for (key, value) in map {
        if key == primary && value.get("$regex").is_some() {
            return Err(Error::invalid_query_shape(format!(
                "$regex is not allowed on the primary key '{}'",
                primary
            )));
        }
        if let Value::Array(parts) = value {
            for part in parts {
                reject_primary_regex(part, primary)?;
            }
        }
    }
    Ok(())
}
