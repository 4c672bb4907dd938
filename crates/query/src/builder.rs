//! Optional chained query building.
//!
//! A database is constructed either with or without a builder. Without one,
//! every method reports `UnsupportedOperation` instead of silently returning
//! the query unchanged. Updating the documents a query finds is a separate
//! capability that builders may add.

use crate::query::{MangoQuery, SortPart};
use serde_json::{Map, Value};
use std::sync::Arc;
use vela_core::{Document, Error, Result};

const CAPABILITY: &str = "query-builder";
const UPDATE_CAPABILITY: &str = "query-update";

/// Computes the replacement body of one found document.
pub type DocumentUpdater = Arc<dyn Fn(&Document) -> Result<Value> + Send + Sync>;

/// Derives a new query from an existing one.
pub trait QueryBuilder: Send + Sync {
    /// Adds a condition on `field`. `condition` is a literal (equality) or
    /// an operator object such as `{"$gt": 3}`.
    fn where_field(&self, _query: &MangoQuery, _field: &str, _condition: Value) -> Result<MangoQuery> {
        Err(Error::unsupported(CAPABILITY))
    }

    /// Appends sort parts from a space separated order, `-` marking descending:
    /// `"age -name"`.
    fn sort(&self, _query: &MangoQuery, _order: &str) -> Result<MangoQuery> {
        Err(Error::unsupported(CAPABILITY))
    }

    fn skip(&self, _query: &MangoQuery, _skip: usize) -> Result<MangoQuery> {
        Err(Error::unsupported(CAPABILITY))
    }

    fn limit(&self, _query: &MangoQuery, _limit: usize) -> Result<MangoQuery> {
        Err(Error::unsupported(CAPABILITY))
    }

    /// Compiles an update object such as `{"$set": {"age": 3}}`.
    fn update(&self, _update: &Value) -> Result<DocumentUpdater> {
        Err(Error::unsupported(UPDATE_CAPABILITY))
    }
}

/// No builder installed.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoQueryBuilder;

impl QueryBuilder for NoQueryBuilder {}

/// Builds Mango selectors.
#[derive(Clone, Copy, Debug, Default)]
pub struct MangoQueryBuilder;

impl QueryBuilder for MangoQueryBuilder {
    fn where_field(&self, query: &MangoQuery, field: &str, condition: Value) -> Result<MangoQuery> {
        if field.is_empty() || field.starts_with('$') {
            return Err(Error::invalid_query_shape(format!("'{}' is not a field name", field)));
        }
        let mut next = query.clone();
        let selector = match &mut next.selector {
            Value::Object(map) => map,
            _ => return Err(Error::invalid_query_shape("selector must be an object")),
        };
        let merged = match (selector.remove(field), condition) {
            (Some(Value::Object(mut existing)), Value::Object(ops))
                if is_operator_object(&existing) && is_operator_object(&ops) =>
            {
                existing.extend(ops);
                Value::Object(existing)
            }
            (_, condition) => condition,
        };
        selector.insert(field.to_string(), merged);
        Ok(next)
    }

    fn sort(&self, query: &MangoQuery, order: &str) -> Result<MangoQuery> {
        let mut next = query.clone();
        for token in order.split_whitespace() {
            let part = match token.strip_prefix('-') {
                Some("") => return Err(Error::invalid_query_shape("empty sort field")),
                Some(field) => SortPart::desc(field),
                None => SortPart::asc(token.trim_start_matches('+')),
            };
            if part.field.is_empty() {
                return Err(Error::invalid_query_shape("empty sort field"));
            }
            next.sort.retain(|p| p.field != part.field);
            next.sort.push(part);
        }
        Ok(next)
    }

    fn skip(&self, query: &MangoQuery, skip: usize) -> Result<MangoQuery> {
        Ok(query.clone().skip(skip))
    }

    fn limit(&self, query: &MangoQuery, limit: usize) -> Result<MangoQuery> {
        Ok(query.clone().limit(limit))
    }
}

fn is_operator_object(map: &Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|k| k.starts_with('$'))
}
