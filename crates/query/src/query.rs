//! Mango query definitions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use vela_core::{Error, Result};

/// The operation a live query performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryOp {
    /// Returns every matching document in the window.
    #[serde(rename = "find")]
    Find,
    /// Returns the first matching document, if any.
    #[serde(rename = "findOne")]
    FindOne,
}

impl QueryOp {
    /// Returns the canonical name used in descriptors.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryOp::Find => "find",
            QueryOp::FindOne => "findOne",
        }
    }
}

/// Sort direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// One `{field: direction}` entry of a sort order.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SortPart {
    pub field: String,
    pub direction: SortDirection,
}

impl SortPart {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    fn from_value(value: &Value) -> Result<Self> {
        let map = value
            .as_object()
            .filter(|m| m.len() == 1)
            .ok_or_else(|| Error::invalid_query_shape("sort part must be a single-key object"))?;
        let (field, direction) = map
            .iter()
            .next()
            .ok_or_else(|| Error::invalid_query_shape("empty sort part"))?;
        let direction = match direction.as_str() {
            Some("asc") => SortDirection::Asc,
            Some("desc") => SortDirection::Desc,
            _ => {
                return Err(Error::invalid_query_shape(format!(
                    "sort direction of '{}' must be \"asc\" or \"desc\"",
                    field
                )))
            }
        };
        Ok(Self {
            field: field.clone(),
            direction,
        })
    }

    fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(self.field.clone(), Value::from(self.direction.as_str()));
        Value::Object(map)
    }
}

/// A Mango query: selector, sort and the skip/limit window.
#[derive(Clone, Debug, PartialEq)]
pub struct MangoQuery {
    pub selector: Value,
    pub sort: Vec<SortPart>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl Default for MangoQuery {
    fn default() -> Self {
        Self {
            selector: Value::Object(Map::new()),
            sort: Vec::new(),
            skip: 0,
            limit: None,
        }
    }
}

impl MangoQuery {
    /// Creates a query matching every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the selector.
    pub fn selector(mut self, selector: Value) -> Self {
        self.selector = selector;
        self
    }

    /// Appends a sort part.
    pub fn sort_by(mut self, part: SortPart) -> Self {
        self.sort.push(part);
        self
    }

    /// Sets the number of leading matches to skip.
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Sets the maximum number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if the query returns a bounded sub-range of its matches.
    pub fn is_windowed(&self) -> bool {
        self.skip > 0 || self.limit.is_some()
    }

    /// Parses `{selector, sort, skip, limit}`. Every field is optional.
    pub fn from_value(value: &Value) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| Error::invalid_query_shape("query must be an object"))?;
        let mut query = MangoQuery::new();
        for (key, v) in map {
            match key.as_str() {
                "selector" => query.selector = v.clone(),
                "sort" => {
                    let parts = v
                        .as_array()
                        .ok_or_else(|| Error::invalid_query_shape("sort must be an array"))?;
                    query.sort = parts
                        .iter()
                        .map(SortPart::from_value)
                        .collect::<Result<Vec<_>>>()?;
                }
                "skip" => query.skip = parse_count("skip", v)?.unwrap_or(0),
                "limit" => query.limit = parse_count("limit", v)?,
                other => {
                    return Err(Error::invalid_query_shape(format!(
                        "unknown query field '{}'",
                        other
                    )))
                }
            }
        }
        query.validate()?;
        Ok(query)
    }

    /// Checks that the selector is an object.
    pub fn validate(&self) -> Result<()> {
        match &self.selector {
            Value::Object(_) => Ok(()),
            Value::Array(_) => Err(Error::invalid_query_shape(
                "selector must be an object, got an array",
            )),
            other => Err(Error::invalid_query_shape(format!(
                "selector must be an object, got {}",
                other
            ))),
        }
    }

    /// Returns the JSON form of the query.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("selector".into(), self.selector.clone());
        map.insert(
            "sort".into(),
            Value::Array(self.sort.iter().map(SortPart::to_value).collect()),
        );
        map.insert("skip".into(), Value::from(self.skip));
        map.insert(
            "limit".into(),
            self.limit.map(Value::from).unwrap_or(Value::Null),
        );
        Value::Object(map)
    }
}

fn parse_count(name: &str, value: &Value) -> Result<Option<usize>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| Error::invalid_query_shape(format!("{} must be a non-negative integer", name))),
        _ => Err(Error::invalid_query_shape(format!(
            "{} must be a non-negative integer",
            name
        ))),
    }
}
