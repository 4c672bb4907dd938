//! Document snapshots for the Vela reactive query layer.
//!
//! A `Document` is the unit stored in collections, returned in query results
//! and carried by change events. It is an immutable JSON object together with
//! its extracted primary key.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Field that marks a logically-deleted document.
pub const DELETED_FIELD: &str = "_deleted";

/// The string form of a document's primary field.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrimaryKey(String);

impl PrimaryKey {
    /// Creates a primary key from its string form.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derives a key from a JSON value. Strings are used verbatim, numbers
    /// by their textual form; anything else is not a valid primary key.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PrimaryKey {
    fn from(v: &str) -> Self {
        Self(v.to_string())
    }
}

impl From<String> for PrimaryKey {
    fn from(v: String) -> Self {
        Self(v)
    }
}

/// An immutable point-in-time snapshot of one document.
///
/// Cloning is cheap: the JSON body is shared.
#[derive(Clone, Debug)]
pub struct Document {
    /// Primary key extracted from the body.
    primary: PrimaryKey,
    /// The JSON object.
    data: Arc<Value>,
}

impl Document {
    /// Creates a document, extracting the primary key at `primary_path`.
    pub fn new(primary_path: &str, data: Value) -> Result<Self> {
        if !data.is_object() {
            return Err(Error::invalid_document("document must be a JSON object"));
        }
        let primary = lookup_path(&data, primary_path)
            .and_then(PrimaryKey::from_value)
            .ok_or_else(|| {
                Error::invalid_document(format!(
                    "missing or non-scalar primary key at '{}'",
                    primary_path
                ))
            })?;
        Ok(Self {
            primary,
            data: Arc::new(data),
        })
    }

    /// Returns the primary key.
    #[inline]
    pub fn primary(&self) -> &PrimaryKey {
        &self.primary
    }

    /// Returns the JSON body.
    #[inline]
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Returns the value at a dotted path (`"address.city"`), if present.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.data, path)
    }

    /// Returns true if the document is logically deleted.
    pub fn is_deleted(&self) -> bool {
        matches!(self.data.get(DELETED_FIELD), Some(Value::Bool(true)))
    }

    /// Returns a copy of the body with `_deleted` set, keeping the key.
    pub fn into_tombstone(self) -> Self {
        let mut body = (*self.data).clone();
        if let Value::Object(map) = &mut body {
            map.insert(DELETED_FIELD.to_string(), Value::Bool(true));
        }
        Self {
            primary: self.primary,
            data: Arc::new(body),
        }
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.primary == other.primary
            && (Arc::ptr_eq(&self.data, &other.data) || self.data == other.data)
    }
}

impl Serialize for Document {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        self.data.serialize(serializer)
    }
}

/// Resolves a dotted path inside a JSON value. Numeric segments index arrays.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
