//! Collection schema as far as query preparation needs it.

use hashbrown::HashSet;
use serde_json::Value;
use vela_core::{Error, Result};

/// Primary key path and the declared top-level fields of a collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    primary_path: String,
    properties: HashSet<String>,
}

impl Schema {
    /// Creates a schema with no declared properties. Any field may be sorted on.
    pub fn new(primary_path: impl Into<String>) -> Self {
        Self {
            primary_path: primary_path.into(),
            properties: HashSet::new(),
        }
    }

    /// Declares a top-level property.
    pub fn with_property(mut self, name: impl Into<String>) -> Self {
        self.properties.insert(name.into());
        self
    }

    /// Reads `{"primaryKey": "...", "properties": {...}}` in JSON schema style.
    pub fn from_json(value: &Value) -> Result<Self> {
        let primary = value
            .get("primaryKey")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_config("schema needs a string primaryKey"))?;
        let mut schema = Schema::new(primary);
        match value.get("properties") {
            None => {}
            Some(Value::Object(props)) => {
                for name in props.keys() {
                    schema.properties.insert(name.clone());
                }
            }
            Some(_) => return Err(Error::invalid_config("schema properties must be an object")),
        }
        if !schema.properties.is_empty() && !schema.properties.contains(primary) {
            return Err(Error::invalid_config(format!(
                "primary key '{}' is not a declared property",
                primary
            )));
        }
        Ok(schema)
    }

    #[inline]
    pub fn primary_path(&self) -> &str {
        &self.primary_path
    }

    /// Returns true if `path` is rooted at a declared property, or if the
    /// schema declares none.
    pub fn has_field(&self, path: &str) -> bool {
        if self.properties.is_empty() {
            return true;
        }
        let root = path.split('.').next().unwrap_or(path);
        self.properties.contains(root)
    }
}
