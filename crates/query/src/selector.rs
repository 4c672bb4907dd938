//! Compiled Mango selectors.
//!
//! A selector is compiled once per prepared query into a tree of clauses and
//! evaluated against every candidate document. Compilation rejects unknown
//! operators and malformed operands, so evaluation itself cannot fail.

use core::cmp::Ordering;
use serde_json::{Map, Value};
use vela_core::collate::{collate, type_name};
use vela_core::pattern_match::Regex;
use vela_core::{lookup_path, Document, Error, Result};

const TYPE_NAMES: [&str; 6] = ["null", "boolean", "number", "string", "array", "object"];

/// A compiled selector: every clause must match.
#[derive(Clone, Debug)]
pub struct Selector {
    clauses: Vec<Clause>,
}

#[derive(Clone, Debug)]
enum Clause {
    Field { path: String, ops: Vec<FieldOp> },
    And(Vec<Selector>),
    Or(Vec<Selector>),
    Nor(Vec<Selector>),
}

#[derive(Clone, Debug)]
enum FieldOp {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Regex(Regex),
    Size(usize),
    All(Vec<Value>),
    ElemMatch(ElemMatch),
    Mod(i64, i64),
    Type(&'static str),
    Not(Vec<FieldOp>),
}

#[derive(Clone, Debug)]
enum ElemMatch {
    /// Elements are sub-documents matched by a nested selector.
    Document(Selector),
    /// Elements are matched directly by operators.
    Value(Vec<FieldOp>),
}

impl Selector {
    /// Compiles a selector object.
    pub fn compile(selector: &Value) -> Result<Self> {
        let map = selector
            .as_object()
            .ok_or_else(|| Error::invalid_query_shape("selector must be an object"))?;
        let mut clauses = Vec::new();
        for (key, value) in map {
            compile_entry(key, value, None, &mut clauses)?;
        }
        Ok(Self { clauses })
    }

    /// Returns true if the selector has no clauses and matches everything.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Matches a document. Logically deleted documents never match.
    pub fn matches(&self, doc: &Document) -> bool {
        !doc.is_deleted() && self.matches_value(doc.data())
    }

    /// Matches a raw JSON value.
    pub fn matches_value(&self, root: &Value) -> bool {
        self.clauses.iter().all(|clause| clause.matches(root))
    }
}

impl Clause {
    fn matches(&self, root: &Value) -> bool {
        match self {
            Clause::Field { path, ops } => {
                let value = lookup_path(root, path);
                ops.iter().all(|op| op.matches(value))
            }
            Clause::And(parts) => parts.iter().all(|s| s.matches_value(root)),
            Clause::Or(parts) => parts.iter().any(|s| s.matches_value(root)),
            Clause::Nor(parts) => !parts.iter().any(|s| s.matches_value(root)),
        }
    }
}

impl FieldOp {
    fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            FieldOp::Eq(x) => compare(value, x) == Some(Ordering::Equal),
            FieldOp::Ne(x) => compare(value, x) != Some(Ordering::Equal),
            FieldOp::Gt(x) => compare(value, x) == Some(Ordering::Greater),
            FieldOp::Gte(x) => matches!(compare(value, x), Some(Ordering::Greater | Ordering::Equal)),
            FieldOp::Lt(x) => compare(value, x) == Some(Ordering::Less),
            FieldOp::Lte(x) => matches!(compare(value, x), Some(Ordering::Less | Ordering::Equal)),
            FieldOp::In(xs) => value.map_or(false, |v| contains_any(xs, v)),
            FieldOp::Nin(xs) => !value.map_or(false, |v| contains_any(xs, v)),
            FieldOp::Exists(expected) => value.is_some() == *expected,
            FieldOp::Regex(re) => value
                .and_then(Value::as_str)
                .map_or(false, |s| re.is_match(s)),
            FieldOp::Size(n) => value
                .and_then(Value::as_array)
                .map_or(false, |items| items.len() == *n),
            FieldOp::All(xs) => value.and_then(Value::as_array).map_or(false, |items| {
                xs.iter()
                    .all(|x| items.iter().any(|i| collate(i, x) == Ordering::Equal))
            }),
            FieldOp::ElemMatch(m) => value
                .and_then(Value::as_array)
                .map_or(false, |items| items.iter().any(|item| m.matches(item))),
            FieldOp::Mod(divisor, remainder) => value
                .and_then(as_integer)
                .map_or(false, |n| n % divisor == *remainder),
            FieldOp::Type(name) => value.map_or(false, |v| type_name(v) == *name),
            FieldOp::Not(ops) => !ops.iter().all(|op| op.matches(value)),
        }
    }
}

impl ElemMatch {
    fn matches(&self, item: &Value) -> bool {
        match self {
            ElemMatch::Document(selector) => selector.matches_value(item),
            ElemMatch::Value(ops) => ops.iter().all(|op| op.matches(Some(item))),
        }
    }
}

/// Missing fields never satisfy a comparison.
fn compare(value: Option<&Value>, operand: &Value) -> Option<Ordering> {
    value.map(|v| collate(v, operand))
}

fn contains_any(candidates: &[Value], value: &Value) -> bool {
    candidates.iter().any(|c| {
        collate(value, c) == Ordering::Equal
            || value.as_array().map_or(false, |items| {
                items.iter().any(|i| collate(i, c) == Ordering::Equal)
            })
    })
}

fn as_integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.is_finite())
            .map(|f| f as i64)
    })
}

fn join_path(prefix: Option<&str>, field: &str) -> String {
    match prefix {
        Some(p) => format!("{}.{}", p, field),
        None => field.to_string(),
    }
}

fn compile_entry(key: &str, value: &Value, prefix: Option<&str>, out: &mut Vec<Clause>) -> Result<()> {
    match key {
        "$and" | "$or" | "$nor" => {
            if prefix.is_some() {
                return Err(Error::invalid_query_shape(format!(
                    "{} is only allowed at selector level",
                    key
                )));
            }
            let parts = value
                .as_array()
                .filter(|parts| !parts.is_empty())
                .ok_or_else(|| Error::invalid_query_shape(format!("{} needs a non-empty array", key)))?
                .iter()
                .map(Selector::compile)
                .collect::<Result<Vec<_>>>()?;
            out.push(match key {
                "$and" => Clause::And(parts),
                "$or" => Clause::Or(parts),
                _ => Clause::Nor(parts),
            });
            Ok(())
        }
        op if op.starts_with('$') => Err(Error::invalid_query_shape(format!(
            "unknown selector operator '{}'",
            op
        ))),
        field => {
            let path = join_path(prefix, field);
            match value {
                Value::Object(map) if map.is_empty() => Ok(()),
                Value::Object(map) if map.keys().all(|k| k.starts_with('$')) => {
                    let ops = compile_ops(map)?;
                    out.push(Clause::Field { path, ops });
                    Ok(())
                }
                Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => {
                    Err(Error::invalid_query_shape(format!(
                        "field '{}' mixes operators and sub-fields",
                        path
                    )))
                }
                Value::Object(map) => {
                    for (sub, v) in map {
                        compile_entry(sub, v, Some(path.as_str()), out)?;
                    }
                    Ok(())
                }
                literal => {
                    out.push(Clause::Field {
                        path,
                        ops: vec![FieldOp::Eq(literal.clone())],
                    });
                    Ok(())
                }
            }
        }
    }
}

fn compile_ops(map: &Map<String, Value>) -> Result<Vec<FieldOp>> {
    map.iter().map(|(op, operand)| compile_op(op, operand)).collect()
}

fn compile_op(op: &str, operand: &Value) -> Result<FieldOp> {
    let shape = |what: &str| Error::invalid_query_shape(format!("{} {}", op, what));
    Ok(match op {
        "$eq" => FieldOp::Eq(operand.clone()),
        "$ne" => FieldOp::Ne(operand.clone()),
        "$gt" => FieldOp::Gt(operand.clone()),
        "$gte" => FieldOp::Gte(operand.clone()),
        "$lt" => FieldOp::Lt(operand.clone()),
        "$lte" => FieldOp::Lte(operand.clone()),
        "$in" | "$nin" | "$all" => {
            let items = operand.as_array().ok_or_else(|| shape("needs an array"))?.clone();
            match op {
                "$in" => FieldOp::In(items),
                "$nin" => FieldOp::Nin(items),
                _ => FieldOp::All(items),
            }
        }
        "$exists" => FieldOp::Exists(operand.as_bool().ok_or_else(|| shape("needs a boolean"))?),
        "$regex" => {
            let pattern = operand.as_str().ok_or_else(|| shape("needs a string"))?;
            FieldOp::Regex(Regex::new(pattern)?)
        }
        "$size" => FieldOp::Size(
            operand
                .as_u64()
                .ok_or_else(|| shape("needs a non-negative integer"))? as usize,
        ),
        "$elemMatch" => {
            let map = operand.as_object().ok_or_else(|| shape("needs an object"))?;
            let by_value = !map.is_empty()
                && map
                    .keys()
                    .all(|k| k.starts_with('$') && !matches!(k.as_str(), "$and" | "$or" | "$nor"));
            if by_value {
                FieldOp::ElemMatch(ElemMatch::Value(compile_ops(map)?))
            } else {
                FieldOp::ElemMatch(ElemMatch::Document(Selector::compile(operand)?))
            }
        }
        "$mod" => {
            let pair = operand
                .as_array()
                .filter(|p| p.len() == 2)
                .ok_or_else(|| shape("needs [divisor, remainder]"))?;
            let divisor = pair[0].as_i64().filter(|d| *d != 0).ok_or_else(|| shape("divisor must be a non-zero integer"))?;
            let remainder = pair[1].as_i64().ok_or_else(|| shape("remainder must be an integer"))?;
            FieldOp::Mod(divisor, remainder)
        }
        "$type" => {
            let name = operand.as_str().ok_or_else(|| shape("needs a type name"))?;
            let name = TYPE_NAMES
                .iter()
                .find(|t| **t == name)
                .ok_or_else(|| shape("names an unknown type"))?;
            FieldOp::Type(*name)
        }
        "$not" => {
            let map = operand
                .as_object()
                .filter(|m| !m.is_empty() && m.keys().all(|k| k.starts_with('$')))
                .ok_or_else(|| shape("needs an operator object"))?;
            FieldOp::Not(compile_ops(map)?)
        }
        _ => {
            return Err(Error::invalid_query_shape(format!(
                "unknown selector operator '{}'",
                op
            )))
        }
    })
}
