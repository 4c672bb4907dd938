//! Total ordering over JSON values.
//!
//! Follows CouchDB view collation, which Mango sort and range operators use:
//!
//! `missing < null < false < true < numbers < strings < arrays < objects`
//!
//! Arrays compare element by element, then by length. Objects compare their
//! (key, value) pairs in key order, then by size.

use core::cmp::Ordering;
use serde_json::{Number, Value};

/// Compares two optional JSON values. A missing field sorts first.
pub fn collate_opt(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => collate(a, b),
    }
}

/// Compares two JSON values using collation order.
pub fn collate(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => compare_numbers(a, b),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                let cmp = collate(x, y);
                if cmp != Ordering::Equal {
                    return cmp;
                }
            }
            a.len().cmp(&b.len())
        }
        (Value::Object(a), Value::Object(b)) => {
            for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                let cmp = ka.cmp(kb).then_with(|| collate(va, vb));
                if cmp != Ordering::Equal {
                    return cmp;
                }
            }
            a.len().cmp(&b.len())
        }
        // Different types: order by type rank
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Returns the collation rank of a value's type.
pub fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) => 5,
        Value::Object(_) => 6,
    }
}

/// Returns the Mango `$type` name of a value.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn compare_numbers(a: &Number, b: &Number) -> Ordering {
    // Exact integer comparison when both sides fit, otherwise f64
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x.cmp(&y);
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x.cmp(&y);
    }
    let x = a.as_f64().unwrap_or(f64::NAN);
    let y = b.as_f64().unwrap_or(f64::NAN);
    // NaN is greater than all other numbers
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collate_type_order() {
        let ordered = [
            json!(null),
            json!(false),
            json!(true),
            json!(-5),
            json!(2.5),
            json!("a"),
            json!(["a"]),
            json!({"a": 1}),
        ];
        for pair in ordered.windows(2) {
            assert_eq!(collate(&pair[0], &pair[1]), Ordering::Less, "{:?}", pair);
        }
    }

    #[test]
    fn test_collate_numbers() {
        assert_eq!(collate(&json!(1), &json!(1.0)), Ordering::Equal);
        assert_eq!(collate(&json!(10), &json!(9.5)), Ordering::Greater);
        assert_eq!(collate(&json!(-1), &json!(u64::MAX)), Ordering::Less);
    }

    #[test]
    fn test_collate_arrays_and_objects() {
        assert_eq!(collate(&json!([1, 2]), &json!([1, 3])), Ordering::Less);
        assert_eq!(collate(&json!([1, 2]), &json!([1, 2, 0])), Ordering::Less);
        assert_eq!(collate(&json!({"a": 1}), &json!({"a": 2})), Ordering::Less);
        assert_eq!(collate(&json!({"a": 1}), &json!({"b": 0})), Ordering::Less);
    }

    #[test]
    fn test_collate_missing_first() {
        assert_eq!(collate_opt(None, Some(&json!(null))), Ordering::Less);
        assert_eq!(collate_opt(None, None), Ordering::Equal);
    }

    #[test]
    fn test_type_name() {
        assert_eq!(type_name(&json!(1)), "number");
        assert_eq!(type_name(&json!("x")), "string");
        assert_eq!(type_name(&json!({})), "object");
    }
}
