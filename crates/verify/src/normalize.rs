//! Order-independent canonical form for JSON values
//!
//! Responses may legitimately differ in object key order or array element
//! order. [`normalize`] rewrites a value so that two documents which only
//! differ in those orderings become identical, while every scalar leaf,
//! type and multiplicity still has to match. JSON has one number type, so
//! `1` and `1.0` are the same value.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Number, Value};

/// A JSON value in canonical form
///
/// Object keys are in ascending byte order and array elements are sorted
/// by their compact serialization, at every nesting depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NormalizedValue(Value);

impl NormalizedValue {
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Pretty-print with four-space indentation
    pub fn to_pretty_string(&self) -> String {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        // Serializing a Value into a Vec cannot fail.
        if self.0.serialize(&mut ser).is_err() {
            return self.0.to_string();
        }
        String::from_utf8(buf).unwrap_or_else(|_| self.0.to_string())
    }
}

impl fmt::Display for NormalizedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_pretty_string())
    }
}

/// Canonicalize a JSON value
pub fn normalize(value: &Value) -> NormalizedValue {
    NormalizedValue(canonicalize(value))
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(canonicalize_object(map)),
        Value::Array(items) => Value::Array(canonicalize_array(items)),
        Value::Number(n) => Value::Number(canonicalize_number(n)),
        scalar => scalar.clone(),
    }
}

/// Integral floats become integers when they fit in i64/u64
fn canonicalize_number(n: &Number) -> Number {
    let f = match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 => f,
        _ => return n.clone(),
    };
    // i64::MAX as f64 and u64::MAX as f64 round up to 2^63 and 2^64
    if f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Number::from(f as i64)
    } else if f >= 0.0 && f < u64::MAX as f64 {
        Number::from(f as u64)
    } else {
        n.clone()
    }
}

fn canonicalize_object(map: &Map<String, Value>) -> Map<String, Value> {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));

    entries
        .into_iter()
        .map(|(key, value)| (key.clone(), canonicalize(value)))
        .collect()
}

fn canonicalize_array(items: &[Value]) -> Vec<Value> {
    let mut normalized: Vec<Value> = items.iter().map(canonicalize).collect();
    // Children are already canonical, so equal values serialize identically.
    normalized.sort_by_cached_key(|item| item.to_string());
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_keys_are_sorted() {
        let value: Value = serde_json::from_str(r#"{"b": 1, "a": 2, "c": {"z": 0, "y": 1}}"#).unwrap();
        let normalized = normalize(&value);

        let keys: Vec<&String> = normalized.as_value().as_object().unwrap().keys().collect();
        assert_eq!(keys, ["a", "b", "c"]);
        assert_eq!(normalized.as_value()["c"], json!({"y": 1, "z": 0}));
    }

    #[test]
    fn test_array_elements_are_sorted_by_serialization() {
        let normalized = normalize(&json!([3, 1, 2]));
        assert_eq!(normalized.as_value(), &json!([1, 2, 3]));

        let normalized = normalize(&json!(["b", {"k": 1}, "a", null]));
        assert_eq!(normalized.as_value(), &json!(["a", "b", null, {"k": 1}]));
    }

    #[test]
    fn test_multiplicity_is_kept() {
        assert_ne!(normalize(&json!([1, 1, 2])), normalize(&json!([1, 2, 2])));
        assert_ne!(normalize(&json!([1, 2])), normalize(&json!([1, 1, 2])));
    }

    #[test]
    fn test_nested_arrays_inside_objects() {
        let a = json!({"headers": [{"name": "b", "value": "2"}, {"value": "1", "name": "a"}]});
        let b = json!({"headers": [{"name": "a", "value": "1"}, {"name": "b", "value": "2"}]});
        assert_eq!(normalize(&a), normalize(&b));
    }

    #[test]
    fn test_integral_floats_become_integers() {
        assert_eq!(normalize(&json!(1.0)), normalize(&json!(1)));
        assert_eq!(normalize(&json!(-3.0)).as_value(), &json!(-3));
        assert_eq!(normalize(&json!(-0.0)).as_value(), &json!(0));
        assert_eq!(normalize(&json!(1.5)).as_value(), &json!(1.5));
        assert_eq!(normalize(&json!(1e300)).as_value(), &json!(1e300));
        assert_eq!(normalize(&json!([2.0, 1, 3.0])).as_value(), &json!([1, 2, 3]));
    }

    #[test]
    fn test_pretty_string_uses_four_spaces() {
        let rendered = normalize(&json!({"msg": "hello"})).to_pretty_string();
        assert_eq!(rendered, "{\n    \"msg\": \"hello\"\n}");
    }
}
