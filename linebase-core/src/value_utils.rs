//! Value utility functions shared across modules
//!
//! Dot-path access into records, ordering and structural equality of JSON
//! values, and a canonical string form used for de-duplication.

use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

/// Resolve a dot-notation path inside a record.
///
/// Supports nested objects (`"address.city"`) and array indexing
/// (`"items.0.name"`). An empty path resolves to nothing.
///
/// ```
/// use serde_json::json;
/// use linebase_core::value_utils::get_path;
///
/// let doc = json!({"address": {"city": "NYC"}});
/// let map = doc.as_object().unwrap();
/// assert_eq!(get_path(map, "address.city"), Some(&json!("NYC")));
/// ```
pub fn get_path<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    let mut parts = path.split('.');
    let mut value = map.get(parts.next()?)?;
    for part in parts {
        value = step(value, part)?;
    }
    Some(value)
}

/// Same as [`get_path`] but rooted at an arbitrary value (aggregation works on
/// plain `Value`s rather than records).
pub fn get_nested_value<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    match doc {
        Value::Object(map) => get_path(map, path),
        _ => None,
    }
}

fn step<'a>(value: &'a Value, part: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(part),
        Value::Array(arr) => part.parse::<usize>().ok().and_then(|i| arr.get(i)),
        _ => None,
    }
}

/// Set a value at a dot-notation path, creating intermediate objects.
///
/// A non-object value standing in the way is replaced by an object. Array
/// segments are followed by index when in bounds.
pub fn set_path(map: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            map.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            set_in_value(child, rest, value);
        }
    }
}

fn set_in_value(current: &mut Value, path: &str, value: Value) {
    if let Value::Array(arr) = current {
        let (head, rest) = match path.split_once('.') {
            Some((h, r)) => (h, Some(r)),
            None => (path, None),
        };
        if let Some(slot) = head.parse::<usize>().ok().and_then(|i| arr.get_mut(i)) {
            match rest {
                Some(rest) => set_in_value(slot, rest, value),
                None => *slot = value,
            }
        }
        return;
    }
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(map) = current {
        set_path(map, path, value);
    }
}

/// Remove the value at a dot-notation path, keeping sibling order intact.
pub fn remove_path(map: &mut Map<String, Value>, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => map.shift_remove(path),
        Some((head, rest)) => match map.get_mut(head)? {
            Value::Object(child) => remove_path(child, rest),
            _ => None,
        },
    }
}

/// Order two JSON values.
///
/// - Number vs Number: numeric
/// - String vs String: lexicographic
/// - Bool vs Bool: `false < true`
/// - Number vs String: numeric when the string parses as a number, otherwise
///   lexicographic on the number's text
/// - anything else: `None` (not comparable)
///
/// ```
/// use serde_json::json;
/// use std::cmp::Ordering;
/// use linebase_core::value_utils::compare_values;
///
/// assert_eq!(compare_values(&json!(10), &json!(5)), Some(Ordering::Greater));
/// assert_eq!(compare_values(&json!("a"), &json!("b")), Some(Ordering::Less));
/// assert_eq!(compare_values(&json!("10"), &json!(9)), Some(Ordering::Greater));
/// assert_eq!(compare_values(&json!(null), &json!(1)), None);
/// ```
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(n1), Value::Number(n2)) => compare_numbers(n1, n2),
        (Value::String(s1), Value::String(s2)) => Some(s1.cmp(s2)),
        (Value::Bool(b1), Value::Bool(b2)) => Some(b1.cmp(b2)),
        (Value::Number(n), Value::String(s)) => compare_number_with_text(n, s),
        (Value::String(s), Value::Number(n)) => compare_number_with_text(n, s).map(Ordering::reverse),
        _ => None,
    }
}

/// Integers compare exactly; f64 only when either side is a float.
fn compare_numbers(n1: &Number, n2: &Number) -> Option<Ordering> {
    match (as_integer(n1), as_integer(n2)) {
        (Some(i1), Some(i2)) => Some(i1.cmp(&i2)),
        _ => n1.as_f64()?.partial_cmp(&n2.as_f64()?),
    }
}

fn as_integer(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

fn compare_number_with_text(n: &Number, s: &str) -> Option<Ordering> {
    match s.trim().parse::<f64>() {
        Ok(parsed) => n.as_f64()?.partial_cmp(&parsed),
        Err(_) => Some(n.to_string().as_str().cmp(s)),
    }
}

/// Structural equality with numeric normalisation (`1 == 1.0`).
///
/// Object key order is irrelevant; array order is significant.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n1), Value::Number(n2)) => {
            compare_numbers(n1, n2) == Some(Ordering::Equal)
        }
        (Value::Array(a1), Value::Array(a2)) => {
            a1.len() == a2.len() && a1.iter().zip(a2).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(m1), Value::Object(m2)) => {
            m1.len() == m2.len()
                && m1
                    .iter()
                    .all(|(k, v)| m2.get(k).map_or(false, |other| values_equal(v, other)))
        }
        _ => a == b,
    }
}

/// Total order for sorting; missing values sort first.
///
/// Comparable pairs use [`compare_values`]; otherwise the type rank decides:
/// null < number < string < bool < object < array.
pub fn compare_values_with_none(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(av), Some(bv)) => match (av, bv) {
            // Mixed number/string goes by type rank so sorting stays transitive
            (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
                type_rank(av).cmp(&type_rank(bv))
            }
            _ => compare_values(av, bv).unwrap_or_else(|| type_rank(av).cmp(&type_rank(bv))),
        },
    }
}

fn type_rank(val: &Value) -> u8 {
    match val {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Bool(_) => 3,
        Value::Object(_) => 4,
        Value::Array(_) => 5,
    }
}

/// Canonical string form of a value with object keys sorted.
///
/// Two logically equal values produce the same string (object key order is
/// ignored, integral floats print as integers), which makes it usable as a
/// hash key for `distinct` and `$group`.
///
/// ```
/// use serde_json::json;
/// use linebase_core::value_utils::canonical_json_string;
///
/// let v1 = json!({"a": 1, "b": 2});
/// let v2 = json!({"b": 2, "a": 1});
/// assert_eq!(canonical_json_string(&v1), canonical_json_string(&v2));
/// ```
pub fn canonical_json_string(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(b.0));

            let inner = pairs
                .iter()
                .map(|(k, v)| format!("{}:{}", Value::String((*k).clone()), canonical_json_string(v)))
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{}}}", inner)
        }
        Value::Array(arr) => {
            let inner = arr
                .iter()
                .map(canonical_json_string)
                .collect::<Vec<_>>()
                .join(",");
            format!("[{}]", inner)
        }
        Value::Number(n) => match n.as_f64() {
            // 2^53: beyond this f64 no longer holds every integer
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        _ => value.to_string(),
    }
}
