// linebase-core/src/query.rs
//! MongoDB-like filters.
//!
//! A filter document is parsed once into a [`Filter`] tree, then evaluated
//! against any number of records. Parsing rejects malformed filters with
//! `InvalidQuery`; evaluation never fails.
//!
//! ```
//! use linebase_core::document::Document;
//! use linebase_core::query::Filter;
//! use serde_json::json;
//!
//! let filter = Filter::parse(&json!({"age": {"$gte": 18}, "city": "NYC"})).unwrap();
//! let alice = Document::from_value(json!({"name": "Alice", "age": 25, "city": "NYC"})).unwrap();
//! assert!(filter.matches(&alice));
//! ```

pub mod operators;

use serde_json::{Map, Value};

use crate::document::Document;
use crate::error::{LineBaseError, Result};
use crate::value_utils::get_path;

pub use operators::{Condition, ElemMatch, JsonType, Operator};

#[derive(Debug, Clone, Default)]
pub enum Filter {
    /// Empty filter; matches every record
    #[default]
    All,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    /// Constraints on one (dot-notation) field, AND-ed
    Field {
        path: String,
        conditions: Vec<Condition>,
    },
}

impl Filter {
    /// Parse a filter document. `null` is accepted as the empty filter.
    ///
    /// A field value that is an object whose keys are all operator names, in
    /// either the `$gte` or the bare `gte` spelling, is read as operators and
    /// never as a literal sub-document. So `{"dims": {"size": 3}}` means
    /// "array `dims` has 3 elements", and `{"meta": {"type": "x"}}` is rejected
    /// because `x` is not a type name. To match such a sub-document literally,
    /// wrap it in `eq`: `{"dims": {"eq": {"size": 3}}}`.
    pub fn parse(filter: &Value) -> Result<Filter> {
        match filter {
            Value::Object(obj) => Filter::parse_object(obj),
            Value::Null => Ok(Filter::All),
            other => Err(LineBaseError::InvalidQuery(format!(
                "filter must be an object, got {}",
                other
            ))),
        }
    }

    pub(crate) fn parse_object(obj: &Map<String, Value>) -> Result<Filter> {
        let mut clauses = Vec::with_capacity(obj.len());

        for (key, value) in obj {
            let clause = match key.as_str() {
                "$and" => Filter::And(parse_clauses(key, value)?),
                "$or" => Filter::Or(parse_clauses(key, value)?),
                "$nor" => Filter::Nor(parse_clauses(key, value)?),
                k if k.starts_with('$') => {
                    return Err(LineBaseError::InvalidQuery(format!(
                        "Unknown top-level operator: {}",
                        k
                    )))
                }
                "" => {
                    return Err(LineBaseError::InvalidQuery(
                        "field path must not be empty".to_string(),
                    ))
                }
                path => Filter::Field {
                    path: path.to_string(),
                    conditions: operators::parse_field_value(value)?,
                },
            };
            clauses.push(clause);
        }

        Ok(match clauses.len() {
            0 => Filter::All,
            1 => clauses.pop().unwrap_or_default(),
            _ => Filter::And(clauses),
        })
    }

    pub fn is_match_all(&self) -> bool {
        matches!(self, Filter::All)
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.matches_map(document.fields())
    }

    /// Evaluate against a raw field map (aggregation and `elemMatch` work on
    /// maps that are not wrapped in a `Document`).
    pub fn matches_map(&self, fields: &Map<String, Value>) -> bool {
        match self {
            Filter::All => true,
            Filter::And(clauses) => clauses.iter().all(|f| f.matches_map(fields)),
            Filter::Or(clauses) => clauses.iter().any(|f| f.matches_map(fields)),
            Filter::Nor(clauses) => !clauses.iter().any(|f| f.matches_map(fields)),
            Filter::Field { path, conditions } => {
                let value = get_path(fields, path);
                conditions.iter().all(|c| c.matches(value))
            }
        }
    }
}

fn parse_clauses(op: &str, value: &Value) -> Result<Vec<Filter>> {
    let items = value.as_array().ok_or_else(|| {
        LineBaseError::InvalidQuery(format!("{} requires an array of filters", op))
    })?;
    if items.is_empty() {
        return Err(LineBaseError::InvalidQuery(format!(
            "{} requires a non-empty array",
            op
        )));
    }
    items
        .iter()
        .map(|item| match item {
            Value::Object(obj) => Filter::parse_object(obj),
            other => Err(LineBaseError::InvalidQuery(format!(
                "{} entries must be objects, got {}",
                op, other
            ))),
        })
        .collect()
}

/// One-shot convenience: parse `filter` and evaluate it against `document`.
pub fn matches_filter(document: &Document, filter: &Value) -> Result<bool> {
    Ok(Filter::parse(filter)?.matches(document))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        Document::from_value(v).unwrap()
    }

    fn matches(filter: Value, record: Value) -> bool {
        matches_filter(&doc(record), &filter).unwrap()
    }

    #[test]
    fn test_empty_filter_matches_all() {
        assert!(Filter::parse(&json!({})).unwrap().is_match_all());
        assert!(Filter::parse(&Value::Null).unwrap().is_match_all());
        assert!(matches(json!({}), json!({"name": "Alice"})));
        assert!(matches(json!({}), json!({})));
    }

    #[test]
    fn test_simple_equality() {
        assert!(matches(json!({"name": "Alice"}), json!({"name": "Alice", "age": 25})));
        assert!(!matches(json!({"name": "Alice"}), json!({"name": "Bob"})));
    }

    #[test]
    fn test_multiple_fields_are_anded() {
        let filter = json!({"age": {"$gte": 18, "$lt": 30}, "city": "NYC"});
        assert!(matches(filter.clone(), json!({"age": 25, "city": "NYC"})));
        assert!(!matches(filter.clone(), json!({"age": 25, "city": "LA"})));
        assert!(!matches(filter, json!({"age": 35, "city": "NYC"})));
    }

    #[test]
    fn test_nested_path_and_literal_subdocument() {
        let record = json!({"address": {"city": "Budapest", "zip": 1111}, "items": [{"sku": "A1"}]});
        assert!(matches(json!({"address.city": "Budapest"}), record.clone()));
        assert!(matches(json!({"items.0.sku": "A1"}), record.clone()));
        // key order irrelevant for literal sub-documents
        assert!(matches(json!({"address": {"zip": 1111, "city": "Budapest"}}), record.clone()));
        assert!(!matches(json!({"address": {"city": "Budapest"}}), record));
    }

    #[test]
    fn test_logical_and_or_nor() {
        let young_or_old = json!({"$or": [{"age": {"$lt": 18}}, {"age": {"$gt": 65}}]});
        assert!(matches(young_or_old.clone(), json!({"age": 15})));
        assert!(matches(young_or_old.clone(), json!({"age": 70})));
        assert!(!matches(young_or_old, json!({"age": 30})));

        let nor = json!({"$nor": [{"city": "NYC"}, {"city": "LA"}]});
        assert!(matches(nor.clone(), json!({"city": "SF"})));
        assert!(!matches(nor, json!({"city": "LA"})));

        let nested = json!({
            "$and": [
                {"$or": [{"city": "NYC"}, {"city": "LA"}]},
                {"age": {"$gte": 25}},
                {"active": true}
            ]
        });
        assert!(matches(nested.clone(), json!({"city": "NYC", "age": 30, "active": true})));
        assert!(!matches(nested.clone(), json!({"city": "LA", "age": 20, "active": true})));
        assert!(!matches(nested, json!({"city": "Chicago", "age": 30, "active": true})));
    }

    #[test]
    fn test_missing_field_no_match() {
        assert!(!matches(json!({"email": null}), json!({"name": "Alice"})));
        assert!(!matches(json!({"email": {"$ne": "x"}}), json!({"name": "Alice"})));
        assert!(matches(json!({"email": {"$exists": false}}), json!({"name": "Alice"})));
        assert!(matches(json!({"email": null}), json!({"email": null})));
    }

    #[test]
    fn test_parse_errors() {
        for bad in [
            json!([1, 2]),
            json!("name"),
            json!({"$where": "1"}),
            json!({"$or": {"a": 1}}),
            json!({"$or": []}),
            json!({"$and": [1]}),
            json!({"": 1}),
            json!({"age": {"$gt": 1, "plain": 2}}),
        ] {
            let err = Filter::parse(&bad).unwrap_err();
            assert!(matches!(err, LineBaseError::InvalidQuery(_)), "{} -> {:?}", bad, err);
        }
    }

    #[test]
    fn test_single_clause_is_not_wrapped() {
        let f = Filter::parse(&json!({"a": 1})).unwrap();
        assert!(matches!(f, Filter::Field { ref path, .. } if path == "a"));
    }

    #[test]
    fn test_filter_is_reusable() {
        let f = Filter::parse(&json!({"n": {"$in": [1, 3]}})).unwrap();
        let hits: Vec<i64> = (1..=4)
            .filter(|n| f.matches(&doc(json!({"n": n}))))
            .collect();
        assert_eq!(hits, vec![1, 3]);
    }

    #[test]
    fn test_operator_named_literal_needs_eq() {
        let record = Document::from_value(json!({"dims": {"size": 3}, "meta": {"type": "x"}})).unwrap();

        assert!(!Filter::parse(&json!({"dims": {"size": 3}})).unwrap().matches(&record));
        assert!(Filter::parse(&json!({"meta": {"type": "x"}})).is_err());

        assert!(Filter::parse(&json!({"dims": {"eq": {"size": 3}}})).unwrap().matches(&record));
        assert!(Filter::parse(&json!({"meta": {"$eq": {"type": "x"}}})).unwrap().matches(&record));
    }
}
