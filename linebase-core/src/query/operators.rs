// linebase-core/src/query/operators.rs
//! Field-level operators.
//!
//! A field constraint such as `{"age": {"$gte": 18, "$lt": 65}}` is parsed
//! once into a list of [`Condition`]s. Evaluation is a `match` over the
//! condition tag against the field's value (or its absence).
//!
//! Operators may be spelled with a `$` prefix (`$gte`) or bare (`gte`). One
//! object must use one spelling throughout.

use std::num::NonZeroUsize;

use lazy_static::lazy_static;
use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::{Map, Value};

use super::Filter;
use crate::error::{LineBaseError, Result};
use crate::value_utils::{compare_values, values_equal};

// ============================================================================
// REGEX CACHE
// ============================================================================

const REGEX_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(100) {
    Some(n) => n,
    None => panic!("regex cache capacity must be non-zero"),
};

lazy_static! {
    /// Compiled patterns keyed by "options/pattern"
    static ref REGEX_CACHE: Mutex<LruCache<String, Regex>> =
        Mutex::new(LruCache::new(REGEX_CACHE_CAPACITY));
}

/// Compile a pattern with MongoDB-style option letters (`i`, `m`, `s`, `x`).
fn compile_regex(pattern: &str, options: &str) -> Result<Regex> {
    if let Some(bad) = options.chars().find(|c| !matches!(c, 'i' | 'm' | 's' | 'x')) {
        return Err(LineBaseError::InvalidQuery(format!(
            "Unsupported regex option '{}'",
            bad
        )));
    }

    let cache_key = format!("{}/{}", options, pattern);
    if let Some(regex) = REGEX_CACHE.lock().get(&cache_key) {
        return Ok(regex.clone());
    }

    let source = if options.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{}){}", options, pattern)
    };
    let regex = Regex::new(&source).map_err(|e| {
        LineBaseError::InvalidQuery(format!("Invalid regex pattern '{}': {}", pattern, e))
    })?;

    REGEX_CACHE.lock().put(cache_key, regex.clone());
    Ok(regex)
}

// ============================================================================
// OPERATOR TAGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Exists,
    Regex,
    Options,
    All,
    Size,
    ElemMatch,
    Type,
    Not,
}

impl Operator {
    /// Look up an operator by its bare name (no `$`)
    pub fn from_name(name: &str) -> Option<Operator> {
        let op = match name {
            "eq" => Operator::Eq,
            "ne" => Operator::Ne,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "in" => Operator::In,
            "nin" => Operator::Nin,
            "exists" => Operator::Exists,
            "regex" => Operator::Regex,
            "options" => Operator::Options,
            "all" => Operator::All,
            "size" => Operator::Size,
            "elemMatch" => Operator::ElemMatch,
            "type" => Operator::Type,
            "not" => Operator::Not,
            _ => return None,
        };
        Some(op)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::In => "in",
            Operator::Nin => "nin",
            Operator::Exists => "exists",
            Operator::Regex => "regex",
            Operator::Options => "options",
            Operator::All => "all",
            Operator::Size => "size",
            Operator::ElemMatch => "elemMatch",
            Operator::Type => "type",
            Operator::Not => "not",
        }
    }
}

/// How the keys of an operator object are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Spelling {
    Dollar,
    Bare,
}

impl Spelling {
    fn strip<'a>(&self, key: &'a str) -> &'a str {
        match self {
            Spelling::Dollar => key.trim_start_matches('$'),
            Spelling::Bare => key,
        }
    }

    fn key(&self, op: Operator) -> String {
        match self {
            Spelling::Dollar => format!("${}", op.name()),
            Spelling::Bare => op.name().to_string(),
        }
    }
}

/// Decide whether an object is an operator expression or a literal.
///
/// - every key `$`-prefixed: operator object (unknown `$` names are an error)
/// - some keys `$`-prefixed: error, operators and fields cannot mix
/// - every key a known bare operator name: operator object
/// - otherwise: literal sub-document compared by equality
fn spelling_of(obj: &Map<String, Value>) -> Result<Option<Spelling>> {
    if obj.is_empty() {
        return Ok(None);
    }

    let dollar_keys = obj.keys().filter(|k| k.starts_with('$')).count();
    if dollar_keys == obj.len() {
        for key in obj.keys() {
            if Operator::from_name(&key[1..]).is_none() {
                return Err(LineBaseError::InvalidQuery(format!("Unknown operator: {}", key)));
            }
        }
        return Ok(Some(Spelling::Dollar));
    }
    if dollar_keys > 0 {
        return Err(LineBaseError::InvalidQuery(
            "Cannot mix $-operators and plain fields in one condition".to_string(),
        ));
    }

    if obj.keys().all(|k| Operator::from_name(k).is_some()) {
        Ok(Some(Spelling::Bare))
    } else {
        Ok(None)
    }
}

// ============================================================================
// CONDITIONS
// ============================================================================

/// JSON type names accepted by `type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonType {
    Number,
    Integer,
    String,
    Object,
    Array,
    Bool,
    Null,
}

impl JsonType {
    fn parse(operand: &Value) -> Result<JsonType> {
        let name = match operand {
            Value::String(s) => s.as_str(),
            // BSON type numbers (subset)
            Value::Number(n) => match n.as_i64() {
                Some(1) => "double",
                Some(2) => "string",
                Some(3) => "object",
                Some(4) => "array",
                Some(8) => "bool",
                Some(10) => "null",
                Some(16) | Some(18) => "int",
                _ => {
                    return Err(LineBaseError::InvalidQuery(format!(
                        "Unknown BSON type number: {}",
                        n
                    )))
                }
            },
            _ => {
                return Err(LineBaseError::InvalidQuery(
                    "type operator requires a string or number".to_string(),
                ))
            }
        };

        match name {
            "double" | "number" => Ok(JsonType::Number),
            "int" | "long" | "integer" => Ok(JsonType::Integer),
            "string" => Ok(JsonType::String),
            "object" => Ok(JsonType::Object),
            "array" => Ok(JsonType::Array),
            "bool" | "boolean" => Ok(JsonType::Bool),
            "null" => Ok(JsonType::Null),
            other => Err(LineBaseError::InvalidQuery(format!("Unknown type name: {}", other))),
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            JsonType::Number => value.is_number(),
            JsonType::Integer => value.is_i64() || value.is_u64(),
            JsonType::String => value.is_string(),
            JsonType::Object => value.is_object(),
            JsonType::Array => value.is_array(),
            JsonType::Bool => value.is_boolean(),
            JsonType::Null => value.is_null(),
        }
    }
}

/// Body of an `elemMatch`
#[derive(Debug, Clone)]
pub enum ElemMatch {
    /// `{"items": {"$elemMatch": {"sku": "A1", "qty": {"$gt": 2}}}}`
    Document(Box<Filter>),
    /// `{"scores": {"$elemMatch": {"$gte": 80, "$lt": 90}}}`
    Value(Vec<Condition>),
}

/// One parsed operator with its operand
#[derive(Debug, Clone)]
pub enum Condition {
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
    All(Vec<Value>),
    Size(usize),
    ElemMatch(ElemMatch),
    Type(JsonType),
    /// Negation of the conjunction of the inner conditions
    Not(Vec<Condition>),
}

impl Condition {
    /// Evaluate against a field value; `None` means the field is absent.
    ///
    /// An absent field never satisfies a comparison. Only `exists: false`
    /// and `not` (explicit negation) can match it.
    pub fn matches(&self, value: Option<&Value>) -> bool {
        let v = match value {
            Some(v) => v,
            None => {
                return match self {
                    Condition::Exists(should_exist) => !*should_exist,
                    Condition::Not(inner) => !inner.iter().all(|c| c.matches(None)),
                    _ => false,
                }
            }
        };

        match self {
            Condition::Eq(expected) => eq_or_contains(v, expected),
            Condition::Ne(expected) => !eq_or_contains(v, expected),
            Condition::Gt(operand) => compare_any(v, operand, |o| o.is_gt()),
            Condition::Gte(operand) => compare_any(v, operand, |o| o.is_ge()),
            Condition::Lt(operand) => compare_any(v, operand, |o| o.is_lt()),
            Condition::Lte(operand) => compare_any(v, operand, |o| o.is_le()),
            Condition::In(set) => set.iter().any(|candidate| eq_or_contains(v, candidate)),
            Condition::Nin(set) => !set.iter().any(|candidate| eq_or_contains(v, candidate)),
            Condition::Exists(should_exist) => *should_exist,
            Condition::Regex(re) => match v {
                Value::String(s) => re.is_match(s),
                Value::Array(arr) => arr.iter().any(|e| e.as_str().map_or(false, |s| re.is_match(s))),
                _ => false,
            },
            Condition::All(required) => match v {
                Value::Array(arr) => required
                    .iter()
                    .all(|req| arr.iter().any(|e| values_equal(e, req))),
                _ => false,
            },
            Condition::Size(size) => v.as_array().map_or(false, |arr| arr.len() == *size),
            Condition::ElemMatch(body) => match v {
                Value::Array(arr) => arr.iter().any(|elem| match body {
                    ElemMatch::Document(filter) => {
                        elem.as_object().map_or(false, |obj| filter.matches_map(obj))
                    }
                    ElemMatch::Value(conditions) => conditions.iter().all(|c| c.matches(Some(elem))),
                }),
                _ => false,
            },
            Condition::Type(ty) => ty.matches(v),
            Condition::Not(inner) => !inner.iter().all(|c| c.matches(Some(v))),
        }
    }
}

/// Equality with MongoDB array semantics: an array field also matches when
/// any of its elements equals the operand.
fn eq_or_contains(value: &Value, expected: &Value) -> bool {
    if values_equal(value, expected) {
        return true;
    }
    match value {
        Value::Array(arr) => arr.iter().any(|elem| values_equal(elem, expected)),
        _ => false,
    }
}

/// Ordered comparison, direct or against any array element
fn compare_any<F>(value: &Value, operand: &Value, accept: F) -> bool
where
    F: Fn(std::cmp::Ordering) -> bool,
{
    if let Some(ordering) = compare_values(value, operand) {
        if accept(ordering) {
            return true;
        }
    }
    match value {
        Value::Array(arr) => arr
            .iter()
            .any(|elem| compare_values(elem, operand).map_or(false, &accept)),
        _ => false,
    }
}

// ============================================================================
// PARSING
// ============================================================================

/// Parse the right-hand side of a field constraint.
///
/// Literals (including plain sub-documents) become a single equality.
pub(crate) fn parse_field_value(value: &Value) -> Result<Vec<Condition>> {
    if let Value::Object(obj) = value {
        if let Some(spelling) = spelling_of(obj)? {
            return parse_operator_object(obj, spelling);
        }
    }
    Ok(vec![Condition::Eq(value.clone())])
}

fn parse_operator_object(obj: &Map<String, Value>, spelling: Spelling) -> Result<Vec<Condition>> {
    let options = match obj.get(&spelling.key(Operator::Options)) {
        Some(Value::String(s)) => Some(s.as_str()),
        Some(_) => {
            return Err(LineBaseError::InvalidQuery(
                "options must be a string of regex flags".to_string(),
            ))
        }
        None => None,
    };
    if options.is_some() && !obj.contains_key(&spelling.key(Operator::Regex)) {
        return Err(LineBaseError::InvalidQuery(
            "options requires a regex in the same condition".to_string(),
        ));
    }

    let mut conditions = Vec::with_capacity(obj.len());
    for (key, operand) in obj {
        let name = spelling.strip(key);
        let op = Operator::from_name(name)
            .ok_or_else(|| LineBaseError::InvalidQuery(format!("Unknown operator: {}", key)))?;
        if op == Operator::Options {
            continue;
        }
        conditions.push(parse_condition(op, operand, options.unwrap_or(""))?);
    }
    Ok(conditions)
}

fn parse_condition(op: Operator, operand: &Value, regex_options: &str) -> Result<Condition> {
    let condition = match op {
        Operator::Eq => Condition::Eq(operand.clone()),
        Operator::Ne => Condition::Ne(operand.clone()),
        Operator::Gt => Condition::Gt(operand.clone()),
        Operator::Gte => Condition::Gte(operand.clone()),
        Operator::Lt => Condition::Lt(operand.clone()),
        Operator::Lte => Condition::Lte(operand.clone()),
        Operator::In => Condition::In(require_array(op, operand)?),
        Operator::Nin => Condition::Nin(require_array(op, operand)?),
        Operator::All => Condition::All(require_array(op, operand)?),
        Operator::Exists => match operand {
            Value::Bool(b) => Condition::Exists(*b),
            _ => {
                return Err(LineBaseError::InvalidQuery(
                    "exists operator requires a boolean".to_string(),
                ))
            }
        },
        Operator::Regex => match operand {
            Value::String(pattern) => Condition::Regex(compile_regex(pattern, regex_options)?),
            _ => {
                return Err(LineBaseError::InvalidQuery(
                    "regex operator requires a string pattern".to_string(),
                ))
            }
        },
        Operator::Size => match operand.as_u64() {
            Some(n) => Condition::Size(n as usize),
            None => {
                return Err(LineBaseError::InvalidQuery(
                    "size operator requires a non-negative integer".to_string(),
                ))
            }
        },
        Operator::ElemMatch => {
            let obj = operand.as_object().ok_or_else(|| {
                LineBaseError::InvalidQuery("elemMatch requires an object".to_string())
            })?;
            match spelling_of(obj)? {
                Some(spelling) => {
                    Condition::ElemMatch(ElemMatch::Value(parse_operator_object(obj, spelling)?))
                }
                None => Condition::ElemMatch(ElemMatch::Document(Box::new(Filter::parse_object(obj)?))),
            }
        }
        Operator::Type => Condition::Type(JsonType::parse(operand)?),
        Operator::Not => match operand {
            Value::String(pattern) => Condition::Not(vec![Condition::Regex(compile_regex(pattern, "")?)]),
            Value::Object(obj) => match spelling_of(obj)? {
                Some(spelling) => Condition::Not(parse_operator_object(obj, spelling)?),
                None => {
                    return Err(LineBaseError::InvalidQuery(
                        "not requires an operator expression".to_string(),
                    ))
                }
            },
            _ => {
                return Err(LineBaseError::InvalidQuery(
                    "not requires an operator expression".to_string(),
                ))
            }
        },
        Operator::Options => {
            return Err(LineBaseError::InvalidQuery(
                "options is only valid next to regex".to_string(),
            ))
        }
    };
    Ok(condition)
}

fn require_array(op: Operator, operand: &Value) -> Result<Vec<Value>> {
    operand.as_array().cloned().ok_or_else(|| {
        LineBaseError::InvalidQuery(format!("{} operator requires an array", op.name()))
    })
}
