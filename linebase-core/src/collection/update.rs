// collection/update.rs
// Update specs: shallow merge or $set / $unset / $inc

use serde_json::{Map, Number, Value};

use crate::document::Document;
use crate::error::{LineBaseError, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum UpdateSpec {
    /// Plain patch: top-level fields overwrite, the rest survives
    Merge(Map<String, Value>),
    Operators(Vec<UpdateOp>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum UpdateOp {
    Set(String, Value),
    Unset(String),
    Inc(String, Number),
}

impl UpdateSpec {
    /// A patch whose keys are all `$`-prefixed is an operator update;
    /// one without any `$` key is a merge. Mixing is rejected.
    pub fn parse(patch: &Value) -> Result<Self> {
        let obj = patch.as_object().ok_or_else(|| {
            LineBaseError::InvalidQuery(format!("update must be an object, got {}", patch))
        })?;

        let operator_keys = obj.keys().filter(|k| k.starts_with('$')).count();
        if operator_keys == 0 {
            return Ok(UpdateSpec::Merge(obj.clone()));
        }
        if operator_keys != obj.len() {
            return Err(LineBaseError::InvalidQuery(
                "update cannot mix $-operators and plain fields".to_string(),
            ));
        }

        let mut ops = Vec::new();
        for (op, fields) in obj {
            let fields = fields.as_object().ok_or_else(|| {
                LineBaseError::InvalidQuery(format!("{} requires an object", op))
            })?;
            for (field, value) in fields {
                let update = match op.as_str() {
                    "$set" => UpdateOp::Set(field.clone(), value.clone()),
                    "$unset" => UpdateOp::Unset(field.clone()),
                    "$inc" => match value {
                        Value::Number(n) => UpdateOp::Inc(field.clone(), n.clone()),
                        _ => {
                            return Err(LineBaseError::InvalidQuery(format!(
                                "$inc: increment for '{}' must be a number",
                                field
                            )))
                        }
                    },
                    _ => {
                        return Err(LineBaseError::InvalidQuery(format!(
                            "Unknown update operator: {}",
                            op
                        )))
                    }
                };
                ops.push(update);
            }
        }
        Ok(UpdateSpec::Operators(ops))
    }

    /// Apply to `doc`; returns whether anything changed.
    pub fn apply(&self, doc: &mut Document) -> Result<bool> {
        match self {
            UpdateSpec::Merge(patch) => Ok(doc.merge(patch)),
            UpdateSpec::Operators(ops) => {
                let mut was_modified = false;
                for op in ops {
                    was_modified |= op.apply(doc)?;
                }
                Ok(was_modified)
            }
        }
    }
}

impl UpdateOp {
    fn apply(&self, doc: &mut Document) -> Result<bool> {
        match self {
            UpdateOp::Set(field, value) => {
                if doc.get(field) == Some(value) {
                    return Ok(false);
                }
                doc.set_nested(field, value.clone());
                Ok(true)
            }
            UpdateOp::Unset(field) => Ok(doc.remove_nested(field).is_some()),
            UpdateOp::Inc(field, by) => {
                let next = match doc.get(field) {
                    None => Value::Number(by.clone()),
                    Some(Value::Number(current)) => add_numbers(current, by),
                    Some(other) => {
                        return Err(LineBaseError::InvalidQuery(format!(
                            "$inc: field '{}' is not numeric ({})",
                            field, other
                        )))
                    }
                };
                if doc.get(field) == Some(&next) {
                    return Ok(false);
                }
                doc.set_nested(field, next);
                Ok(true)
            }
        }
    }
}

/// Integer arithmetic while it fits, float otherwise
fn add_numbers(a: &Number, b: &Number) -> Value {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(sum) = x.checked_add(y) {
            return Value::from(sum);
        }
    }
    Value::from(a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0))
}
