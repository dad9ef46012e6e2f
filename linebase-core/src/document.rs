// linebase-core/src/document.rs
//! Records and the line codec.
//!
//! A record is an ordered JSON object. On disk each record occupies exactly
//! one line of compact JSON; string escaping guarantees the encoded form never
//! contains a raw line terminator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{LineBaseError, Result};
use crate::value_utils::{get_path, remove_path, set_path};

/// Schema-less record: field name → JSON value, insertion order preserved
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: Map<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Document { fields }
    }

    /// Build a record from a JSON value; only objects are records.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Document { fields }),
            other => Err(LineBaseError::InvalidQuery(format!(
                "record must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field lookup with dot notation (`"address.city"`, `"items.0"`)
    pub fn get(&self, path: &str) -> Option<&Value> {
        get_path(&self.fields, path)
    }

    /// Top-level set; keeps the field's position if it already exists
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    pub fn set_nested(&mut self, path: &str, value: Value) {
        set_path(&mut self.fields, path, value);
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.shift_remove(field)
    }

    pub fn remove_nested(&mut self, path: &str) -> Option<Value> {
        remove_path(&mut self.fields, path)
    }

    /// Top-level presence check (no dot notation)
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Shallow merge: patch fields overwrite, everything else survives.
    ///
    /// Returns true when at least one field actually changed.
    pub fn merge(&mut self, patch: &Map<String, Value>) -> bool {
        let mut changed = false;
        for (key, value) in patch {
            if self.fields.get(key) != Some(value) {
                self.fields.insert(key.clone(), value.clone());
                changed = true;
            }
        }
        changed
    }

    /// Encode as a single line (no trailing newline)
    pub fn encode(&self) -> Result<String> {
        encode(self)
    }
}

impl From<Map<String, Value>> for Document {
    fn from(fields: Map<String, Value>) -> Self {
        Document { fields }
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Object(doc.fields)
    }
}

impl TryFrom<Value> for Document {
    type Error = LineBaseError;

    fn try_from(value: Value) -> Result<Self> {
        Document::from_value(value)
    }
}

/// Encode one record as one line of compact JSON.
pub fn encode(doc: &Document) -> Result<String> {
    Ok(serde_json::to_string(&doc.fields)?)
}

/// Decode one line into a record.
///
/// The input is treated as line 1 for error reporting; the streaming paths use
/// [`decode_line`] to report the real position.
pub fn decode(line: &str) -> Result<Document> {
    decode_line(line, 1)
}

/// Decode with an explicit 1-based line number for error context.
pub fn decode_line(line: &str, line_no: usize) -> Result<Document> {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(fields)) => Ok(Document { fields }),
        Ok(other) => Err(LineBaseError::malformed(
            line_no,
            line,
            format!("expected a JSON object, found {}", json_type_name(&other)),
        )),
        Err(e) => Err(LineBaseError::malformed(line_no, line, e.to_string())),
    }
}

/// Lines that carry no record (empty or whitespace only)
#[inline]
pub fn is_filler(line: &str) -> bool {
    line.trim().is_empty()
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
