// collection/schema.rs
// Declared field names. Informational only: never used to reject or reshape data.

use serde::{Deserialize, Serialize};

use crate::document::Document;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: Vec<String>,
}

impl Schema {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        fields.into_iter().collect()
    }

    /// No declared fields
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn declares(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    /// Top-level fields of `doc` the schema does not mention.
    /// Always empty for an empty schema.
    pub fn undeclared<'a>(&self, doc: &'a Document) -> Vec<&'a str> {
        if self.fields.is_empty() {
            return Vec::new();
        }
        doc.fields()
            .keys()
            .map(String::as_str)
            .filter(|key| !self.declares(key))
            .collect()
    }
}

impl<S: Into<String>> FromIterator<S> for Schema {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut fields: Vec<String> = Vec::new();
        for field in iter {
            let field = field.into();
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
        Schema { fields }
    }
}
