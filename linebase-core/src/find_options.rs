// linebase-core/src/find_options.rs
// Read-side options: projection and pagination

use serde_json::{Map, Value};

use crate::document::Document;
use crate::error::{LineBaseError, Result};
use crate::value_utils::{get_path, set_path};

/// Field selection applied to each matching record
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    /// Whole records
    #[default]
    All,
    /// Only these fields (dot notation allowed), in this order
    Include(Vec<String>),
    /// Everything except these fields
    Exclude(Vec<String>),
}

impl Projection {
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Include(fields.into_iter().map(Into::into).collect())
    }

    pub fn exclude<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Exclude(fields.into_iter().map(Into::into).collect())
    }

    /// Parse `{"field": 1 | 0 | true | false, ...}`.
    ///
    /// Inclusion and exclusion cannot be combined in one projection.
    pub fn from_json(spec: &Value) -> Result<Self> {
        let obj = match spec {
            Value::Null => return Ok(Projection::All),
            Value::Object(obj) => obj,
            other => {
                return Err(LineBaseError::InvalidQuery(format!(
                    "projection must be an object, got {}",
                    other
                )))
            }
        };

        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for (field, flag) in obj {
            let keep = match flag {
                Value::Bool(b) => *b,
                Value::Number(n) if n.as_f64() == Some(1.0) => true,
                Value::Number(n) if n.as_f64() == Some(0.0) => false,
                other => {
                    return Err(LineBaseError::InvalidQuery(format!(
                        "projection value for '{}' must be 0, 1, true or false, got {}",
                        field, other
                    )))
                }
            };
            if keep {
                include.push(field.clone());
            } else {
                exclude.push(field.clone());
            }
        }

        match (include.is_empty(), exclude.is_empty()) {
            (true, true) => Ok(Projection::All),
            (false, true) => Ok(Projection::Include(include)),
            (true, false) => Ok(Projection::Exclude(exclude)),
            (false, false) => Err(LineBaseError::InvalidQuery(
                "projection cannot mix included and excluded fields".to_string(),
            )),
        }
    }

    pub fn is_all(&self) -> bool {
        match self {
            Projection::All => true,
            Projection::Include(fields) | Projection::Exclude(fields) => fields.is_empty(),
        }
    }

    pub fn apply(&self, doc: Document) -> Document {
        match self {
            Projection::All => doc,
            Projection::Include(fields) if fields.is_empty() => doc,
            Projection::Include(fields) => {
                let mut result = Map::new();
                for field in fields {
                    if let Some(value) = get_path(doc.fields(), field) {
                        set_path(&mut result, field, value.clone());
                    }
                }
                Document::from_map(result)
            }
            Projection::Exclude(fields) => {
                let mut doc = doc;
                for field in fields {
                    doc.remove_nested(field);
                }
                doc
            }
        }
    }
}

/// One page of matches plus the exact number of matches overall
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    pub records: Vec<Document>,
    pub total: usize,
    /// 1-based
    pub page: usize,
    pub page_size: usize,
}

impl Page {
    pub fn total_pages(&self) -> usize {
        if self.page_size == 0 {
            0
        } else {
            self.total.div_ceil(self.page_size)
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }
}

/// Number of matches to skip before `page` starts
pub(crate) fn page_offset(page: usize, page_size: usize) -> Result<usize> {
    if page == 0 {
        return Err(LineBaseError::InvalidQuery("page numbers start at 1".to_string()));
    }
    if page_size == 0 {
        return Err(LineBaseError::InvalidQuery("page size must be at least 1".to_string()));
    }
    (page - 1)
        .checked_mul(page_size)
        .ok_or_else(|| LineBaseError::InvalidQuery("page offset overflows".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        Document::from_value(v).unwrap()
    }

    #[test]
    fn test_projection_include_mode() {
        let p = Projection::from_json(&json!({"name": 1, "age": true})).unwrap();
        let out = p.apply(doc(json!({"name": "Alice", "age": 30, "city": "NYC"})));
        assert_eq!(out, doc(json!({"name": "Alice", "age": 30})));
    }

    #[test]
    fn test_projection_exclude_mode() {
        let p = Projection::from_json(&json!({"city": 0})).unwrap();
        let out = p.apply(doc(json!({"name": "Alice", "age": 30, "city": "NYC"})));
        assert_eq!(out.encode().unwrap(), r#"{"name":"Alice","age":30}"#);
    }

    #[test]
    fn test_projection_mixed_rejected() {
        let err = Projection::from_json(&json!({"name": 1, "city": 0})).unwrap_err();
        assert!(matches!(err, LineBaseError::InvalidQuery(_)));
    }

    #[test]
    fn test_projection_bad_flag_rejected() {
        assert!(Projection::from_json(&json!({"name": 2})).is_err());
        assert!(Projection::from_json(&json!({"name": "yes"})).is_err());
        assert!(Projection::from_json(&json!(["name"])).is_err());
    }

    #[test]
    fn test_empty_projection_returns_whole_record() {
        let p = Projection::from_json(&json!({})).unwrap();
        assert!(p.is_all());
        let record = doc(json!({"a": 1, "b": 2}));
        assert_eq!(p.apply(record.clone()), record);
        assert_eq!(Projection::include(Vec::<String>::new()).apply(record.clone()), record);
    }

    #[test]
    fn test_projection_dot_notation() {
        let record = doc(json!({
            "name": "Alice",
            "address": {"city": "NYC", "street": "123 Main St"}
        }));

        let include = Projection::include(["address.city"]).apply(record.clone());
        assert_eq!(include, doc(json!({"address": {"city": "NYC"}})));

        let exclude = Projection::exclude(["address.street"]).apply(record);
        assert_eq!(exclude, doc(json!({"name": "Alice", "address": {"city": "NYC"}})));
    }

    #[test]
    fn test_projection_missing_fields_skipped() {
        let out = Projection::include(["email"]).apply(doc(json!({"name": "Bob"})));
        assert!(out.is_empty());
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(page_offset(1, 10).unwrap(), 0);
        assert_eq!(page_offset(3, 2).unwrap(), 4);
        assert!(page_offset(0, 10).is_err());
        assert!(page_offset(1, 0).is_err());
        assert!(page_offset(usize::MAX, 2).is_err());
    }

    #[test]
    fn test_page_navigation() {
        let page = Page { records: Vec::new(), total: 5, page: 2, page_size: 2 };
        assert_eq!(page.total_pages(), 3);
        assert!(page.has_next());

        let last = Page { page: 3, ..page };
        assert!(!last.has_next());
    }

    #[test]
    fn test_total_pages_with_huge_page_size() {
        let page = Page { records: Vec::new(), total: 2, page: 1, page_size: usize::MAX };
        assert_eq!(page.total_pages(), 1);
        assert!(!page.has_next());

        let page = Page { records: Vec::new(), total: usize::MAX, page: 1, page_size: 2 };
        assert_eq!(page.total_pages(), usize::MAX / 2 + 1);
    }
}
