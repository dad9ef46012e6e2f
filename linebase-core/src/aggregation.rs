// linebase-core/src/aggregation.rs
// Aggregation pipeline: parsed up front, executed in memory stage by stage

use ahash::AHashMap;
use serde_json::{Map, Value};

use crate::document::Document;
use crate::error::{LineBaseError, Result};
use crate::query::Filter;
use crate::value_utils::{canonical_json_string, compare_values_with_none, get_path, set_path};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn agg_error(message: impl Into<String>) -> LineBaseError {
    LineBaseError::AggregationError(message.into())
}

/// Parse a field reference (`"$address.city"` -> `"address.city"`)
fn parse_field_reference(value: &Value, op_name: &str) -> Result<String> {
    match value.as_str() {
        Some(s) if s.starts_with('$') && s.len() > 1 => Ok(s[1..].to_string()),
        Some(_) => Err(agg_error(format!(
            "{} field reference must start with $",
            op_name
        ))),
        None => Err(agg_error(format!("{} must be a field reference", op_name))),
    }
}

/// Exactly one `{"$op": spec}` pair
fn single_entry<'a>(obj: &'a Map<String, Value>, what: &str) -> Result<(&'a String, &'a Value)> {
    let mut entries = obj.iter();
    match (entries.next(), entries.next()) {
        (Some(entry), None) => Ok(entry),
        _ => Err(agg_error(format!("{} must have exactly one operator", what))),
    }
}

fn lookup<'a>(doc: &'a Document, field: &str) -> Option<&'a Value> {
    get_path(doc.fields(), field)
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Aggregation pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

/// Pipeline stage
#[derive(Debug, Clone)]
pub enum Stage {
    Match(MatchStage),
    Project(ProjectStage),
    Group(GroupStage),
    Sort(SortStage),
    Limit(LimitStage),
    Skip(SkipStage),
    Count(CountStage),
}

impl Pipeline {
    /// Parse and validate every stage. Nothing is executed here.
    pub fn from_json(pipeline_json: &Value) -> Result<Self> {
        let stages_array = pipeline_json
            .as_array()
            .ok_or_else(|| agg_error("Pipeline must be an array"))?;
        if stages_array.is_empty() {
            return Err(agg_error("Pipeline cannot be empty"));
        }

        let stages = stages_array
            .iter()
            .map(Stage::from_json)
            .collect::<Result<Vec<_>>>()?;
        Ok(Pipeline { stages })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Run the stages left to right. Stage order is never changed.
    pub fn execute(&self, docs: Vec<Document>) -> Vec<Document> {
        self.stages
            .iter()
            .fold(docs, |docs, stage| stage.execute(docs))
    }
}

impl Stage {
    fn from_json(stage_json: &Value) -> Result<Self> {
        let obj = stage_json
            .as_object()
            .ok_or_else(|| agg_error("Stage must be an object"))?;
        let (stage_name, spec) = single_entry(obj, "Each stage")?;

        match stage_name.as_str() {
            "$match" => Ok(Stage::Match(MatchStage::from_json(spec)?)),
            "$project" => Ok(Stage::Project(ProjectStage::from_json(spec)?)),
            "$group" => Ok(Stage::Group(GroupStage::from_json(spec)?)),
            "$sort" => Ok(Stage::Sort(SortStage::from_json(spec)?)),
            "$limit" => Ok(Stage::Limit(LimitStage::from_json(spec)?)),
            "$skip" => Ok(Stage::Skip(SkipStage::from_json(spec)?)),
            "$count" => Ok(Stage::Count(CountStage::from_json(spec)?)),
            _ => Err(agg_error(format!("Unknown pipeline stage: {}", stage_name))),
        }
    }

    fn execute(&self, docs: Vec<Document>) -> Vec<Document> {
        match self {
            Stage::Match(stage) => stage.execute(docs),
            Stage::Project(stage) => stage.execute(docs),
            Stage::Group(stage) => stage.execute(docs),
            Stage::Sort(stage) => stage.execute(docs),
            Stage::Limit(stage) => docs.into_iter().take(stage.limit).collect(),
            Stage::Skip(stage) => docs.into_iter().skip(stage.skip).collect(),
            Stage::Count(stage) => stage.execute(docs),
        }
    }
}

// ============================================================================
// $match
// ============================================================================

#[derive(Debug, Clone)]
pub struct MatchStage {
    filter: Filter,
}

impl MatchStage {
    fn from_json(spec: &Value) -> Result<Self> {
        if !spec.is_object() {
            return Err(agg_error("$match must be an object"));
        }
        let filter = Filter::parse(spec).map_err(|e| agg_error(format!("$match: {}", e)))?;
        Ok(MatchStage { filter })
    }

    fn execute(&self, docs: Vec<Document>) -> Vec<Document> {
        docs.into_iter().filter(|doc| self.filter.matches(doc)).collect()
    }
}

// ============================================================================
// $project
// ============================================================================

#[derive(Debug, Clone)]
pub struct ProjectStage {
    fields: Vec<(String, ProjectField)>,
    include_mode: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectField {
    Include,        // 1 / true
    Exclude,        // 0 / false
    Rename(String), // "$fieldName"
}

impl ProjectStage {
    fn from_json(spec: &Value) -> Result<Self> {
        let obj = spec
            .as_object()
            .ok_or_else(|| agg_error("$project must be an object"))?;
        if obj.is_empty() {
            return Err(agg_error("$project requires at least one field"));
        }

        let mut fields = Vec::with_capacity(obj.len());
        for (field, value) in obj {
            let project_field = match value {
                Value::Bool(true) => ProjectField::Include,
                Value::Bool(false) => ProjectField::Exclude,
                Value::Number(n) => match n.as_i64() {
                    Some(1) => ProjectField::Include,
                    Some(0) => ProjectField::Exclude,
                    _ => return Err(agg_error(format!("Invalid project value: {}", n))),
                },
                Value::String(s) if s.starts_with('$') && s.len() > 1 => {
                    ProjectField::Rename(s[1..].to_string())
                }
                Value::String(s) => {
                    return Err(agg_error(format!("Invalid project expression: {}", s)))
                }
                _ => {
                    return Err(agg_error(
                        "Project field must be 0, 1, or field reference",
                    ))
                }
            };
            fields.push((field.clone(), project_field));
        }

        // _id may be excluded alongside inclusions; nothing else may
        let has_inclusions = fields
            .iter()
            .any(|(_, f)| matches!(f, ProjectField::Include | ProjectField::Rename(_)));
        let has_non_id_exclusions = fields
            .iter()
            .any(|(name, f)| *f == ProjectField::Exclude && name != "_id");
        if has_inclusions && has_non_id_exclusions {
            return Err(agg_error(
                "$project cannot mix inclusion and exclusion",
            ));
        }

        Ok(ProjectStage {
            fields,
            include_mode: has_inclusions,
        })
    }

    fn execute(&self, docs: Vec<Document>) -> Vec<Document> {
        docs.into_iter().map(|doc| self.project_document(doc)).collect()
    }

    fn project_document(&self, doc: Document) -> Document {
        if !self.include_mode {
            let mut doc = doc;
            for (field, _) in &self.fields {
                doc.remove_nested(field);
            }
            return doc;
        }

        let mut result = Map::new();
        let id_excluded = self
            .fields
            .iter()
            .any(|(name, f)| name == "_id" && *f == ProjectField::Exclude);
        if !id_excluded {
            if let Some(id) = doc.fields().get("_id") {
                result.insert("_id".to_string(), id.clone());
            }
        }

        for (field, action) in &self.fields {
            let source = match action {
                ProjectField::Include => field.as_str(),
                ProjectField::Rename(source) => source.as_str(),
                ProjectField::Exclude => continue,
            };
            if let Some(value) = lookup(&doc, source) {
                set_path(&mut result, field, value.clone());
            }
        }
        Document::from_map(result)
    }
}

// ============================================================================
// $group
// ============================================================================

#[derive(Debug, Clone)]
pub struct GroupStage {
    id: GroupId,
    accumulators: Vec<(String, Accumulator)>,
}

#[derive(Debug, Clone)]
pub enum GroupId {
    /// null: all documents in one group
    Null,
    /// "$city"
    Field(String),
    /// {"city": "$city", "year": "$year"}
    Compound(Vec<(String, String)>),
}

#[derive(Debug, Clone)]
pub enum Accumulator {
    Sum(SumExpression),
    Avg(String),
    Min(String),
    Max(String),
    First(String),
    Last(String),
    Push(String),
    Count,
}

#[derive(Debug, Clone)]
pub enum SumExpression {
    Constant(serde_json::Number), // {"$sum": 1} - count
    Field(String),                // {"$sum": "$amount"} - sum field values
}

impl GroupStage {
    fn from_json(spec: &Value) -> Result<Self> {
        let obj = spec
            .as_object()
            .ok_or_else(|| agg_error("$group must be an object"))?;

        let id = match obj.get("_id") {
            None => return Err(agg_error("Group stage must have _id field")),
            Some(Value::Null) => GroupId::Null,
            Some(value @ Value::String(_)) => {
                GroupId::Field(parse_field_reference(value, "Group _id")?)
            }
            Some(Value::Object(parts)) if !parts.is_empty() => {
                let parts = parts
                    .iter()
                    .map(|(name, value)| {
                        Ok((name.clone(), parse_field_reference(value, "Group _id")?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                GroupId::Compound(parts)
            }
            Some(_) => {
                return Err(agg_error(
                    "Group _id must be null, a field reference or an object of field references",
                ))
            }
        };

        let mut accumulators = Vec::new();
        for (field, value) in obj {
            if field == "_id" {
                continue;
            }
            accumulators.push((field.clone(), Accumulator::from_json(value)?));
        }

        Ok(GroupStage { id, accumulators })
    }

    fn execute(&self, docs: Vec<Document>) -> Vec<Document> {
        // groups keep first-seen order
        let mut index: AHashMap<String, usize> = AHashMap::new();
        let mut groups: Vec<(Value, Vec<Document>)> = Vec::new();

        for doc in docs {
            let id = self.id.evaluate(&doc);
            let key = canonical_json_string(&id);
            match index.get(&key) {
                Some(&slot) => groups[slot].1.push(doc),
                None => {
                    index.insert(key, groups.len());
                    groups.push((id, vec![doc]));
                }
            }
        }

        groups
            .into_iter()
            .map(|(id, members)| {
                let mut result = Map::new();
                result.insert("_id".to_string(), id);
                for (field, accumulator) in &self.accumulators {
                    result.insert(field.clone(), accumulator.compute(&members));
                }
                Document::from_map(result)
            })
            .collect()
    }
}

impl GroupId {
    fn evaluate(&self, doc: &Document) -> Value {
        match self {
            GroupId::Null => Value::Null,
            GroupId::Field(field) => lookup(doc, field).cloned().unwrap_or(Value::Null),
            GroupId::Compound(parts) => {
                let mut key = Map::new();
                for (name, field) in parts {
                    if let Some(value) = lookup(doc, field) {
                        key.insert(name.clone(), value.clone());
                    }
                }
                Value::Object(key)
            }
        }
    }
}

impl Accumulator {
    fn from_json(spec: &Value) -> Result<Self> {
        let obj = spec
            .as_object()
            .ok_or_else(|| agg_error("Accumulator must be an object"))?;
        let (op, value) = single_entry(obj, "Accumulator")?;

        match op.as_str() {
            "$sum" => match value {
                Value::Number(n) => Ok(Accumulator::Sum(SumExpression::Constant(n.clone()))),
                Value::String(_) => Ok(Accumulator::Sum(SumExpression::Field(
                    parse_field_reference(value, "$sum")?,
                ))),
                _ => Err(agg_error("$sum must be a number or field reference")),
            },
            "$avg" => Ok(Accumulator::Avg(parse_field_reference(value, "$avg")?)),
            "$min" => Ok(Accumulator::Min(parse_field_reference(value, "$min")?)),
            "$max" => Ok(Accumulator::Max(parse_field_reference(value, "$max")?)),
            "$first" => Ok(Accumulator::First(parse_field_reference(value, "$first")?)),
            "$last" => Ok(Accumulator::Last(parse_field_reference(value, "$last")?)),
            "$push" => Ok(Accumulator::Push(parse_field_reference(value, "$push")?)),
            "$count" => match value {
                Value::Object(o) if o.is_empty() => Ok(Accumulator::Count),
                _ => Err(agg_error("$count accumulator takes an empty object")),
            },
            _ => Err(agg_error(format!("Unknown accumulator: {}", op))),
        }
    }

    fn compute(&self, docs: &[Document]) -> Value {
        match self {
            Accumulator::Count => Value::from(docs.len() as i64),

            Accumulator::Sum(SumExpression::Constant(n)) => match n.as_i64() {
                Some(i) => Value::from(i.saturating_mul(docs.len() as i64)),
                None => Value::from(n.as_f64().unwrap_or(0.0) * docs.len() as f64),
            },

            Accumulator::Sum(SumExpression::Field(field)) => {
                let mut sum_int: i64 = 0;
                let mut sum_float: f64 = 0.0;
                let mut has_float = false;

                for value in docs.iter().filter_map(|doc| lookup(doc, field)) {
                    if let Some(n) = value.as_i64() {
                        sum_int = sum_int.saturating_add(n);
                    } else if let Some(f) = value.as_f64() {
                        sum_float += f;
                        has_float = true;
                    }
                }

                if has_float {
                    Value::from(sum_float + sum_int as f64)
                } else {
                    Value::from(sum_int)
                }
            }

            Accumulator::Avg(field) => {
                let numbers: Vec<f64> = docs
                    .iter()
                    .filter_map(|doc| lookup(doc, field).and_then(Value::as_f64))
                    .collect();
                if numbers.is_empty() {
                    Value::Null
                } else {
                    Value::from(numbers.iter().sum::<f64>() / numbers.len() as f64)
                }
            }

            Accumulator::Min(field) => present_values(docs, field)
                .min_by(|a, b| compare_values_with_none(Some(*a), Some(*b)))
                .cloned()
                .unwrap_or(Value::Null),

            Accumulator::Max(field) => present_values(docs, field)
                .max_by(|a, b| compare_values_with_none(Some(*a), Some(*b)))
                .cloned()
                .unwrap_or(Value::Null),

            Accumulator::First(field) => docs
                .first()
                .and_then(|doc| lookup(doc, field).cloned())
                .unwrap_or(Value::Null),

            Accumulator::Last(field) => docs
                .last()
                .and_then(|doc| lookup(doc, field).cloned())
                .unwrap_or(Value::Null),

            Accumulator::Push(field) => Value::Array(
                docs.iter()
                    .filter_map(|doc| lookup(doc, field).cloned())
                    .collect(),
            ),
        }
    }
}

/// Non-null values of `field` across the group ($min/$max ignore null and missing)
fn present_values<'a>(docs: &'a [Document], field: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
    docs.iter()
        .filter_map(move |doc| lookup(doc, field))
        .filter(|v| !v.is_null())
}

// ============================================================================
// $sort / $limit / $skip / $count
// ============================================================================

#[derive(Debug, Clone)]
pub struct SortStage {
    fields: Vec<(String, SortDirection)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortStage {
    fn from_json(spec: &Value) -> Result<Self> {
        let obj = spec
            .as_object()
            .ok_or_else(|| agg_error("$sort must be an object"))?;
        if obj.is_empty() {
            return Err(agg_error("$sort requires at least one field"));
        }

        let mut fields = Vec::with_capacity(obj.len());
        for (field, value) in obj {
            let direction = match value.as_i64() {
                Some(1) => SortDirection::Ascending,
                Some(-1) => SortDirection::Descending,
                _ => return Err(agg_error("Sort direction must be 1 or -1")),
            };
            fields.push((field.clone(), direction));
        }
        Ok(SortStage { fields })
    }

    /// Stable multi-key sort; missing values sort first
    fn execute(&self, mut docs: Vec<Document>) -> Vec<Document> {
        docs.sort_by(|a, b| {
            for (field, direction) in &self.fields {
                let cmp = compare_values_with_none(lookup(a, field), lookup(b, field));
                let cmp = match direction {
                    SortDirection::Ascending => cmp,
                    SortDirection::Descending => cmp.reverse(),
                };
                if cmp.is_ne() {
                    return cmp;
                }
            }
            std::cmp::Ordering::Equal
        });
        docs
    }
}

#[derive(Debug, Clone)]
pub struct LimitStage {
    limit: usize,
}

impl LimitStage {
    fn from_json(spec: &Value) -> Result<Self> {
        match spec.as_u64() {
            Some(n) if n > 0 => Ok(LimitStage { limit: n as usize }),
            _ => Err(agg_error("$limit must be a positive integer")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SkipStage {
    skip: usize,
}

impl SkipStage {
    fn from_json(spec: &Value) -> Result<Self> {
        spec.as_u64()
            .map(|n| SkipStage { skip: n as usize })
            .ok_or_else(|| agg_error("$skip must be a non-negative integer"))
    }
}

/// `{"$count": "total"}` -> one `{"total": n}` record (none for empty input)
#[derive(Debug, Clone)]
pub struct CountStage {
    field: String,
}

impl CountStage {
    fn from_json(spec: &Value) -> Result<Self> {
        match spec.as_str() {
            Some(name) if !name.is_empty() && !name.starts_with('$') && !name.contains('.') => {
                Ok(CountStage { field: name.to_string() })
            }
            _ => Err(agg_error(
                "$count requires a non-empty field name without '$' or '.'",
            )),
        }
    }

    fn execute(&self, docs: Vec<Document>) -> Vec<Document> {
        if docs.is_empty() {
            return Vec::new();
        }
        let mut result = Document::new();
        result.set(self.field.clone(), Value::from(docs.len() as u64));
        vec![result]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn docs(values: Vec<Value>) -> Vec<Document> {
        values.into_iter().map(|v| Document::from_value(v).unwrap()).collect()
    }

    fn run(pipeline: Value, input: Vec<Value>) -> Vec<Value> {
        Pipeline::from_json(&pipeline)
            .unwrap()
            .execute(docs(input))
            .into_iter()
            .map(Value::from)
            .collect()
    }

    fn parse_err(pipeline: Value) -> String {
        let err = Pipeline::from_json(&pipeline).unwrap_err();
        assert!(matches!(err, LineBaseError::AggregationError(_)), "{:?}", err);
        err.to_string()
    }

    // ========== Pipeline parsing ==========

    #[test]
    fn test_pipeline_not_array() {
        assert!(parse_err(json!({"$match": {}})).contains("must be an array"));
    }

    #[test]
    fn test_pipeline_empty() {
        assert!(parse_err(json!([])).contains("cannot be empty"));
    }

    #[test]
    fn test_stage_shape_errors() {
        assert!(parse_err(json!(["invalid"])).contains("must be an object"));
        assert!(parse_err(json!([{"$match": {}, "$sort": {"a": 1}}])).contains("exactly one operator"));
        assert!(parse_err(json!([{"$unknown": {}}])).contains("Unknown pipeline stage"));
    }

    #[test]
    fn test_invalid_later_stage_fails_whole_pipeline() {
        let msg = parse_err(json!([{"$match": {}}, {"$limit": -1}]));
        assert!(msg.contains("$limit"));
    }

    #[test]
    fn test_match_with_bad_filter() {
        assert!(parse_err(json!([{"$match": {"age": {"$bogus": 1}}}])).contains("$match"));
    }

    // ========== $project ==========

    #[test]
    fn test_project_include_exclude_rename() {
        let input = vec![json!({"_id": 7, "name": "Alice", "age": 25, "secret": "hidden"})];

        let include = run(json!([{"$project": {"name": 1}}]), input.clone());
        assert_eq!(include, vec![json!({"_id": 7, "name": "Alice"})]);

        let no_id = run(json!([{"$project": {"name": true, "_id": 0}}]), input.clone());
        assert_eq!(no_id, vec![json!({"name": "Alice"})]);

        let exclude = run(json!([{"$project": {"secret": 0}}]), input.clone());
        assert_eq!(exclude, vec![json!({"_id": 7, "name": "Alice", "age": 25})]);

        let renamed = run(json!([{"$project": {"userName": "$name", "_id": 0}}]), input);
        assert_eq!(renamed, vec![json!({"userName": "Alice"})]);
    }

    #[test]
    fn test_project_nested_rename() {
        let out = run(
            json!([{"$project": {"city": "$address.city"}}]),
            vec![json!({"address": {"city": "NYC", "zip": "10001"}})],
        );
        assert_eq!(out, vec![json!({"city": "NYC"})]);
    }

    #[test]
    fn test_project_errors() {
        assert!(parse_err(json!([{"$project": {"field": 5}}])).contains("Invalid project value"));
        assert!(parse_err(json!([{"$project": {"field": "not_a_ref"}}])).contains("Invalid project expression"));
        assert!(parse_err(json!([{"$project": {"field": [1, 2]}}])).contains("must be 0, 1, or field reference"));
        assert!(parse_err(json!([{"$project": "invalid"}])).contains("must be an object"));
        assert!(parse_err(json!([{"$project": {"a": 1, "b": 0}}])).contains("cannot mix"));
    }

    // ========== $group ==========

    #[test]
    fn test_group_null_id() {
        let out = run(
            json!([{"$group": {"_id": null, "total": {"$sum": "$value"}}}]),
            vec![json!({"value": 10}), json!({"value": 20}), json!({"value": 30})],
        );
        assert_eq!(out, vec![json!({"_id": null, "total": 60})]);
    }

    #[test]
    fn test_group_first_seen_order_and_missing_field() {
        let out = run(
            json!([{"$group": {"_id": "$city", "count": {"$sum": 1}}}]),
            vec![
                json!({"city": "LA"}),
                json!({"city": "NYC"}),
                json!({}),
                json!({"city": "LA"}),
            ],
        );
        assert_eq!(
            out,
            vec![
                json!({"_id": "LA", "count": 2}),
                json!({"_id": "NYC", "count": 1}),
                json!({"_id": null, "count": 1}),
            ]
        );
    }

    #[test]
    fn test_group_compound_id() {
        let out = run(
            json!([{"$group": {"_id": {"city": "$city", "year": "$year"}, "n": {"$count": {}}}}]),
            vec![
                json!({"city": "LA", "year": 2023}),
                json!({"year": 2023, "city": "LA"}),
                json!({"city": "LA", "year": 2024}),
            ],
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], json!({"_id": {"city": "LA", "year": 2023}, "n": 2}));
    }

    #[test]
    fn test_group_numeric_ids_normalised() {
        let out = run(
            json!([{"$group": {"_id": "$n", "c": {"$sum": 1}}}]),
            vec![json!({"n": 1}), json!({"n": 1.0})],
        );
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_group_id_errors() {
        assert!(parse_err(json!([{"$group": {"count": {"$sum": 1}}}])).contains("must have _id field"));
        assert!(parse_err(json!([{"$group": {"_id": "notARef"}}])).contains("must start with $"));
        assert!(parse_err(json!([{"$group": {"_id": 123}}])).contains("_id must be null"));
        assert!(parse_err(json!([{"$group": "invalid"}])).contains("must be an object"));
    }

    // ========== Accumulators ==========

    #[test]
    fn test_accumulators() {
        let out = run(
            json!([{"$group": {
                "_id": null,
                "avg": {"$avg": "$score"},
                "min": {"$min": "$score"},
                "max": {"$max": "$score"},
                "first": {"$first": "$name"},
                "last": {"$last": "$name"},
                "names": {"$push": "$name"},
                "n": {"$count": {}},
                "weighted": {"$sum": 2}
            }}]),
            vec![
                json!({"name": "a", "score": 10}),
                json!({"name": "b", "score": 30}),
                json!({"name": "c", "score": 20, "extra": true}),
                json!({"name": "d", "score": null}),
            ],
        );
        let group = &out[0];
        assert_eq!(group["avg"], json!(20.0));
        assert_eq!(group["min"], json!(10));
        assert_eq!(group["max"], json!(30));
        assert_eq!(group["first"], json!("a"));
        assert_eq!(group["last"], json!("d"));
        assert_eq!(group["names"], json!(["a", "b", "c", "d"]));
        assert_eq!(group["n"], json!(4));
        assert_eq!(group["weighted"], json!(8));
    }

    #[test]
    fn test_accumulator_output_order_follows_declaration() {
        let out = run(
            json!([{"$group": {"_id": null, "z": {"$sum": 1}, "a": {"$sum": 1}}}]),
            vec![json!({})],
        );
        let keys: Vec<&String> = out[0].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["_id", "z", "a"]);
    }

    #[test]
    fn test_accumulator_sum_float_and_empty() {
        let out = run(
            json!([{"$group": {"_id": null, "s": {"$sum": "$v"}, "avg": {"$avg": "$missing"}, "min": {"$min": "$missing"}}}]),
            vec![json!({"v": 1}), json!({"v": 2.5})],
        );
        assert_eq!(out[0]["s"], json!(3.5));
        assert_eq!(out[0]["avg"], Value::Null);
        assert_eq!(out[0]["min"], Value::Null);
    }

    #[test]
    fn test_accumulator_errors() {
        let group = |acc: Value| json!([{"$group": {"_id": null, "x": acc}}]);
        assert!(parse_err(group(json!({"$sum": "amount"}))).contains("must start with $"));
        assert!(parse_err(group(json!({"$sum": [1]}))).contains("number or field reference"));
        assert!(parse_err(group(json!({"$avg": 5}))).contains("must be a field reference"));
        assert!(parse_err(group(json!({"$median": "$x"}))).contains("Unknown accumulator"));
        assert!(parse_err(group(json!(1))).contains("must be an object"));
        assert!(parse_err(group(json!({"$sum": 1, "$avg": "$x"}))).contains("exactly one operator"));
        assert!(parse_err(group(json!({"$count": 1}))).contains("empty object"));
    }

    // ========== $sort / $limit / $skip / $count ==========

    #[test]
    fn test_sort_multi_field_and_missing() {
        let out = run(
            json!([{"$sort": {"age": 1, "name": -1}}]),
            vec![
                json!({"age": 30, "name": "Bob"}),
                json!({"name": "Nobody"}),
                json!({"age": 25, "name": "Alice"}),
                json!({"age": 30, "name": "Carol"}),
            ],
        );
        let names: Vec<&str> = out.iter().map(|d| d["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Nobody", "Alice", "Carol", "Bob"]);
    }

    #[test]
    fn test_sort_errors() {
        assert!(parse_err(json!([{"$sort": {"a": 2}}])).contains("1 or -1"));
        assert!(parse_err(json!([{"$sort": {}}])).contains("at least one field"));
    }

    #[test]
    fn test_limit_skip() {
        let input: Vec<Value> = (1..=5).map(|n| json!({"n": n})).collect();
        let out = run(json!([{"$skip": 1}, {"$limit": 2}]), input);
        assert_eq!(out, vec![json!({"n": 2}), json!({"n": 3})]);

        assert!(parse_err(json!([{"$limit": 0}])).contains("positive"));
        assert!(parse_err(json!([{"$skip": "2"}])).contains("non-negative"));
    }

    #[test]
    fn test_count_stage() {
        let out = run(
            json!([{"$match": {"n": {"$gt": 1}}}, {"$count": "total"}]),
            vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})],
        );
        assert_eq!(out, vec![json!({"total": 2})]);

        let none = run(json!([{"$match": {"n": 99}}, {"$count": "total"}]), vec![json!({"n": 1})]);
        assert!(none.is_empty());

        assert!(parse_err(json!([{"$count": "$total"}])).contains("$count"));
    }

    // ========== Full pipelines ==========

    #[test]
    fn test_full_pipeline() {
        let out = run(
            json!([
                {"$match": {"age": {"$gte": 25}}},
                {"$group": {"_id": "$city", "count": {"$sum": 1}, "avgAge": {"$avg": "$age"}}},
                {"$sort": {"count": -1}}
            ]),
            vec![
                json!({"name": "Alice", "age": 25, "city": "NYC"}),
                json!({"name": "Bob", "age": 30, "city": "LA"}),
                json!({"name": "Charlie", "age": 35, "city": "NYC"}),
                json!({"name": "David", "age": 20, "city": "LA"}),
            ],
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], json!({"_id": "NYC", "count": 2, "avgAge": 30.0}));
        assert_eq!(out[1], json!({"_id": "LA", "count": 1, "avgAge": 30.0}));
    }

    #[test]
    fn test_pipeline_with_nested_fields() {
        let out = run(
            json!([
                {"$match": {"address.country": "HU"}},
                {"$group": {"_id": "$address.city", "total": {"$sum": "$order.total"}}},
                {"$sort": {"_id": 1}}
            ]),
            vec![
                json!({"address": {"city": "Pécs", "country": "HU"}, "order": {"total": 5}}),
                json!({"address": {"city": "Budapest", "country": "HU"}, "order": {"total": 10}}),
                json!({"address": {"city": "Vienna", "country": "AT"}, "order": {"total": 99}}),
                json!({"address": {"city": "Budapest", "country": "HU"}, "order": {"total": 15}}),
            ],
        );
        assert_eq!(
            out,
            vec![
                json!({"_id": "Budapest", "total": 25}),
                json!({"_id": "Pécs", "total": 5}),
            ]
        );
    }
}
