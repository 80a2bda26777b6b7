//! Compiled filter tree.
//!
//! Wire grammar (one key per node):
//! `{"AND":[..]}`, `{"OR":[..]}`, `{"IN":{field:[..]}}`, `{"GTE":{field:n}}`,
//! `{"LTE":{field:n}}`, `{"nested":{"path":p,"AND"|"OR":[..]}}`,
//! `{"search":{"keyword":k,"fields":[..]}}`.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};

use crate::filter::CombineMode;
use crate::filter::types::number_value;

/// Node of a compiled backend filter.
#[derive(Debug, Clone, PartialEq)]
pub enum GqlFilter {
    In { field: String, values: Vec<String> },
    Gte { field: String, value: f64 },
    Lte { field: String, value: f64 },
    And(Vec<GqlFilter>),
    Or(Vec<GqlFilter>),
    Nested(NestedFilter),
    /// Keyword search; only used by autosuggest queries.
    Search { keyword: String, fields: Vec<String> },
}

/// Clauses scoped to a nested sub-object.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedFilter {
    pub path: String,
    pub combine_mode: CombineMode,
    pub clauses: Vec<GqlFilter>,
}

impl GqlFilter {
    /// `AND[..]` or `OR[..]` depending on `mode`.
    pub fn combine(mode: CombineMode, clauses: Vec<GqlFilter>) -> Self {
        match mode {
            CombineMode::And => GqlFilter::And(clauses),
            CombineMode::Or => GqlFilter::Or(clauses),
        }
    }

    pub fn in_values<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        GqlFilter::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn nested(path: impl Into<String>, mode: CombineMode, clauses: Vec<GqlFilter>) -> Self {
        GqlFilter::Nested(NestedFilter {
            path: path.into(),
            combine_mode: mode,
            clauses,
        })
    }

    pub fn search(keyword: impl Into<String>, fields: Vec<String>) -> Self {
        GqlFilter::Search {
            keyword: keyword.into(),
            fields,
        }
    }

    /// Children of an `AND`/`OR` node.
    pub fn clauses(&self) -> Option<&[GqlFilter]> {
        match self {
            GqlFilter::And(clauses) | GqlFilter::Or(clauses) => Some(clauses),
            _ => None,
        }
    }

    /// Combine mode of an `AND`/`OR` node.
    pub fn combine_mode(&self) -> Option<CombineMode> {
        match self {
            GqlFilter::And(_) => Some(CombineMode::And),
            GqlFilter::Or(_) => Some(CombineMode::Or),
            _ => None,
        }
    }

    /// Wire representation.
    pub fn to_value(&self) -> Value {
        match self {
            GqlFilter::In { field, values } => json!({ "IN": { field: values } }),
            GqlFilter::Gte { field, value } => json!({ "GTE": { field: number_value(*value) } }),
            GqlFilter::Lte { field, value } => json!({ "LTE": { field: number_value(*value) } }),
            GqlFilter::And(clauses) | GqlFilter::Or(clauses) => {
                let key = self.combine_mode().unwrap_or_default().as_key();
                let clauses: Vec<Value> = clauses.iter().map(GqlFilter::to_value).collect();
                json!({ key: clauses })
            }
            GqlFilter::Nested(nested) => {
                let clauses: Vec<Value> = nested.clauses.iter().map(GqlFilter::to_value).collect();
                let mut body = Map::new();
                body.insert("path".to_string(), Value::from(nested.path.as_str()));
                body.insert(nested.combine_mode.as_key().to_string(), Value::from(clauses));
                json!({ "nested": body })
            }
            GqlFilter::Search { keyword, fields } => {
                json!({ "search": { "keyword": keyword, "fields": fields } })
            }
        }
    }

    /// Parse the wire representation.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let (key, body) = single_entry(value)?;
        match key.as_str() {
            "AND" | "OR" => {
                let mode = CombineMode::from_key(key).unwrap_or_default();
                Ok(GqlFilter::combine(mode, parse_clause_list(body)?))
            }
            "IN" => {
                let (field, values) = single_entry(body)?;
                let values = values
                    .as_array()
                    .ok_or_else(|| format!("IN values for \"{field}\" must be an array"))?
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => Ok(s.clone()),
                        other => Err(format!("IN value for \"{field}\" must be a string: {other}")),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(GqlFilter::In {
                    field: field.clone(),
                    values,
                })
            }
            "GTE" | "LTE" => {
                let (field, bound) = single_entry(body)?;
                let value = bound
                    .as_f64()
                    .ok_or_else(|| format!("{key} bound for \"{field}\" must be a number"))?;
                let field = field.clone();
                Ok(if key == "GTE" {
                    GqlFilter::Gte { field, value }
                } else {
                    GqlFilter::Lte { field, value }
                })
            }
            "nested" => {
                let obj = body.as_object().ok_or("nested clause must be an object")?;
                let path = obj
                    .get("path")
                    .and_then(Value::as_str)
                    .ok_or("nested clause requires a string path")?;
                let (mode, clauses) = match (obj.get("AND"), obj.get("OR")) {
                    (Some(clauses), None) => (CombineMode::And, clauses),
                    (None, Some(clauses)) => (CombineMode::Or, clauses),
                    _ => return Err(format!("nested clause \"{path}\" needs exactly one of AND/OR")),
                };
                Ok(GqlFilter::nested(path, mode, parse_clause_list(clauses)?))
            }
            "search" => {
                let keyword = body
                    .get("keyword")
                    .and_then(Value::as_str)
                    .ok_or("search clause requires a keyword")?;
                let fields = body
                    .get("fields")
                    .and_then(Value::as_array)
                    .map(|fields| {
                        fields
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(GqlFilter::search(keyword, fields))
            }
            other => Err(format!("unknown filter clause \"{other}\"")),
        }
    }
}

fn single_entry(value: &Value) -> Result<(&String, &Value), String> {
    let obj = value
        .as_object()
        .ok_or_else(|| format!("filter clause must be an object: {value}"))?;
    let mut entries = obj.iter();
    match (entries.next(), entries.next()) {
        (Some(entry), None) => Ok(entry),
        _ => Err(format!("filter clause must have exactly one key: {value}")),
    }
}

fn parse_clause_list(value: &Value) -> Result<Vec<GqlFilter>, String> {
    value
        .as_array()
        .ok_or_else(|| format!("clause list must be an array: {value}"))?
        .iter()
        .map(GqlFilter::from_value)
        .collect()
}

impl Serialize for GqlFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for GqlFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        GqlFilter::from_value(&value).map_err(D::Error::custom)
    }
}
