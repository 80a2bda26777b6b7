//! Histogram types returned by the aggregation backend.

use std::cmp::Ordering;
use std::fmt;

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::error;

use crate::filter::types::number_value;

/// Aggregated histograms keyed by dotted field path.
pub type AggsData = IndexMap<String, FieldHistogram>;

/// Key of one histogram bucket.
#[derive(Debug, Clone, PartialEq)]
pub enum BucketKey {
    /// Distinct value of an enumerated field.
    Term(String),
    /// `[lower, upper]` of a numeric field.
    Range([f64; 2]),
}

impl BucketKey {
    pub fn as_term(&self) -> Option<&str> {
        match self {
            BucketKey::Term(term) => Some(term),
            BucketKey::Range(_) => None,
        }
    }

    pub fn as_range(&self) -> Option<[f64; 2]> {
        match self {
            BucketKey::Range(range) => Some(*range),
            BucketKey::Term(_) => None,
        }
    }

    /// Whether this is a term key equal to `value`.
    pub fn is_term(&self, value: &str) -> bool {
        self.as_term() == Some(value)
    }

    /// Ordering used for option lists: terms lexicographically, ranges by
    /// lower then upper bound. Terms sort before ranges.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (BucketKey::Term(a), BucketKey::Term(b)) => a.cmp(b),
            (BucketKey::Range(a), BucketKey::Range(b)) => {
                a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1]))
            }
            (BucketKey::Term(_), BucketKey::Range(_)) => Ordering::Less,
            (BucketKey::Range(_), BucketKey::Term(_)) => Ordering::Greater,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            BucketKey::Term(term) => Value::from(term.as_str()),
            BucketKey::Range([lower, upper]) => {
                Value::Array(vec![number_value(*lower), number_value(*upper)])
            }
        }
    }

    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::String(term) => Ok(BucketKey::Term(term.clone())),
            Value::Array(bounds) if bounds.len() == 2 => {
                let bound = |v: &Value| match v {
                    Value::Null => Ok(0.0),
                    other => other
                        .as_f64()
                        .ok_or_else(|| format!("range bound must be a number: {other}")),
                };
                Ok(BucketKey::Range([bound(&bounds[0])?, bound(&bounds[1])?]))
            }
            other => Err(format!("unsupported bucket key: {other}")),
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketKey::Term(term) => f.write_str(term),
            BucketKey::Range([lower, upper]) => write!(f, "{lower},{upper}"),
        }
    }
}

impl From<&str> for BucketKey {
    fn from(term: &str) -> Self {
        BucketKey::Term(term.to_string())
    }
}

impl From<[f64; 2]> for BucketKey {
    fn from(range: [f64; 2]) -> Self {
        BucketKey::Range(range)
    }
}

impl Serialize for BucketKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BucketKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        BucketKey::from_value(&value).map_err(D::Error::custom)
    }
}

/// One histogram bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggsCount {
    pub key: BucketKey,
    pub count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessible: Option<bool>,
}

impl AggsCount {
    pub fn new(key: impl Into<BucketKey>, count: u64) -> Self {
        Self {
            key: key.into(),
            count,
            accessible: None,
        }
    }

    pub fn with_accessible(mut self, accessible: bool) -> Self {
        self.accessible = Some(accessible);
        self
    }
}

/// Histogram for one field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldHistogram {
    #[serde(default)]
    pub histogram: Vec<AggsCount>,
}

impl FieldHistogram {
    pub fn new(histogram: Vec<AggsCount>) -> Self {
        Self { histogram }
    }

    pub fn is_empty(&self) -> bool {
        self.histogram.is_empty()
    }

    /// Bounds of a range histogram: exactly one bucket with a range key.
    pub fn range_bounds(&self) -> Option<[f64; 2]> {
        match self.histogram.as_slice() {
            [only] => only.key.as_range(),
            _ => None,
        }
    }

    pub fn find_term(&self, value: &str) -> Option<&AggsCount> {
        self.histogram.iter().find(|bucket| bucket.key.is_term(value))
    }
}

/// Flatten an aggregation response tree into [`AggsData`].
///
/// Objects carrying a `histogram` key are leaves; any other object is a
/// nested path whose children are joined with dots. Non-object members
/// (e.g. `_totalCount`) are skipped. A malformed histogram is logged and
/// kept as an empty one so the field still renders.
///
/// A member whose name contains a dot can flatten to the same path as a
/// nested field. The first field decoded for a path is kept and every later
/// one is dropped with an error.
pub fn decode_aggs_data(tree: &Value) -> AggsData {
    let mut aggs = AggsData::new();
    walk(None, tree, &mut aggs);
    aggs
}

fn walk(prefix: Option<&str>, node: &Value, aggs: &mut AggsData) {
    let Some(members) = node.as_object() else {
        return;
    };

    for (name, child) in members {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{name}"),
            None => name.clone(),
        };
        let Some(child_members) = child.as_object() else {
            continue;
        };

        match child_members.get("histogram") {
            Some(_) if aggs.contains_key(&path) => {
                error!(field = %path, "aggregation fields collide on the same dotted path, keeping the first");
            }
            Some(histogram) => {
                let histogram = serde_json::from_value::<Vec<AggsCount>>(histogram.clone())
                    .unwrap_or_else(|e| {
                        error!(field = %path, error = %e, "malformed histogram in aggregation response");
                        Vec::new()
                    });
                aggs.insert(path, FieldHistogram::new(histogram));
            }
            None => walk(Some(&path), child, aggs),
        }
    }
}
