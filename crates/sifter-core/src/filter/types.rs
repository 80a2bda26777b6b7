//! Filter state types.
//!
//! A [`FilterState`] maps field paths to [`FilterEntry`] selections. On the
//! wire an entry is identified only by which keys it carries
//! (`selectedValues`, `lowerBound`/`upperBound`, `filter`); it is classified
//! into an explicit variant when deserialized so the compiler can match on it
//! exhaustively.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const COMBINE_MODE_KEY: &str = "__combineMode";

/// How multiple values or clauses are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CombineMode {
    #[default]
    And,
    Or,
}

impl CombineMode {
    /// Wire key used for this mode in compiled filters (`AND` / `OR`).
    pub fn as_key(self) -> &'static str {
        match self {
            CombineMode::And => "AND",
            CombineMode::Or => "OR",
        }
    }

    /// Parse a wire key.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "AND" => Some(CombineMode::And),
            "OR" => Some(CombineMode::Or),
            _ => None,
        }
    }
}

/// Everything the user has selected, keyed by field path.
///
/// Field paths use dots for nested sub-objects (`"visit.label"`). Anchored
/// entries are keyed `"<anchorField>:<anchorValue>"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    /// Top-level combine mode (defaults to AND when absent).
    #[serde(
        rename = "__combineMode",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub combine_mode: Option<CombineMode>,

    /// Per-field entries in insertion order.
    #[serde(default)]
    pub value: IndexMap<String, FilterEntry>,
}

impl FilterState {
    /// Create an empty filter state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the top-level combine mode.
    pub fn with_combine_mode(mut self, mode: CombineMode) -> Self {
        self.combine_mode = Some(mode);
        self
    }

    /// Add or replace an entry.
    pub fn with(mut self, field: impl Into<String>, entry: impl Into<FilterEntry>) -> Self {
        self.value.insert(field.into(), entry.into());
        self
    }

    /// Effective top-level combine mode.
    pub fn effective_combine_mode(&self) -> CombineMode {
        self.combine_mode.unwrap_or_default()
    }

    pub fn get(&self, field: &str) -> Option<&FilterEntry> {
        self.value.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.value.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Selected values for `field`, if it carries an option filter.
    pub fn selected_values(&self, field: &str) -> Option<&[String]> {
        self.get(field).and_then(FilterEntry::selected_values)
    }
}

/// Checkbox-style selection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionFilter {
    pub selected_values: Vec<String>,
    /// Combine mode for the selected values (defaults to OR when absent).
    pub combine_mode: Option<CombineMode>,
}

impl OptionFilter {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selected_values: values.into_iter().map(Into::into).collect(),
            combine_mode: None,
        }
    }

    /// Require every selected value to be present (array fields).
    pub fn match_all(mut self) -> Self {
        self.combine_mode = Some(CombineMode::And);
        self
    }

    pub fn with_combine_mode(mut self, mode: CombineMode) -> Self {
        self.combine_mode = Some(mode);
        self
    }

    pub fn effective_combine_mode(&self) -> CombineMode {
        self.combine_mode.unwrap_or(CombineMode::Or)
    }
}

/// Numeric slider selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeFilter {
    pub lower_bound: f64,
    pub upper_bound: f64,
}

impl RangeFilter {
    pub fn new(lower_bound: f64, upper_bound: f64) -> Self {
        Self {
            lower_bound,
            upper_bound,
        }
    }
}

/// Sub-filter applied only to records where the anchor field has the anchor value.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchoredFilter {
    pub filter: FilterState,
}

/// A single field's selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum FilterEntry {
    Options(OptionFilter),
    Range(RangeFilter),
    Anchored(AnchoredFilter),
    /// Carries only a combine mode; contributes no clause.
    CombineModeOnly(CombineMode),
    /// Any shape matching none of the above; rejected by the compiler.
    Unrecognized(Value),
}

impl FilterEntry {
    pub fn selected_values(&self) -> Option<&[String]> {
        match self {
            FilterEntry::Options(options) => Some(&options.selected_values),
            _ => None,
        }
    }

    /// Raw wire form, used in error messages.
    pub fn to_value(&self) -> Value {
        Value::from(self.clone())
    }
}

impl From<OptionFilter> for FilterEntry {
    fn from(filter: OptionFilter) -> Self {
        FilterEntry::Options(filter)
    }
}

impl From<RangeFilter> for FilterEntry {
    fn from(filter: RangeFilter) -> Self {
        FilterEntry::Range(filter)
    }
}

impl From<FilterState> for FilterEntry {
    fn from(filter: FilterState) -> Self {
        FilterEntry::Anchored(AnchoredFilter { filter })
    }
}

impl From<Value> for FilterEntry {
    fn from(value: Value) -> Self {
        classify_entry(&value).unwrap_or(FilterEntry::Unrecognized(value))
    }
}

/// Decide which variant a raw entry object represents.
fn classify_entry(value: &Value) -> Option<FilterEntry> {
    let obj = value.as_object()?;

    let combine_mode = match obj.get(COMBINE_MODE_KEY) {
        Some(mode) => Some(serde_json::from_value::<CombineMode>(mode.clone()).ok()?),
        None => None,
    };

    if let Some(selected) = obj.get("selectedValues") {
        let selected_values = selected
            .as_array()?
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()?;
        return Some(FilterEntry::Options(OptionFilter {
            selected_values,
            combine_mode,
        }));
    }

    if obj.contains_key("lowerBound") || obj.contains_key("upperBound") {
        let lower_bound = obj.get("lowerBound")?.as_f64()?;
        let upper_bound = obj.get("upperBound")?.as_f64()?;
        return Some(FilterEntry::Range(RangeFilter::new(lower_bound, upper_bound)));
    }

    if let Some(filter) = obj.get("filter") {
        let filter = serde_json::from_value::<FilterState>(filter.clone()).ok()?;
        return Some(FilterEntry::Anchored(AnchoredFilter { filter }));
    }

    match combine_mode {
        Some(mode) if obj.len() == 1 => Some(FilterEntry::CombineModeOnly(mode)),
        _ => None,
    }
}

impl From<FilterEntry> for Value {
    fn from(entry: FilterEntry) -> Self {
        let mut obj = Map::new();
        match entry {
            FilterEntry::Options(options) => {
                if let Some(mode) = options.combine_mode {
                    obj.insert(COMBINE_MODE_KEY.to_string(), mode.as_key().into());
                }
                obj.insert(
                    "selectedValues".to_string(),
                    Value::from(options.selected_values),
                );
            }
            FilterEntry::Range(range) => {
                obj.insert("lowerBound".to_string(), number_value(range.lower_bound));
                obj.insert("upperBound".to_string(), number_value(range.upper_bound));
            }
            FilterEntry::Anchored(anchored) => {
                let filter = serde_json::to_value(anchored.filter).unwrap_or(Value::Null);
                obj.insert("filter".to_string(), filter);
            }
            FilterEntry::CombineModeOnly(mode) => {
                obj.insert(COMBINE_MODE_KEY.to_string(), mode.as_key().into());
            }
            FilterEntry::Unrecognized(raw) => return raw,
        }
        Value::Object(obj)
    }
}

/// JSON number for a bound; integral values are emitted without a fraction.
pub(crate) fn number_value(n: f64) -> Value {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}
