//! FilterState → GqlFilter compilation.

use std::collections::HashMap;

use thiserror::Error;

use super::gql::{GqlFilter, NestedFilter};
use super::split_nested;
use crate::filter::{CombineMode, FilterEntry, FilterState, OptionFilter, RangeFilter};

/// A filter state that cannot be turned into a backend query.
///
/// Indicates a caller bug; no request should be sent for such a state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("Invalid filter object for \"{field}\": {value}")]
    InvalidFilter { field: String, value: String },

    #[error("Invalid anchor key \"{0}\": expected \"<field>:<value>\"")]
    InvalidAnchorKey(String),
}

/// Compile a filter state into a backend filter tree.
///
/// The result is `{<mode>: [..]}` with the state's top-level combine mode
/// (AND when unset). Clause order follows the state's insertion order; all
/// dotted fields sharing a base path are gathered into one `nested` clause at
/// the position where that path first appears.
pub fn compile(state: &FilterState) -> Result<GqlFilter, CompileError> {
    let mode = state.effective_combine_mode();
    let clauses = compile_clauses(state, mode)?;
    Ok(GqlFilter::combine(mode, clauses))
}

fn compile_clauses(state: &FilterState, mode: CombineMode) -> Result<Vec<GqlFilter>, CompileError> {
    let mut list = ClauseList::new(mode);

    for (key, entry) in &state.value {
        if let FilterEntry::Anchored(anchored) = entry {
            let (anchor_field, anchor_value) = key
                .split_once(':')
                .ok_or_else(|| CompileError::InvalidAnchorKey(key.clone()))?;

            // Anchored sub-filters are compiled with the outer combine mode.
            for clause in compile_clauses(&anchored.filter, mode)? {
                match clause {
                    GqlFilter::Nested(NestedFilter { path, clauses, .. }) => {
                        let conditioned = GqlFilter::And(vec![
                            GqlFilter::in_values(anchor_field, [anchor_value]),
                            GqlFilter::combine(mode, clauses),
                        ]);
                        list.push_nested(&path, conditioned);
                    }
                    other => list.push(other),
                }
            }
            continue;
        }

        let (path, field) = match split_nested(key) {
            Some((path, field)) => (Some(path), field),
            None => (None, key.as_str()),
        };

        let Some(clause) = leaf_clause(key, field, entry)? else {
            continue;
        };

        match path {
            Some(path) => list.push_nested(path, clause),
            None => list.push(clause),
        }
    }

    Ok(list.into_clauses())
}

/// Clause for a single non-anchored entry. `None` for combine-mode-only entries.
fn leaf_clause(key: &str, field: &str, entry: &FilterEntry) -> Result<Option<GqlFilter>, CompileError> {
    let clause = match entry {
        FilterEntry::Options(options) => option_clause(field, options),
        FilterEntry::Range(range) => range_clause(field, range),
        FilterEntry::CombineModeOnly(_) => return Ok(None),
        FilterEntry::Anchored(_) | FilterEntry::Unrecognized(_) => {
            return Err(CompileError::InvalidFilter {
                field: key.to_string(),
                value: entry.to_value().to_string(),
            });
        }
    };
    Ok(Some(clause))
}

fn option_clause(field: &str, options: &OptionFilter) -> GqlFilter {
    match options.effective_combine_mode() {
        CombineMode::Or => GqlFilter::in_values(field, options.selected_values.iter().cloned()),
        CombineMode::And => GqlFilter::And(
            options
                .selected_values
                .iter()
                .map(|v| GqlFilter::in_values(field, [v.as_str()]))
                .collect(),
        ),
    }
}

fn range_clause(field: &str, range: &RangeFilter) -> GqlFilter {
    GqlFilter::And(vec![
        GqlFilter::Gte {
            field: field.to_string(),
            value: range.lower_bound,
        },
        GqlFilter::Lte {
            field: field.to_string(),
            value: range.upper_bound,
        },
    ])
}

/// Ordered top-level clauses with one slot per nested path.
struct ClauseList {
    mode: CombineMode,
    clauses: Vec<GqlFilter>,
    nested_slots: HashMap<String, usize>,
}

impl ClauseList {
    fn new(mode: CombineMode) -> Self {
        Self {
            mode,
            clauses: Vec::new(),
            nested_slots: HashMap::new(),
        }
    }

    fn push(&mut self, clause: GqlFilter) {
        self.clauses.push(clause);
    }

    fn push_nested(&mut self, path: &str, clause: GqlFilter) {
        if let Some(&slot) = self.nested_slots.get(path)
            && let Some(GqlFilter::Nested(nested)) = self.clauses.get_mut(slot)
        {
            nested.clauses.push(clause);
            return;
        }
        self.nested_slots.insert(path.to_string(), self.clauses.len());
        self.clauses
            .push(GqlFilter::nested(path, self.mode, vec![clause]));
    }

    fn into_clauses(self) -> Vec<GqlFilter> {
        self.clauses
    }
}
