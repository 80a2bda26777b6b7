//! Anchor query planning.
//!
//! Some filter tabs show option counts conditioned on a single anchor value
//! (e.g. only records where `visit_type == "baseline"`) while the remaining
//! tabs show counts for the global filter. Each group is aggregated under its
//! own filter and the results are merged field-wise.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::gql::GqlFilter;
use super::{base_path, split_nested};
use crate::filter::CombineMode;

/// Group holding every field queried against the unmodified filter.
pub const MAIN_GROUP: &str = "main";

/// One tab of filter widgets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterTab {
    pub title: String,

    /// Fields rendered as option lists or sliders.
    #[serde(default)]
    pub fields: Vec<String>,

    /// Fields rendered as a search box.
    #[serde(default)]
    pub search_fields: Vec<String>,
}

impl FilterTab {
    pub fn new<I, S>(title: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            title: title.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            search_fields: Vec::new(),
        }
    }

    pub fn with_search_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Search fields followed by list fields.
    pub fn all_fields(&self) -> impl Iterator<Item = &String> {
        self.search_fields.iter().chain(self.fields.iter())
    }
}

/// Every field across the given tabs, in tab order, without duplicates.
pub fn all_fields(tabs: &[FilterTab]) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    for field in tabs.iter().flat_map(FilterTab::all_fields) {
        if !fields.contains(field) {
            fields.push(field.clone());
        }
    }
    fields
}

/// Anchor declaration from the filter configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorConfig {
    /// Field whose value conditions the anchored tabs.
    pub field: String,

    /// Titles of the tabs that are conditioned on the anchor.
    #[serde(default)]
    pub tabs: Vec<String>,

    /// Values the user may pick as anchor.
    #[serde(default)]
    pub options: Vec<String>,
}

/// Inputs to [`plan`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanInput<'a> {
    pub filter_tabs: &'a [FilterTab],
    pub anchor_config: Option<&'a AnchorConfig>,
    pub anchor_value: Option<&'a str>,
    pub gql_filter: Option<&'a GqlFilter>,
}

/// Fields and filter per aggregation group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPlan {
    /// Group name → fields aggregated in that group.
    pub fields_by_group: IndexMap<String, Vec<String>>,

    /// `filter_<group>` → filter for that group. `filter_main` is always present.
    pub gql_filter_by_group: IndexMap<String, Option<GqlFilter>>,
}

impl QueryPlan {
    /// Variable name carrying a group's filter.
    pub fn filter_key(group: &str) -> String {
        format!("filter_{group}")
    }

    /// Filter for a group.
    pub fn filter_for(&self, group: &str) -> Option<&GqlFilter> {
        self.gql_filter_by_group
            .get(&Self::filter_key(group))
            .and_then(Option::as_ref)
    }

    /// Groups in plan order with their fields and filter.
    pub fn groups(&self) -> impl Iterator<Item = (&str, &[String], Option<&GqlFilter>)> {
        self.fields_by_group
            .iter()
            .map(|(group, fields)| (group.as_str(), fields.as_slice(), self.filter_for(group)))
    }
}

/// Partition tab fields into aggregation groups.
///
/// Without an anchor (no config, or no/empty anchor value) everything goes to
/// [`MAIN_GROUP`] with the filter passed through. With an anchor, fields of
/// anchored tabs are grouped by base path and each group's filter gains the
/// clause `IN{anchor.field: [value]}`, scoped to the group's nested path when
/// the group is nested.
pub fn plan(input: PlanInput<'_>) -> QueryPlan {
    let mut query_plan = QueryPlan::default();
    query_plan
        .gql_filter_by_group
        .insert(QueryPlan::filter_key(MAIN_GROUP), input.gql_filter.cloned());

    let anchor = match (input.anchor_config, input.anchor_value) {
        (Some(config), Some(value)) if !value.is_empty() => Some((config, value)),
        _ => None,
    };

    for tab in input.filter_tabs {
        let anchored = anchor.filter(|(config, _)| config.tabs.contains(&tab.title));
        let Some((config, value)) = anchored else {
            query_plan
                .fields_by_group
                .entry(MAIN_GROUP.to_string())
                .or_default()
                .extend(tab.all_fields().cloned());
            continue;
        };

        for field in tab.all_fields() {
            let group = base_path(field);
            if !query_plan.fields_by_group.contains_key(group) {
                let filter = anchored_group_filter(
                    input.gql_filter,
                    group,
                    split_nested(field).is_some(),
                    &config.field,
                    value,
                );
                query_plan
                    .gql_filter_by_group
                    .insert(QueryPlan::filter_key(group), Some(filter));
            }
            query_plan
                .fields_by_group
                .entry(group.to_string())
                .or_default()
                .push(field.clone());
        }
    }

    query_plan
}

/// Global filter plus the anchor clause for one group.
fn anchored_group_filter(
    gql_filter: Option<&GqlFilter>,
    group: &str,
    is_nested: bool,
    anchor_field: &str,
    anchor_value: &str,
) -> GqlFilter {
    let anchor_clause = GqlFilter::in_values(anchor_field, [anchor_value]);

    // Anchors are AND-ed in; an OR-combined filter is kept as a single clause.
    let mut clauses = match gql_filter {
        Some(GqlFilter::And(clauses)) => clauses.clone(),
        Some(other) => vec![other.clone()],
        None => Vec::new(),
    };

    if !is_nested {
        clauses.push(anchor_clause);
        return GqlFilter::And(clauses);
    }

    let existing = clauses.iter_mut().find_map(|clause| match clause {
        GqlFilter::Nested(nested) if nested.path == group => Some(nested),
        _ => None,
    });

    match existing {
        Some(nested) if nested.combine_mode == CombineMode::And => {
            nested.clauses.push(anchor_clause);
        }
        Some(nested) => {
            let either = GqlFilter::Or(std::mem::take(&mut nested.clauses));
            nested.combine_mode = CombineMode::And;
            nested.clauses = vec![either, anchor_clause];
        }
        None => clauses.push(GqlFilter::nested(group, CombineMode::And, vec![anchor_clause])),
    }

    GqlFilter::And(clauses)
}
