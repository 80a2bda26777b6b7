//! GraphQL request text for the search backend.
//!
//! Aggregations are requested with `filterSelf: false` so that a field's own
//! selection does not collapse its option list, and with
//! `accessibility: all` so inaccessible buckets are still counted.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::gql::GqlFilter;

/// Body posted to the GraphQL endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQlRequest {
    pub query: String,
    #[serde(default)]
    pub variables: Map<String, Value>,
}

impl GraphQlRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: Map::new(),
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Histograms for `fields` under one filter.
    ///
    /// The response carries the data under `_aggregation.<data_type>`.
    pub fn aggregation(data_type: &str, fields: &[String], filter: Option<&GqlFilter>) -> Self {
        let selection = render_selection(fields, Selection::Histogram);
        let query = format!(
            "query ($filter: JSON) {{ _aggregation {{ {data_type} (filter: $filter, filterSelf: false, accessibility: all) {{ {selection} }} }} }}"
        );
        Self::new(query).with_variable("filter", filter_value(filter))
    }

    /// A page of raw records plus the total number of matches.
    pub fn raw_data(
        data_type: &str,
        fields: &[String],
        filter: Option<&GqlFilter>,
        offset: usize,
        first: usize,
    ) -> Self {
        let selection = render_selection(fields, Selection::Scalar);
        let query = format!(
            "query ($filter: JSON) {{ {data_type} (accessibility: all, offset: {offset}, first: {first}, filter: $filter) {{ {selection} }} _aggregation {{ {data_type} (filter: $filter, accessibility: all) {{ _totalCount }} }} }}"
        );
        Self::new(query).with_variable("filter", filter_value(filter))
    }
}

fn filter_value(filter: Option<&GqlFilter>) -> Value {
    filter.map_or(Value::Null, GqlFilter::to_value)
}

#[derive(Debug, Clone, Copy)]
enum Selection {
    Histogram,
    Scalar,
}

/// Dotted field paths folded into a tree so shared prefixes render once.
#[derive(Debug, Default)]
struct FieldTree {
    children: IndexMap<String, FieldTree>,
}

impl FieldTree {
    fn insert(&mut self, path: &str) {
        let mut node = self;
        for segment in path.split('.') {
            node = node.children.entry(segment.to_string()).or_default();
        }
    }

    fn render(&self, selection: Selection) -> String {
        self.children
            .iter()
            .map(|(name, child)| {
                if !child.children.is_empty() {
                    return format!("{name} {{ {} }}", child.render(selection));
                }
                match selection {
                    Selection::Histogram => format!("{name} {{ histogram {{ key count }} }}"),
                    Selection::Scalar => name.clone(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn render_selection(fields: &[String], selection: Selection) -> String {
    let mut tree = FieldTree::default();
    for field in fields {
        tree.insert(field);
    }
    tree.render(selection)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn aggregation_renders_nested_fields_structurally() {
        let request = GraphQlRequest::aggregation("subject", &fields(&["f0", "f2.foo", "f2.bar"]), None);
        assert_eq!(
            request.query,
            "query ($filter: JSON) { _aggregation { subject (filter: $filter, filterSelf: false, accessibility: all) { \
             f0 { histogram { key count } } f2 { foo { histogram { key count } } bar { histogram { key count } } } } } }"
        );
        assert_eq!(request.variables["filter"], Value::Null);
    }

    #[test]
    fn aggregation_passes_filter_as_variable() {
        let filter = GqlFilter::in_values("f0", ["x"]);
        let request = GraphQlRequest::aggregation("subject", &fields(&["f0"]), Some(&filter));
        assert_eq!(request.variables["filter"], json!({"IN": {"f0": ["x"]}}));
    }

    #[test]
    fn raw_data_requests_page_and_total() {
        let request = GraphQlRequest::raw_data("subject", &fields(&["site"]), None, 40, 20);
        assert_eq!(
            request.query,
            "query ($filter: JSON) { subject (accessibility: all, offset: 40, first: 20, filter: $filter) { site } \
             _aggregation { subject (filter: $filter, accessibility: all) { _totalCount } } }"
        );
    }

    #[test]
    fn serializes_as_query_and_variables() {
        let request = GraphQlRequest::new("{ x }").with_variable("filter", json!({"AND": []}));
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"query": "{ x }", "variables": {"filter": {"AND": []}}})
        );
    }
}
