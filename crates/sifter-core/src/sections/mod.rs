//! Filter sections: what each filter widget renders.
//!
//! A section is built per field from the reconciled histograms. Search fields
//! come first and only list what is currently selected; list fields show
//! every bucket, or a single slider for range-shaped histograms.

mod search;

use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::error;

use crate::aggs::{AggsData, FieldHistogram};
use crate::backend::ExplorerBackend;
use crate::filter::{FilterEntry, FilterState};

pub use search::{SearchOption, SearchOptionsLoader, SearchOptionsPage};

/// Matches one word for title casing.
///
/// Panics if the hard-coded regex literal is invalid (impossible in practice).
#[allow(clippy::expect_used)]
static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w\S*").expect("valid regex literal"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SectionError {
    #[error("no histogram data for filter field {0}")]
    MissingHistogram(String),
}

/// Display name override for a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub field: String,
    pub name: String,
}

/// Fields the backend stores as arrays, per index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArrayFieldIndex {
    fields_by_index: IndexMap<String, Vec<String>>,
}

impl ArrayFieldIndex {
    pub fn new(fields_by_index: IndexMap<String, Vec<String>>) -> Self {
        Self { fields_by_index }
    }

    /// Read the backend status document.
    ///
    /// Accepts `{indices: {<index>: {fields: [..]}}}` as well as the flat
    /// `{<index>: {arrayFields: [..]}}` form.
    pub fn from_status(status: &Value) -> Self {
        let indices = status.get("indices").unwrap_or(status);
        let Some(indices) = indices.as_object() else {
            return Self::default();
        };

        let fields_by_index = indices
            .iter()
            .filter_map(|(index, info)| {
                let fields = info
                    .get("fields")
                    .or_else(|| info.get("arrayFields"))?
                    .as_array()?
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect::<Vec<_>>();
                Some((index.clone(), fields))
            })
            .collect();
        Self { fields_by_index }
    }

    pub fn is_array_field(&self, field: &str) -> bool {
        self.fields_by_index
            .values()
            .any(|fields| fields.iter().any(|f| f == field))
    }

    pub fn is_empty(&self) -> bool {
        self.fields_by_index.values().all(Vec::is_empty)
    }
}

/// One selectable entry in a section.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "filterType", rename_all = "camelCase")]
pub enum FilterOption {
    #[serde(rename_all = "camelCase")]
    Range {
        min: f64,
        max: f64,
        lower_bound: f64,
        upper_bound: f64,
        count: u64,
    },
    SingleSelect {
        text: String,
        count: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        accessible: Option<bool>,
    },
}

/// Renderable descriptor for one field's filter widget.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSection {
    pub field: String,
    pub title: String,
    pub options: Vec<FilterOption>,
    pub is_search_filter: bool,
    pub is_array_field: bool,
    #[serde(skip)]
    pub search_loader: Option<SearchOptionsLoader>,
}

struct SearchContext {
    backend: Arc<dyn ExplorerBackend>,
    data_type: String,
    page_size: usize,
}

/// Builds [`FilterSection`]s from reconciled aggregation data.
pub struct FilterSectionBuilder<'a> {
    tabs_options: &'a AggsData,
    initial: Option<&'a AggsData>,
    field_mapping: &'a [FieldMapping],
    admin_pre_filters: Option<&'a FilterState>,
    applied_filter: Option<&'a FilterState>,
    array_fields: Option<&'a ArrayFieldIndex>,
    search: Option<SearchContext>,
}

impl<'a> FilterSectionBuilder<'a> {
    pub fn new(tabs_options: &'a AggsData) -> Self {
        Self {
            tabs_options,
            initial: None,
            field_mapping: &[],
            admin_pre_filters: None,
            applied_filter: None,
            array_fields: None,
            search: None,
        }
    }

    /// Baseline used for slider min/max.
    pub fn initial(mut self, initial: &'a AggsData) -> Self {
        self.initial = Some(initial);
        self
    }

    pub fn field_mapping(mut self, field_mapping: &'a [FieldMapping]) -> Self {
        self.field_mapping = field_mapping;
        self
    }

    /// Restrict list buckets to the admin's allowed values.
    pub fn admin_pre_filters(mut self, admin_pre_filters: &'a FilterState) -> Self {
        self.admin_pre_filters = Some(admin_pre_filters);
        self
    }

    /// Current selection; search sections list only selected buckets.
    pub fn applied_filter(mut self, applied_filter: &'a FilterState) -> Self {
        self.applied_filter = Some(applied_filter);
        self
    }

    pub fn array_fields(mut self, array_fields: &'a ArrayFieldIndex) -> Self {
        self.array_fields = Some(array_fields);
        self
    }

    /// Attach an autosuggest loader to every search section.
    pub fn search(
        mut self,
        backend: Arc<dyn ExplorerBackend>,
        data_type: impl Into<String>,
        page_size: usize,
    ) -> Self {
        self.search = Some(SearchContext {
            backend,
            data_type: data_type.into(),
            page_size,
        });
        self
    }

    /// Sections for `search_fields` followed by `fields`.
    pub fn build(
        &self,
        fields: &[String],
        search_fields: &[String],
    ) -> Result<Vec<FilterSection>, SectionError> {
        let mut sections = Vec::with_capacity(fields.len() + search_fields.len());
        sections.extend(search_fields.iter().map(|field| self.search_section(field)));
        for field in fields {
            sections.push(self.list_section(field)?);
        }
        Ok(sections)
    }

    /// Like [`build`](Self::build), but a list field without a histogram is
    /// logged and rendered with no options instead of failing every section.
    pub fn build_lenient(&self, fields: &[String], search_fields: &[String]) -> Vec<FilterSection> {
        let mut sections = Vec::with_capacity(fields.len() + search_fields.len());
        sections.extend(search_fields.iter().map(|field| self.search_section(field)));
        sections.extend(fields.iter().map(|field| {
            self.list_section(field).unwrap_or_else(|e| {
                error!(field = %field, error = %e, "error when building filter section");
                self.empty_list_section(field)
            })
        }));
        sections
    }

    fn search_section(&self, field: &str) -> FilterSection {
        let selected = self.applied_filter.and_then(|f| f.selected_values(field));
        let options = match (self.tabs_options.get(field), selected) {
            (Some(histogram), Some(selected)) => {
                let mut histogram = self.restrict_to_admin(field, histogram);
                histogram
                    .histogram
                    .retain(|bucket| bucket.key.as_term().is_some_and(|k| selected.iter().any(|s| s == k)));
                self.options_for(field, &histogram)
            }
            _ => Vec::new(),
        };

        FilterSection {
            field: field.to_string(),
            title: self.label(field),
            options,
            is_search_filter: true,
            is_array_field: false,
            search_loader: self.search.as_ref().map(|ctx| {
                SearchOptionsLoader::new(ctx.backend.clone(), &ctx.data_type, field, ctx.page_size)
            }),
        }
    }

    fn list_section(&self, field: &str) -> Result<FilterSection, SectionError> {
        let histogram = self
            .tabs_options
            .get(field)
            .ok_or_else(|| SectionError::MissingHistogram(field.to_string()))?;
        let histogram = self.restrict_to_admin(field, histogram);

        Ok(FilterSection {
            options: self.options_for(field, &histogram),
            ..self.empty_list_section(field)
        })
    }

    fn empty_list_section(&self, field: &str) -> FilterSection {
        FilterSection {
            field: field.to_string(),
            title: self.label(field),
            options: Vec::new(),
            is_search_filter: false,
            is_array_field: self
                .array_fields
                .is_some_and(|index| index.is_array_field(field)),
            search_loader: None,
        }
    }

    fn label(&self, field: &str) -> String {
        self.field_mapping
            .iter()
            .find(|mapping| mapping.field == field)
            .map_or_else(|| derive_label(field), |mapping| mapping.name.clone())
    }

    fn restrict_to_admin(&self, field: &str, histogram: &FieldHistogram) -> FieldHistogram {
        let Some(FilterEntry::Options(allowed)) = self.admin_pre_filters.and_then(|f| f.get(field)) else {
            return histogram.clone();
        };
        FieldHistogram::new(
            histogram
                .histogram
                .iter()
                .filter(|bucket| {
                    bucket
                        .key
                        .as_term()
                        .is_some_and(|k| allowed.selected_values.iter().any(|v| v == k))
                })
                .cloned()
                .collect(),
        )
    }

    fn options_for(&self, field: &str, histogram: &FieldHistogram) -> Vec<FilterOption> {
        if let Some([lower, upper]) = histogram.range_bounds() {
            let [min, max] = self
                .initial
                .and_then(|initial| initial.get(field))
                .and_then(|initial| initial.histogram.first())
                .and_then(|bucket| bucket.key.as_range())
                .unwrap_or([lower, upper]);
            let count = histogram.histogram.first().map_or(0, |bucket| bucket.count);
            return vec![FilterOption::Range {
                min: min.floor(),
                max: max.ceil(),
                lower_bound: lower,
                upper_bound: upper,
                count,
            }];
        }

        histogram
            .histogram
            .iter()
            .map(|bucket| FilterOption::SingleSelect {
                text: bucket.key.to_string(),
                count: bucket.count,
                accessible: bucket.accessible,
            })
            .collect()
    }
}

/// Human label for a field path: `_` and `.` become spaces and each word
/// is title cased (`visit.visit_label` → `Visit Visit Label`).
pub fn derive_label(field: &str) -> String {
    let spaced = field.replace(['_', '.'], " ");
    WORD.replace_all(&spaced, |caps: &regex::Captures<'_>| {
        let word = &caps[0];
        let mut chars = word.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
            None => String::new(),
        }
    })
    .into_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::aggs::AggsCount;
    use crate::filter::{OptionFilter, RangeFilter};
    use serde_json::json;

    fn data(entries: Vec<(&str, Vec<AggsCount>)>) -> AggsData {
        entries
            .into_iter()
            .map(|(field, buckets)| (field.to_string(), FieldHistogram::new(buckets)))
            .collect()
    }

    fn names(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn derive_label_title_cases_words() {
        assert_eq!(derive_label("visit.visit_label"), "Visit Visit Label");
        assert_eq!(derive_label("AGE_at_enrollment"), "Age At Enrollment");
        assert_eq!(derive_label("gender"), "Gender");
    }

    #[test]
    fn lenient_build_renders_missing_histogram_empty() {
        let tabs = data(vec![("gender", vec![AggsCount::new("F", 3)])]);
        let builder = FilterSectionBuilder::new(&tabs);

        assert_eq!(
            builder.build(&names(&["race", "gender"]), &[]).unwrap_err(),
            SectionError::MissingHistogram("race".to_string())
        );

        let sections = builder.build_lenient(&names(&["race", "gender"]), &[]);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].field, "race");
        assert_eq!(sections[0].title, "Race");
        assert!(sections[0].options.is_empty());
        assert_eq!(sections[1].options.len(), 1);
    }

    #[test]
    fn field_mapping_overrides_label() {
        let tabs = data(vec![("age", vec![AggsCount::new("1", 1)])]);
        let mapping = vec![FieldMapping {
            field: "age".to_string(),
            name: "Age at Enrollment".to_string(),
        }];
        let sections = FilterSectionBuilder::new(&tabs)
            .field_mapping(&mapping)
            .build(&names(&["age"]), &[])
            .unwrap();
        assert_eq!(sections[0].title, "Age at Enrollment");
    }

    #[test]
    fn range_histogram_becomes_slider_with_initial_bounds() {
        let tabs = data(vec![("age", vec![AggsCount::new([18.2, 64.5], 40)])]);
        let initial = data(vec![("age", vec![AggsCount::new([0.4, 89.1], 100)])]);

        let sections = FilterSectionBuilder::new(&tabs)
            .initial(&initial)
            .build(&names(&["age"]), &[])
            .unwrap();
        assert_eq!(
            sections[0].options,
            vec![FilterOption::Range {
                min: 0.0,
                max: 90.0,
                lower_bound: 18.2,
                upper_bound: 64.5,
                count: 40,
            }]
        );
    }

    #[test]
    fn slider_without_baseline_uses_own_bounds() {
        let tabs = data(vec![("age", vec![AggsCount::new([1.5, 9.5], 3)])]);
        let sections = FilterSectionBuilder::new(&tabs)
            .build(&names(&["age"]), &[])
            .unwrap();
        let FilterOption::Range { min, max, .. } = sections[0].options[0] else {
            panic!("expected range option");
        };
        assert_eq!((min, max), (1.0, 10.0));
    }

    #[test]
    fn term_histogram_becomes_single_select_options() {
        let tabs = data(vec![(
            "gender",
            vec![AggsCount::new("F", 3), AggsCount::new("M", 2).with_accessible(false)],
        )]);
        let sections = FilterSectionBuilder::new(&tabs)
            .build(&names(&["gender"]), &[])
            .unwrap();
        assert_eq!(
            serde_json::to_value(&sections[0].options).unwrap(),
            json!([
                {"filterType": "singleSelect", "text": "F", "count": 3},
                {"filterType": "singleSelect", "text": "M", "count": 2, "accessible": false}
            ])
        );
    }

    #[test]
    fn admin_pre_filter_restricts_buckets() {
        let tabs = data(vec![(
            "project",
            vec![AggsCount::new("p1", 3), AggsCount::new("p2", 2)],
        )]);
        let admin = FilterState::new().with("project", OptionFilter::new(["p2"]));
        let sections = FilterSectionBuilder::new(&tabs)
            .admin_pre_filters(&admin)
            .build(&names(&["project"]), &[])
            .unwrap();
        assert_eq!(sections[0].options.len(), 1);
        assert!(matches!(&sections[0].options[0], FilterOption::SingleSelect { text, .. } if text == "p2"));
    }

    #[test]
    fn non_option_admin_entry_does_not_restrict() {
        let tabs = data(vec![("age", vec![AggsCount::new([0.0, 9.0], 3)])]);
        let admin = FilterState::new().with("age", RangeFilter::new(1.0, 2.0));
        let sections = FilterSectionBuilder::new(&tabs)
            .admin_pre_filters(&admin)
            .build(&names(&["age"]), &[])
            .unwrap();
        assert_eq!(sections[0].options.len(), 1);
    }

    #[test]
    fn search_fields_come_first_and_show_only_selected() {
        let tabs = data(vec![
            ("site", vec![AggsCount::new("a", 3), AggsCount::new("b", 1)]),
            ("gender", vec![AggsCount::new("F", 3)]),
        ]);
        let applied = FilterState::new().with("site", OptionFilter::new(["b"]));
        let sections = FilterSectionBuilder::new(&tabs)
            .applied_filter(&applied)
            .build(&names(&["gender"]), &names(&["site"]))
            .unwrap();

        assert_eq!(sections[0].field, "site");
        assert!(sections[0].is_search_filter);
        assert!(sections[0].search_loader.is_none());
        assert_eq!(
            sections[0].options,
            vec![FilterOption::SingleSelect {
                text: "b".to_string(),
                count: 1,
                accessible: None,
            }]
        );
        assert_eq!(sections[1].field, "gender");
        assert!(!sections[1].is_search_filter);
    }

    #[test]
    fn search_section_without_selection_is_empty() {
        let tabs = data(vec![("site", vec![AggsCount::new("a", 3)])]);
        let sections = FilterSectionBuilder::new(&tabs)
            .build(&[], &names(&["site"]))
            .unwrap();
        assert!(sections[0].options.is_empty());
    }

    #[test]
    fn list_field_without_histogram_fails() {
        let tabs = AggsData::new();
        let err = FilterSectionBuilder::new(&tabs)
            .build(&names(&["gender"]), &[])
            .unwrap_err();
        assert_eq!(err, SectionError::MissingHistogram("gender".to_string()));
    }

    #[test]
    fn array_fields_are_flagged() {
        let tabs = data(vec![
            ("tags", vec![AggsCount::new("x", 1)]),
            ("gender", vec![AggsCount::new("F", 1)]),
        ]);
        let index = ArrayFieldIndex::from_status(&json!({
            "indices": {"subject": {"fields": ["tags"]}}
        }));
        let sections = FilterSectionBuilder::new(&tabs)
            .array_fields(&index)
            .build(&names(&["tags", "gender"]), &[])
            .unwrap();
        assert!(sections[0].is_array_field);
        assert!(!sections[1].is_array_field);
    }

    #[test]
    fn array_field_index_accepts_flat_status() {
        let index = ArrayFieldIndex::from_status(&json!({
            "subject": {"arrayFields": ["tags"]},
            "file": {"arrayFields": []}
        }));
        assert!(index.is_array_field("tags"));
        assert!(!index.is_array_field("file_name"));
        assert!(ArrayFieldIndex::from_status(&json!({})).is_empty());
    }
}
