//! Autosuggest for search-type filter fields.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::backend::{ExplorerBackend, parse_raw_data_response};
use crate::error::ExplorerResult;
use crate::query::{GqlFilter, GraphQlRequest};

/// One suggestion shown under a search box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchOption {
    pub value: String,
    pub label: String,
}

/// A page of suggestions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptionsPage {
    pub options: Vec<SearchOption>,
    pub has_more: bool,
}

/// Loads suggestions for one field by querying raw records.
#[derive(Clone)]
pub struct SearchOptionsLoader {
    backend: Arc<dyn ExplorerBackend>,
    data_type: String,
    field: String,
    page_size: usize,
}

impl fmt::Debug for SearchOptionsLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchOptionsLoader")
            .field("data_type", &self.data_type)
            .field("field", &self.field)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl SearchOptionsLoader {
    pub fn new(
        backend: Arc<dyn ExplorerBackend>,
        data_type: impl Into<String>,
        field: impl Into<String>,
        page_size: usize,
    ) -> Self {
        Self {
            backend,
            data_type: data_type.into(),
            field: field.into(),
            page_size,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Suggestions matching `search`, starting at `offset`.
    ///
    /// An empty search string returns the unfiltered first page so the box
    /// can show defaults before the user types. A response without records
    /// yields an empty page with `has_more == false`.
    pub async fn load_options(&self, search: &str, offset: usize) -> ExplorerResult<SearchOptionsPage> {
        let filter = (!search.is_empty()).then(|| GqlFilter::search(search, vec![self.field.clone()]));
        let request = GraphQlRequest::raw_data(
            &self.data_type,
            std::slice::from_ref(&self.field),
            filter.as_ref(),
            offset,
            self.page_size,
        );

        let body = self.backend.graphql(&request).await?;
        let Some(page) = parse_raw_data_response(&body, &self.data_type) else {
            debug!(field = %self.field, "search returned no records");
            return Ok(SearchOptionsPage::default());
        };

        let options = page
            .records
            .iter()
            .filter_map(|record| field_text(record, &self.field))
            .map(|text| SearchOption {
                value: text.clone(),
                label: text,
            })
            .collect();

        Ok(SearchOptionsPage {
            options,
            has_more: page.total_count > offset.saturating_add(page.records.len()) as u64,
        })
    }
}

/// Text of a possibly nested field of a raw record.
fn field_text(record: &Value, field: &str) -> Option<String> {
    let value = match record.get(field) {
        Some(value) => value,
        None => field
            .split('.')
            .try_fold(record, |node, segment| node.get(segment))?,
    };
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
