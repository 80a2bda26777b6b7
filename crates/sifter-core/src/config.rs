//! Configuration: backend connection from environment variables and the
//! explorer's filter configuration from JSON or YAML.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::filter::FilterState;
use crate::query::{AnchorConfig, FilterTab};
use crate::sections::FieldMapping;

/// Connection settings for [`crate::backend::HttpBackend`].
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL of the search service.
    pub backend_url: Url,

    /// GraphQL endpoint relative to `backend_url` (default: /graphql).
    pub graphql_path: String,

    /// Index status endpoint relative to `backend_url` (default: /_status).
    pub status_path: String,

    /// Per-request timeout (default: 30s).
    pub request_timeout: Duration,

    /// Autosuggest page size for search filters (default: 20).
    pub search_page_size: usize,
}

impl BackendConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let backend_url = lookup("SIFTER_BACKEND_URL")
            .context("SIFTER_BACKEND_URL environment variable is required")?;
        let backend_url = Url::parse(&backend_url).context("SIFTER_BACKEND_URL must be a valid URL")?;

        let graphql_path = lookup("SIFTER_GRAPHQL_PATH").unwrap_or_else(|| "/graphql".to_string());
        let status_path = lookup("SIFTER_STATUS_PATH").unwrap_or_else(|| "/_status".to_string());

        let timeout_secs: u64 = lookup("SIFTER_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|| "30".to_string())
            .parse()
            .context("SIFTER_REQUEST_TIMEOUT_SECS must be a valid u64")?;

        let search_page_size = lookup("SIFTER_SEARCH_PAGE_SIZE")
            .unwrap_or_else(|| "20".to_string())
            .parse()
            .context("SIFTER_SEARCH_PAGE_SIZE must be a valid usize")?;

        Ok(Self {
            backend_url,
            graphql_path,
            status_path,
            request_timeout: Duration::from_secs(timeout_secs),
            search_page_size,
        })
    }
}

/// Filter tabs and optional anchor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub tabs: Vec<FilterTab>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<AnchorConfig>,
}

/// Everything a filter session needs to know about one explorer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerConfig {
    /// Backend data type (index) queried by this explorer.
    pub data_type: String,

    pub filters: FilterConfig,

    #[serde(default)]
    pub field_mapping: Vec<FieldMapping>,

    /// Restrictions applied on top of every user filter.
    #[serde(default)]
    pub admin_applied_pre_filters: FilterState,
}

impl ExplorerConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("invalid explorer config JSON")
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yml::from_str(raw).context("invalid explorer config YAML")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = BackendConfig::from_lookup(lookup(&[("SIFTER_BACKEND_URL", "http://guppy:8000")])).unwrap();
        assert_eq!(config.backend_url.as_str(), "http://guppy:8000/");
        assert_eq!(config.graphql_path, "/graphql");
        assert_eq!(config.status_path, "/_status");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.search_page_size, 20);
    }

    #[test]
    fn backend_url_is_required() {
        let err = BackendConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("SIFTER_BACKEND_URL"));
    }

    #[test]
    fn invalid_number_is_reported() {
        let err = BackendConfig::from_lookup(lookup(&[
            ("SIFTER_BACKEND_URL", "http://guppy:8000"),
            ("SIFTER_SEARCH_PAGE_SIZE", "many"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("SIFTER_SEARCH_PAGE_SIZE"));
    }

    #[test]
    fn explorer_config_from_json() {
        let config = ExplorerConfig::from_json_str(
            r#"{
                "dataType": "subject",
                "filters": {
                    "tabs": [
                        {"title": "Subject", "fields": ["gender", "age"], "searchFields": ["site"]},
                        {"title": "Visit", "fields": ["visit.label"]}
                    ],
                    "anchor": {"field": "visit_type", "tabs": ["Visit"], "options": ["baseline"]}
                },
                "fieldMapping": [{"field": "age", "name": "Age at Enrollment"}],
                "adminAppliedPreFilters": {"value": {"project": {"selectedValues": ["p1"]}}}
            }"#,
        )
        .unwrap();

        assert_eq!(config.data_type, "subject");
        assert_eq!(config.filters.tabs[0].search_fields, vec!["site"]);
        assert_eq!(config.filters.anchor.as_ref().map(|a| a.field.as_str()), Some("visit_type"));
        assert_eq!(config.field_mapping[0].name, "Age at Enrollment");
        assert_eq!(
            config.admin_applied_pre_filters.selected_values("project"),
            Some(&["p1".to_string()][..])
        );
    }

    #[test]
    fn explorer_config_from_yaml() {
        let config = ExplorerConfig::from_yaml_str(
            "dataType: case\nfilters:\n  tabs:\n    - title: Case\n      fields: [disease]\n",
        )
        .unwrap();
        assert_eq!(config.filters.tabs, vec![FilterTab::new("Case", ["disease"])]);
        assert!(config.filters.anchor.is_none());
        assert!(config.admin_applied_pre_filters.is_empty());
    }

    #[test]
    fn explorer_config_requires_data_type() {
        assert!(ExplorerConfig::from_json_str(r#"{"filters": {}}"#).is_err());
    }
}
