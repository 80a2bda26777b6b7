//! Search backend seam and response decoding.
//!
//! The backend is reached through [`ExplorerBackend`]; [`HttpBackend`] is the
//! reqwest implementation. Everything that turns a raw response body into
//! library types lives here so alternative transports only move JSON.

mod http;

use async_trait::async_trait;
use serde_json::Value;

use crate::aggs::{AggsData, decode_aggs_data};
use crate::error::{ExplorerError, ExplorerResult};
use crate::query::GraphQlRequest;

pub use http::HttpBackend;

/// Transport to the search backend.
#[async_trait]
pub trait ExplorerBackend: Send + Sync {
    /// Post a GraphQL request and return the response body.
    ///
    /// GraphQL-level errors are reported in the body, not as `Err`.
    async fn graphql(&self, request: &GraphQlRequest) -> ExplorerResult<Value>;

    /// Fetch the index status document used to discover array fields.
    async fn field_status(&self) -> ExplorerResult<Value>;
}

/// Histograms answered under `data._aggregation.<key>`.
///
/// A body without that member is a backend query error carrying the body's
/// `errors[].message` list.
pub fn parse_aggregation_response(body: &Value, key: &str) -> ExplorerResult<AggsData> {
    let tree = body
        .get("data")
        .and_then(|data| data.get("_aggregation"))
        .and_then(|aggregation| aggregation.get(key))
        .filter(|tree| !tree.is_null())
        .ok_or_else(|| ExplorerError::from_response_errors(body))?;
    Ok(decode_aggs_data(tree))
}

/// One page of raw records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDataPage {
    pub records: Vec<Value>,
    /// Matches across all pages.
    pub total_count: u64,
}

/// Records under `data.<data_type>` and the total under
/// `data._aggregation.<data_type>._totalCount`.
///
/// Returns `None` when the body carries no records for the type.
pub fn parse_raw_data_response(body: &Value, data_type: &str) -> Option<RawDataPage> {
    let data = body.get("data")?;
    let records = data.get(data_type)?.as_array()?.clone();
    let total_count = data
        .get("_aggregation")
        .and_then(|aggregation| aggregation.get(data_type))
        .and_then(|totals| totals.get("_totalCount"))
        .and_then(Value::as_u64)
        .unwrap_or(records.len() as u64);
    Some(RawDataPage {
        records,
        total_count,
    })
}
