//! Aggregation histograms and their reconciliation.

mod merge;
pub mod types;

pub use merge::{
    ReconcileError, exclude_self_filter_from_aggs_data, merge_tab_options, sort_tabs_options,
    update_counts_in_initial_tabs_options,
};
pub use types::{AggsCount, AggsData, BucketKey, FieldHistogram, decode_aggs_data};
