//! Reconciling fresh aggregation results with the initial baseline.
//!
//! The backend only reports buckets that match the current filter. Option
//! lists are instead derived from the unfiltered baseline, with counts
//! refreshed from the latest result, so choices never vanish from a widget
//! just because they now match nothing.

use thiserror::Error;
use tracing::error;

use super::types::{AggsCount, AggsData, BucketKey, FieldHistogram};
use crate::filter::{FilterEntry, FilterState};

/// Failure reconciling one field; the field degrades to an empty histogram.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconcileError {
    #[error("no histogram returned for filter field {0}")]
    MissingHistogram(String),

    #[error("range histogram for {field} has {len} buckets, expected 1")]
    RangeShape { field: String, len: usize },

    #[error("histogram for {0} mixes range and term buckets")]
    MixedKeys(String),
}

/// Refresh counts in `initial` from `processed`.
///
/// For each field of the baseline:
/// - term buckets are kept only if `processed` reports them, with the
///   processed count
/// - the single range bucket takes count and bounds from `processed`
///   (missing bounds read as 0); with no processed bucket the baseline
///   bucket is kept
/// - values selected in `filters_applied` but absent from the result are
///   appended with count 0
///
/// A field that cannot be reconciled is logged and emitted empty.
pub fn update_counts_in_initial_tabs_options(
    initial: &AggsData,
    processed: &AggsData,
    filters_applied: &FilterState,
) -> AggsData {
    initial
        .iter()
        .map(|(field, baseline)| {
            let histogram = match update_field(field, baseline, processed.get(field)) {
                Ok(mut histogram) => {
                    pad_selected_values(&mut histogram, filters_applied.get(field));
                    histogram
                }
                Err(e) => {
                    error!(field = %field, error = %e, "error when processing filter data");
                    Vec::new()
                }
            };
            (field.clone(), FieldHistogram::new(histogram))
        })
        .collect()
}

fn update_field(
    field: &str,
    baseline: &FieldHistogram,
    processed: Option<&FieldHistogram>,
) -> Result<Vec<AggsCount>, ReconcileError> {
    let is_range = baseline
        .histogram
        .iter()
        .any(|bucket| matches!(bucket.key, BucketKey::Range(_)));

    if is_range {
        return update_range_field(field, baseline, processed);
    }

    if baseline.is_empty() {
        return Ok(Vec::new());
    }
    let processed = processed.ok_or_else(|| ReconcileError::MissingHistogram(field.to_string()))?;

    Ok(baseline
        .histogram
        .iter()
        .filter_map(|bucket| {
            let term = bucket.key.as_term()?;
            let fresh = processed.find_term(term)?;
            Some(AggsCount {
                key: bucket.key.clone(),
                count: fresh.count,
                accessible: fresh.accessible,
            })
        })
        .collect())
}

fn update_range_field(
    field: &str,
    baseline: &FieldHistogram,
    processed: Option<&FieldHistogram>,
) -> Result<Vec<AggsCount>, ReconcileError> {
    let [bucket] = baseline.histogram.as_slice() else {
        return Err(ReconcileError::RangeShape {
            field: field.to_string(),
            len: baseline.histogram.len(),
        });
    };

    let Some(fresh) = processed.and_then(|p| p.histogram.first()) else {
        return Ok(vec![bucket.clone()]);
    };
    let [lower, upper] = fresh
        .key
        .as_range()
        .ok_or_else(|| ReconcileError::MixedKeys(field.to_string()))?;

    Ok(vec![AggsCount {
        key: BucketKey::Range([or_zero(lower), or_zero(upper)]),
        count: fresh.count,
        accessible: bucket.accessible,
    }])
}

fn or_zero(bound: f64) -> f64 {
    if bound.is_nan() { 0.0 } else { bound }
}

fn pad_selected_values(histogram: &mut Vec<AggsCount>, filter: Option<&FilterEntry>) {
    let Some(selected) = filter.and_then(FilterEntry::selected_values) else {
        return;
    };
    for value in selected {
        if !histogram.iter().any(|bucket| bucket.key.is_term(value)) {
            histogram.push(AggsCount::new(value.as_str(), 0));
        }
    }
}

/// Sort every field's buckets with [`BucketKey::sort_cmp`].
pub fn sort_tabs_options(tabs_options: &AggsData) -> AggsData {
    tabs_options
        .iter()
        .map(|(field, histogram)| {
            let mut buckets = histogram.histogram.clone();
            buckets.sort_by(|a, b| a.key.sort_cmp(&b.key));
            (field.clone(), FieldHistogram::new(buckets))
        })
        .collect()
}

/// Union of two results; histograms of shared fields are concatenated
/// `first ++ second` without deduplication.
pub fn merge_tab_options(first: &AggsData, second: &AggsData) -> AggsData {
    if first.is_empty() {
        return second.clone();
    }
    if second.is_empty() {
        return first.clone();
    }

    let mut merged = first.clone();
    for (field, histogram) in second {
        merged
            .entry(field.clone())
            .or_default()
            .histogram
            .extend(histogram.histogram.iter().cloned());
    }
    merged
}

/// Drop buckets a field's own filter excludes.
///
/// Option-filtered fields keep only their selected buckets; fields filtered
/// any other way are emptied. Without filters the data passes through.
pub fn exclude_self_filter_from_aggs_data(
    received: &AggsData,
    filters: Option<&FilterState>,
) -> AggsData {
    let Some(filters) = filters else {
        return received.clone();
    };

    received
        .iter()
        .map(|(field, histogram)| {
            let kept = match filters.get(field) {
                None => histogram.clone(),
                Some(FilterEntry::Options(options)) => FieldHistogram::new(
                    histogram
                        .histogram
                        .iter()
                        .filter(|bucket| {
                            bucket
                                .key
                                .as_term()
                                .is_some_and(|term| options.selected_values.iter().any(|v| v == term))
                        })
                        .cloned()
                        .collect(),
                ),
                Some(_) => FieldHistogram::default(),
            };
            (field.clone(), kept)
        })
        .collect()
}
