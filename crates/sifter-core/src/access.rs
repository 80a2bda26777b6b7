//! Accessibility checks over per-field value lists.
//!
//! The backend marks each bucket with `accessible` when queried with
//! `accessibility: all`. These helpers answer the two questions the explorer
//! asks of a gating field (typically the project id): can the user see
//! nothing, or everything?

use indexmap::IndexMap;

use crate::aggs::AggsData;

/// Field → values.
pub type FieldValues = IndexMap<String, Vec<String>>;

/// True when `field` is listed and has no accessible values.
///
/// An unlisted field is not evidence of missing access.
pub fn has_no_accessible_values(accessible: Option<&FieldValues>, field: &str) -> bool {
    accessible
        .and_then(|values| values.get(field))
        .is_some_and(Vec::is_empty)
}

/// True when `field` is listed and has no inaccessible values.
pub fn has_full_access(inaccessible: Option<&FieldValues>, field: &str) -> bool {
    inaccessible
        .and_then(|values| values.get(field))
        .is_some_and(Vec::is_empty)
}

/// Split each field's term buckets by their `accessible` flag.
///
/// Returns `(accessible, inaccessible)`. Buckets without the flag count as
/// accessible.
pub fn partition_by_access(aggs: &AggsData) -> (FieldValues, FieldValues) {
    let mut accessible = FieldValues::new();
    let mut inaccessible = FieldValues::new();

    for (field, histogram) in aggs {
        let (open, locked): (Vec<_>, Vec<_>) = histogram
            .histogram
            .iter()
            .filter_map(|bucket| Some((bucket.key.as_term()?.to_string(), bucket.accessible)))
            .partition(|(_, flag)| flag.unwrap_or(true));
        accessible.insert(field.clone(), open.into_iter().map(|(v, _)| v).collect());
        inaccessible.insert(field.clone(), locked.into_iter().map(|(v, _)| v).collect());
    }

    (accessible, inaccessible)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::aggs::{AggsCount, FieldHistogram};

    fn values(entries: Vec<(&str, Vec<&str>)>) -> FieldValues {
        entries
            .into_iter()
            .map(|(field, vals)| (field.to_string(), vals.into_iter().map(str::to_string).collect()))
            .collect()
    }

    #[test]
    fn no_accessible_values_requires_listed_empty_field() {
        let listed = values(vec![("project", vec![])]);
        assert!(has_no_accessible_values(Some(&listed), "project"));
        assert!(!has_no_accessible_values(Some(&listed), "other"));
        assert!(!has_no_accessible_values(None, "project"));

        let some = values(vec![("project", vec!["p1"])]);
        assert!(!has_no_accessible_values(Some(&some), "project"));
    }

    #[test]
    fn full_access_requires_listed_empty_field() {
        let none_locked = values(vec![("project", vec![])]);
        assert!(has_full_access(Some(&none_locked), "project"));
        assert!(!has_full_access(None, "project"));

        let locked = values(vec![("project", vec!["p2"])]);
        assert!(!has_full_access(Some(&locked), "project"));
    }

    #[test]
    fn partitions_buckets_by_flag() {
        let mut aggs = AggsData::new();
        aggs.insert(
            "project".to_string(),
            FieldHistogram::new(vec![
                AggsCount::new("p1", 3).with_accessible(true),
                AggsCount::new("p2", 1).with_accessible(false),
                AggsCount::new("p3", 1),
            ]),
        );

        let (accessible, inaccessible) = partition_by_access(&aggs);
        assert_eq!(accessible["project"], vec!["p1", "p3"]);
        assert_eq!(inaccessible["project"], vec!["p2"]);
        assert!(!has_full_access(Some(&inaccessible), "project"));
        assert!(!has_no_accessible_values(Some(&accessible), "project"));
    }
}
