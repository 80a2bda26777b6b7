//! Admin pre-filter merging.

use super::types::{FilterEntry, FilterState, OptionFilter};

/// Fold an admin-applied pre-filter into a user filter.
///
/// The admin filter must never widen what the user sees. For each admin
/// option entry:
/// - user selection overlapping the admin values is kept verbatim
/// - disjoint user selection is replaced by the admin values
/// - fields the user never touched receive the admin values
///
/// Admin entries that are not option filters are ignored, as are user
/// entries on the same field that are not option filters.
pub fn merge_filters(user_filter: &FilterState, admin_pre_filter: &FilterState) -> FilterState {
    let mut merged = user_filter.clone();

    for (field, admin_entry) in &admin_pre_filter.value {
        let FilterEntry::Options(admin_options) = admin_entry else {
            continue;
        };

        match merged.value.get_mut(field) {
            Some(FilterEntry::Options(user_options)) => {
                let overlaps = user_options
                    .selected_values
                    .iter()
                    .any(|v| admin_options.selected_values.contains(v));
                if !overlaps {
                    user_options
                        .selected_values
                        .clone_from(&admin_options.selected_values);
                }
            }
            Some(_) => {}
            None => {
                merged.value.insert(
                    field.clone(),
                    FilterEntry::Options(OptionFilter::new(
                        admin_options.selected_values.iter().cloned(),
                    )),
                );
            }
        }
    }

    merged
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::filter::types::{CombineMode, RangeFilter};

    #[test]
    fn overlapping_user_selection_is_kept() {
        let user = FilterState::new().with("a", OptionFilter::new(["foo", "bar"]));
        let admin = FilterState::new().with("a", OptionFilter::new(["foo"]));

        let merged = merge_filters(&user, &admin);
        assert_eq!(merged, user);
    }

    #[test]
    fn disjoint_user_selection_falls_back_to_admin() {
        let user = FilterState::new().with("a", OptionFilter::new(["baz"]));
        let admin = FilterState::new().with("a", OptionFilter::new(["foo"]));

        let merged = merge_filters(&user, &admin);
        assert_eq!(merged.selected_values("a"), Some(&["foo".to_string()][..]));
    }

    #[test]
    fn disjoint_fallback_keeps_user_combine_mode() {
        let user = FilterState::new().with("a", OptionFilter::new(["baz"]).match_all());
        let admin = FilterState::new().with("a", OptionFilter::new(["foo"]));

        let merged = merge_filters(&user, &admin);
        let Some(FilterEntry::Options(options)) = merged.get("a") else {
            panic!("expected option filter");
        };
        assert_eq!(options.combine_mode, Some(CombineMode::And));
        assert_eq!(options.selected_values, vec!["foo"]);
    }

    #[test]
    fn untouched_admin_field_is_added() {
        let user = FilterState::new().with("b", OptionFilter::new(["x"]));
        let admin = FilterState::new().with("a", OptionFilter::new(["foo"]));

        let merged = merge_filters(&user, &admin);
        assert_eq!(merged.selected_values("b"), Some(&["x".to_string()][..]));
        assert_eq!(merged.selected_values("a"), Some(&["foo".to_string()][..]));
    }

    #[test]
    fn non_option_admin_entries_are_ignored() {
        let user = FilterState::new();
        let admin = FilterState::new().with("age", RangeFilter::new(0.0, 10.0));

        let merged = merge_filters(&user, &admin);
        assert!(merged.is_empty());
    }

    #[test]
    fn user_range_on_admin_field_is_left_alone() {
        let user = FilterState::new().with("a", RangeFilter::new(1.0, 2.0));
        let admin = FilterState::new().with("a", OptionFilter::new(["foo"]));

        let merged = merge_filters(&user, &admin);
        assert_eq!(merged, user);
    }

    #[test]
    fn inputs_are_not_mutated() {
        let user = FilterState::new().with("a", OptionFilter::new(["baz"]));
        let admin = FilterState::new().with("a", OptionFilter::new(["foo"]));
        let before = user.clone();

        let _ = merge_filters(&user, &admin);
        assert_eq!(user, before);
    }
}
