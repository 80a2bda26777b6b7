//! Backend query construction.
//!
//! This module provides:
//! - GqlFilter: the compiled filter tree sent to the search backend
//! - compile: FilterState → GqlFilter, including anchored sub-filters
//! - plan: partition filter tabs into per-anchor query groups
//! - GraphQlRequest builders for aggregation and raw-record queries

mod anchor;
mod compiler;
mod gql;
pub mod graphql;

pub use anchor::{AnchorConfig, FilterTab, MAIN_GROUP, PlanInput, QueryPlan, all_fields, plan};
pub use compiler::{CompileError, compile};
pub use gql::{GqlFilter, NestedFilter};
pub use graphql::GraphQlRequest;

/// Split a dotted field path into `(base path, field within it)`.
///
/// Returns `None` for non-nested fields.
pub fn split_nested(field: &str) -> Option<(&str, &str)> {
    field.split_once('.')
}

/// Base path of a field: the segment before the first dot, or the field itself.
pub fn base_path(field: &str) -> &str {
    split_nested(field).map_or(field, |(path, _)| path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn split_nested_uses_first_dot() {
        assert_eq!(split_nested("a.b"), Some(("a", "b")));
        assert_eq!(split_nested("a.b.c"), Some(("a", "b.c")));
        assert_eq!(split_nested("a"), None);
    }

    #[test]
    fn base_path_of_plain_field_is_itself() {
        assert_eq!(base_path("project_id"), "project_id");
        assert_eq!(base_path("visit.label"), "visit");
    }
}
