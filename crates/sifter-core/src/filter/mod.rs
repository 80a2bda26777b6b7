//! Filter selection model.
//!
//! This module provides:
//! - FilterState / FilterEntry: the user's per-field selections
//! - merge_filters: folding an admin pre-filter into a user filter

mod merge;
pub mod types;

pub use merge::merge_filters;
pub use types::{AnchoredFilter, CombineMode, FilterEntry, FilterState, OptionFilter, RangeFilter};
