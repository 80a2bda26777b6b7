//! Sifter core library.
//!
//! Compiles per-field filter selections into backend query filters and
//! reconciles the aggregation histograms the backend returns into stable
//! option lists for filter widgets.
//!
//! The pure pieces (`query`, `filter::merge`, `aggs`, `sections`) hold no
//! state. `session` wires them to an [`backend::ExplorerBackend`] and owns
//! the per-session request generation and aggregation baseline.

pub mod access;
pub mod aggs;
pub mod backend;
pub mod config;
pub mod error;
pub mod filter;
pub mod query;
pub mod sections;
pub mod session;

pub use error::{ExplorerError, ExplorerResult};
