//! Library error types.

use thiserror::Error;

use crate::query::CompileError;
use crate::sections::SectionError;

/// Errors surfaced to callers of the backend-facing operations.
#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Section(#[from] SectionError),

    /// The backend answered without the requested data.
    #[error("error querying backend{}", format_messages(.messages))]
    BackendQuery { messages: Vec<String> },

    #[error("backend request failed")]
    Transport(#[from] reqwest::Error),

    #[error("malformed backend response: {0}")]
    Decode(String),

    #[error("invalid backend url")]
    Url(#[from] url::ParseError),
}

impl ExplorerError {
    /// Build a backend query error from the `errors` array of a response body.
    pub fn from_response_errors(body: &serde_json::Value) -> Self {
        let messages = body
            .get("errors")
            .and_then(|errors| errors.as_array())
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        ExplorerError::BackendQuery { messages }
    }

    /// Whether the caller may retry the request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExplorerError::BackendQuery { .. } | ExplorerError::Transport(_)
        )
    }
}

fn format_messages(messages: &[String]) -> String {
    match messages.first() {
        Some(first) => format!(": {first}"),
        None => String::new(),
    }
}

/// Result type alias using ExplorerError.
pub type ExplorerResult<T> = Result<T, ExplorerError>;
