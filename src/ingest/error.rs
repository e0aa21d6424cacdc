//! Error taxonomy of an aggregation run.
//!
//! Source failures are recovered locally (skip-and-continue) and only surface
//! as values; `AggregateError` is what reaches the caller. Cancellation is a
//! terminal status, never an error.

use thiserror::Error;

use super::incremental::RunState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("source `{name}` failed: {message}")]
    Failed { name: String, message: String },

    #[error("source `{name}` timed out after {timeout_ms}ms")]
    Timeout { name: String, timeout_ms: u64 },

    #[error("source `{name}` task aborted")]
    Aborted { name: String },
}

impl SourceError {
    /// Keeps the whole anyhow context chain in the message.
    pub fn failed(name: &str, err: &anyhow::Error) -> Self {
        SourceError::Failed {
            name: name.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub fn source_name(&self) -> &str {
        match self {
            SourceError::Failed { name, .. }
            | SourceError::Timeout { name, .. }
            | SourceError::Aborted { name } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    #[error("all {total} sources failed; last error: {last}")]
    AllSourcesFailed { total: usize, last: SourceError },

    #[error("aggregator cannot start from state {state:?}")]
    InvalidState { state: RunState },
}
