//! Progress events: immutable per-source status snapshots of a run.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl SourceStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SourceStatus::Completed | SourceStatus::Failed | SourceStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub source: String,
    /// Records emitted for this source so far (post-filter for `Completed`).
    pub found: usize,
    /// 1-based position in the configured source order.
    pub position: usize,
    pub total: usize,
    pub elapsed_ms: u64,
    pub status: SourceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    pub fn new(source: &str, position: usize, total: usize, status: SourceStatus) -> Self {
        Self {
            source: source.to_string(),
            found: 0,
            position,
            total,
            elapsed_ms: 0,
            status,
            error: None,
        }
    }

    pub fn with_found(mut self, found: usize) -> Self {
        self.found = found;
        self
    }

    pub fn with_elapsed_ms(mut self, ms: u64) -> Self {
        self.elapsed_ms = ms;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}
