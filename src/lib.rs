// src/lib.rs
//! Job posting aggregation core: concurrent source adapters, bulk and
//! incremental aggregation, deduplication, and a profile-driven
//! filter/scoring pipeline.

pub mod analyze;
pub mod dedup;
pub mod filter;
pub mod ingest;
pub mod metrics;
pub mod profile;
pub mod record;

// ---- Re-exports for stable public API ----
pub use crate::dedup::{dedup, Deduplicator};
pub use crate::filter::{Filter, Pipeline, RecordFilter};
pub use crate::ingest::error::{AggregateError, SourceError};
pub use crate::ingest::incremental::{
    DoneSignal, ExecutionMode, IncrementalAggregator, RunState, RunStreams, RunSummary,
};
pub use crate::ingest::progress::{ProgressEvent, SourceStatus};
pub use crate::ingest::types::SourceAdapter;
pub use crate::ingest::{fetch_all, AggregateOutcome};
pub use crate::profile::{compile, CompiledProfile, Profile};
pub use crate::record::Record;
