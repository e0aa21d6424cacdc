// src/ingest/types.rs
use anyhow::Result;

pub use crate::record::Record;

/// One external data provider (job board API, RSS feed, scraped page).
///
/// `fetch` is a single-shot operation. It must be safe to run concurrently
/// with other adapters; cancellation happens by dropping the returned future
/// (the aggregators wrap every call in a timeout and a cancel select).
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Record>>;
    fn name(&self) -> &str;
}
