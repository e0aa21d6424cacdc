// src/ingest/scheduler.rs
use anyhow::{Context, Result};
use metrics::{counter, gauge};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::analyze::ContentScanner;
use crate::dedup::dedup;
use crate::ingest::config::AggregatorSettings;
use crate::ingest::error::{AggregateError, SourceError};
use crate::ingest::sink::RecordSink;
use crate::ingest::types::SourceAdapter;
use crate::ingest::{ensure_metrics_described, fetch_all};
use crate::profile::{compiler::compile_with, CompiledProfile, HotReloadProfile};

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub interval_secs: u64,
}

/// Counters of one bulk pipeline pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub total_sources: usize,
    pub succeeded_sources: usize,
    pub fetched: usize,
    pub duplicates: usize,
    pub filtered: usize,
    pub kept: usize,
    /// Ids the sink had not seen before.
    pub stored_new: usize,
    #[serde(skip)]
    pub failures: Vec<SourceError>,
}

impl PipelineReport {
    pub fn failed_sources(&self) -> Vec<&str> {
        self.failures.iter().map(|e| e.source_name()).collect()
    }

    pub fn total_failure(&self) -> Option<AggregateError> {
        if self.total_sources == 0 || self.succeeded_sources > 0 {
            return None;
        }
        self.failures
            .last()
            .cloned()
            .map(|last| AggregateError::AllSourcesFailed {
                total: self.total_sources,
                last,
            })
    }
}

/// Bulk aggregate → dedup → enrich/score/filter → sink upsert.
///
/// Source failures are reported in the returned report; only a sink error
/// fails the pass.
pub async fn run_pipeline_once(
    adapters: &[Arc<dyn SourceAdapter>],
    profile: &CompiledProfile,
    settings: &AggregatorSettings,
    sink: &dyn RecordSink,
) -> Result<PipelineReport> {
    ensure_metrics_described();

    let outcome = fetch_all(adapters, Some(settings.per_source_timeout)).await;
    let fetched = outcome.records.len();
    let unique = dedup(outcome.records);
    let duplicates = fetched - unique.len();
    let before_filter = unique.len();
    let kept = profile.process_batch(unique);
    let filtered = before_filter - kept.len();

    let stored_new = sink
        .upsert(&kept)
        .await
        .context("sink upsert failed")?;

    counter!("aggregator_dedup_total").increment(duplicates as u64);
    counter!("aggregator_records_filtered_total").increment(filtered as u64);
    counter!("aggregator_records_emitted_total").increment(kept.len() as u64);
    gauge!("aggregator_last_run_ts").set(chrono::Utc::now().timestamp() as f64);

    let report = PipelineReport {
        total_sources: outcome.total,
        succeeded_sources: outcome.succeeded,
        fetched,
        duplicates,
        filtered,
        kept: kept.len(),
        stored_new,
        failures: outcome.failures,
    };
    tracing::info!(
        target: "ingest",
        fetched = report.fetched,
        kept = report.kept,
        filtered = report.filtered,
        dedup = report.duplicates,
        stored_new = report.stored_new,
        failed = report.failures.len(),
        "pipeline pass"
    );
    if let Some(e) = report.total_failure() {
        tracing::warn!(target: "ingest", error = %e, "every source failed");
    }
    Ok(report)
}

/// Repeat `run_pipeline_once` on an interval. Every tick recompiles the current
/// profile snapshot, so edits to the profile file apply from the next tick on.
pub fn spawn_scheduler(
    cfg: SchedulerCfg,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    profile: Arc<HotReloadProfile>,
    scanner: ContentScanner,
    settings: AggregatorSettings,
    sink: Arc<dyn RecordSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(cfg.interval_secs.max(1)));
        loop {
            ticker.tick().await;
            let compiled = compile_with(profile.current(), scanner.clone());
            match run_pipeline_once(&adapters, &compiled, &settings, sink.as_ref()).await {
                Ok(_) => counter!("aggregator_scheduler_ticks_total").increment(1),
                Err(e) => tracing::warn!(target: "ingest", error = ?e, "scheduled pipeline pass failed"),
            }
        }
    })
}
