//! Incremental aggregator: streams records and progress while sources run.
//!
//! States: `Idle → Running → {Finished, Cancelled}`. A run publishes a
//! `Pending` event for every source up front, then per source an
//! `InProgress` event, the source's surviving records, and one terminal
//! event (`Completed`, `Failed` or `Cancelled`). A source's records and its
//! terminal event are never interleaved with another source's output, in
//! either execution mode.
//!
//! When the run ends the output channels close in a fixed order (records,
//! errors, progress), then the state turns terminal and `DoneSignal` fires.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use super::cancel::CancelSignal;
use super::config::AggregatorSettings;
use super::error::{AggregateError, SourceError};
use super::progress::{ProgressEvent, SourceStatus};
use super::types::{Record, SourceAdapter};
use super::{call_adapter, ensure_metrics_described};
use crate::dedup::Deduplicator;
use crate::profile::CompiledProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Finished,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Finished | RunState::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One source at a time, in configuration order.
    #[default]
    Sequential,
    /// All sources fetched concurrently; output is still emitted per source.
    Parallel,
}

/// Receivers handed to the consumer by `start`. None of the three applies
/// back-pressure to the run, so they may be drained in any order.
#[derive(Debug)]
pub struct RunStreams {
    pub records: mpsc::UnboundedReceiver<Record>,
    pub errors: mpsc::UnboundedReceiver<SourceError>,
    pub progress: mpsc::UnboundedReceiver<ProgressEvent>,
}

/// One-shot completion signal. Clone freely; every clone observes the same run.
#[derive(Debug, Clone)]
pub struct DoneSignal {
    rx: watch::Receiver<RunState>,
}

impl DoneSignal {
    pub fn is_done(&self) -> bool {
        self.rx.borrow().is_terminal()
    }

    /// Resolves with the terminal state once the run has ended.
    pub async fn wait(&self) -> RunState {
        let mut rx = self.rx.clone();
        let reached = match rx.wait_for(|s| s.is_terminal()).await {
            Ok(s) => Some(*s),
            // aggregator dropped before the run ended
            Err(_) => None,
        };
        reached.unwrap_or_else(|| *rx.borrow())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    pub name: String,
    pub status: SourceStatus,
    pub found: usize,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What happened in a finished run, per source and in total.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub sources: Vec<SourceSummary>,
    pub failures: Vec<SourceError>,
    pub emitted: usize,
    pub filtered: usize,
    pub duplicates: usize,
    pub elapsed_ms: u64,
}

impl RunSummary {
    fn count(&self, status: SourceStatus) -> usize {
        self.sources.iter().filter(|s| s.status == status).count()
    }

    pub fn completed(&self) -> usize {
        self.count(SourceStatus::Completed)
    }

    pub fn failed(&self) -> usize {
        self.count(SourceStatus::Failed)
    }

    pub fn cancelled(&self) -> usize {
        self.count(SourceStatus::Cancelled)
    }

    /// `AllSourcesFailed` when every source failed. Cancellation never counts.
    pub fn total_failure(&self) -> Option<AggregateError> {
        let total = self.sources.len();
        if total == 0 || self.failed() != total {
            return None;
        }
        self.failures
            .last()
            .cloned()
            .map(|last| AggregateError::AllSourcesFailed { total, last })
    }
}

struct Shared {
    state: watch::Sender<RunState>,
    cancel: CancelSignal,
    summary: RwLock<Option<RunSummary>>,
}

pub struct IncrementalAggregator {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    settings: AggregatorSettings,
    profile: Option<Arc<CompiledProfile>>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for IncrementalAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.adapters.iter().map(|a| a.name()).collect();
        f.debug_struct("IncrementalAggregator")
            .field("sources", &names)
            .field("settings", &self.settings)
            .field("state", &self.state())
            .finish()
    }
}

impl IncrementalAggregator {
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>, settings: AggregatorSettings) -> Self {
        let (state, _rx) = watch::channel(RunState::Idle);
        Self {
            adapters,
            settings,
            profile: None,
            shared: Arc::new(Shared {
                state,
                cancel: CancelSignal::new(),
                summary: RwLock::new(None),
            }),
        }
    }

    /// Score and filter every record with this compiled profile before emission.
    /// Without one, records pass through enrichment-free and only deduplicated.
    pub fn with_profile(mut self, profile: CompiledProfile) -> Self {
        self.profile = Some(Arc::new(profile));
        self
    }

    pub fn state(&self) -> RunState {
        *self.shared.state.borrow()
    }

    pub fn done(&self) -> DoneSignal {
        DoneSignal {
            rx: self.shared.state.subscribe(),
        }
    }

    /// Available once the run is terminal. `None` for a run stopped while idle.
    pub fn summary(&self) -> Option<RunSummary> {
        self.shared
            .summary
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Begin the run. Only valid from `Idle`; must be called inside a Tokio runtime.
    pub fn start(&self) -> Result<RunStreams, AggregateError> {
        let started = self.shared.state.send_if_modified(|s| {
            if *s == RunState::Idle {
                *s = RunState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(AggregateError::InvalidState {
                state: self.state(),
            });
        }
        ensure_metrics_described();

        let (records_tx, records) = mpsc::unbounded_channel();
        let (errors_tx, errors) = mpsc::unbounded_channel();
        let (progress_tx, progress) = mpsc::unbounded_channel();

        let total = self.adapters.len();
        for (idx, a) in self.adapters.iter().enumerate() {
            let _ = progress_tx.send(ProgressEvent::new(
                a.name(),
                idx + 1,
                total,
                SourceStatus::Pending,
            ));
        }

        let run = Run {
            adapters: self.adapters.clone(),
            settings: self.settings.clone(),
            profile: self.profile.clone(),
            shared: Arc::clone(&self.shared),
            records_tx: Some(records_tx),
            errors_tx: Some(errors_tx),
            progress_tx: Some(progress_tx),
            dedup: Deduplicator::new(),
            statuses: vec![None; total],
            summary: RunSummary::default(),
        };
        tracing::info!(target: "aggregator", sources = total, mode = ?self.settings.mode, "run started");
        tokio::spawn(run.drive());

        Ok(RunStreams {
            records,
            errors,
            progress,
        })
    }

    /// Cancel the run. From `Idle` the aggregator goes straight to `Cancelled`;
    /// on a terminal run this is a no-op. Returns immediately; use `done()` to
    /// wait for the streams to close.
    pub fn stop(&self) {
        let was_idle = self.shared.state.send_if_modified(|s| {
            if *s == RunState::Idle {
                *s = RunState::Cancelled;
                true
            } else {
                false
            }
        });
        self.shared.cancel.cancel();
        if was_idle {
            tracing::info!(target: "aggregator", "stopped before start");
        }
    }
}

/// Outcome of emitting one source's records.
enum Emitted {
    All(usize),
    Interrupted(usize),
}

struct Run {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    settings: AggregatorSettings,
    profile: Option<Arc<CompiledProfile>>,
    shared: Arc<Shared>,
    records_tx: Option<mpsc::UnboundedSender<Record>>,
    errors_tx: Option<mpsc::UnboundedSender<SourceError>>,
    progress_tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
    dedup: Deduplicator,
    statuses: Vec<Option<SourceSummary>>,
    summary: RunSummary,
}

impl Run {
    async fn drive(mut self) {
        let t0 = Instant::now();
        let deadline = {
            let cancel = self.shared.cancel.clone();
            let after = self.settings.run_deadline;
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                if !cancel.is_cancelled() {
                    tracing::warn!(target: "aggregator", deadline_ms = after.as_millis() as u64, "run deadline exceeded");
                    cancel.cancel();
                }
            })
        };

        let interrupted = match self.settings.mode {
            ExecutionMode::Sequential => self.run_sequential().await,
            ExecutionMode::Parallel => self.run_parallel().await,
        };
        deadline.abort();

        // sources that never reached a terminal status
        let total = self.adapters.len();
        for idx in 0..total {
            if self.statuses[idx].is_none() {
                let name = self.adapters[idx].name().to_string();
                self.finish(idx, &name, SourceStatus::Cancelled, 0, Duration::ZERO, None);
            }
        }

        self.summary.sources = self.statuses.drain(..).flatten().collect();
        self.summary.elapsed_ms = t0.elapsed().as_millis() as u64;
        let final_state = if interrupted || self.summary.cancelled() > 0 {
            RunState::Cancelled
        } else {
            RunState::Finished
        };

        // close order: records, errors, progress
        drop(self.records_tx.take());
        drop(self.errors_tx.take());
        drop(self.progress_tx.take());

        gauge!("aggregator_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
        tracing::info!(
            target: "aggregator",
            state = ?final_state,
            completed = self.summary.completed(),
            failed = self.summary.failed(),
            cancelled = self.summary.cancelled(),
            emitted = self.summary.emitted,
            unique_ids = self.dedup.seen(),
            elapsed_ms = self.summary.elapsed_ms,
            "run finished"
        );
        *self
            .shared
            .summary
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(self.summary);
        self.shared.state.send_replace(final_state);
    }

    /// Returns true when the loop was cut short by cancellation.
    async fn run_sequential(&mut self) -> bool {
        let cancel = self.shared.cancel.clone();
        let timeout = Some(self.settings.per_source_timeout);
        let adapters = self.adapters.clone();
        for (idx, adapter) in adapters.iter().enumerate() {
            if cancel.is_cancelled() {
                return true;
            }
            let name = adapter.name().to_string();
            self.progress(self.event(idx, &name, SourceStatus::InProgress));

            let started = Instant::now();
            let res = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                r = call_adapter(adapter.as_ref(), timeout) => Some(r),
            };
            match res {
                Some(r) => {
                    if self.settle(idx, &name, r, started).await {
                        return true;
                    }
                }
                None => {
                    tracing::info!(target: "aggregator", source = %name, "source abandoned on cancel");
                    self.finish(idx, &name, SourceStatus::Cancelled, 0, started.elapsed(), None);
                    return true;
                }
            }
        }
        false
    }

    async fn run_parallel(&mut self) -> bool {
        let cancel = self.shared.cancel.clone();
        let timeout = Some(self.settings.per_source_timeout);
        let mut set = JoinSet::new();
        let mut task_index = HashMap::new();
        let started = Instant::now();

        if cancel.is_cancelled() {
            return true;
        }
        for (idx, adapter) in self.adapters.iter().enumerate() {
            let name = adapter.name().to_string();
            self.progress(self.event(idx, &name, SourceStatus::InProgress));
            let adapter = Arc::clone(adapter);
            let handle = set.spawn(async move {
                let t = Instant::now();
                let r = call_adapter(adapter.as_ref(), timeout).await;
                (idx, t, r)
            });
            task_index.insert(handle.id(), idx);
        }

        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    set.abort_all();
                    return true;
                }
                j = set.join_next_with_id() => j,
            };
            let Some(joined) = joined else {
                return false;
            };
            let (idx, t, res) = match joined {
                Ok((_id, out)) => out,
                Err(join_err) => {
                    let Some(&idx) = task_index.get(&join_err.id()) else {
                        continue;
                    };
                    let name = self.adapters[idx].name().to_string();
                    (idx, started, Err(SourceError::Aborted { name }))
                }
            };
            let name = self.adapters[idx].name().to_string();
            if self.settle(idx, &name, res, t).await {
                set.abort_all();
                return true;
            }
        }
    }

    /// Emit one source's result and its terminal event. Returns true when
    /// cancellation interrupted the emission.
    async fn settle(
        &mut self,
        idx: usize,
        name: &str,
        res: Result<Vec<Record>, SourceError>,
        started: Instant,
    ) -> bool {
        let fetched_in = started.elapsed();
        counter!("aggregator_source_runs_total").increment(1);
        histogram!("aggregator_source_fetch_ms").record(fetched_in.as_secs_f64() * 1_000.0);
        match res {
            Ok(records) => match self.emit(name, records).await {
                Emitted::All(found) => {
                    tracing::info!(target: "aggregator", source = %name, found, elapsed_ms = started.elapsed().as_millis() as u64, "source completed");
                    self.finish(idx, name, SourceStatus::Completed, found, started.elapsed(), None);
                    false
                }
                Emitted::Interrupted(found) => {
                    self.finish(idx, name, SourceStatus::Cancelled, found, started.elapsed(), None);
                    true
                }
            },
            Err(e) => {
                tracing::warn!(target: "aggregator", source = %name, error = %e, "source failed");
                counter!("aggregator_source_failures_total", "source" => name.to_string())
                    .increment(1);
                if let Some(tx) = &self.errors_tx {
                    let _ = tx.send(e.clone());
                }
                let msg = e.to_string();
                self.summary.failures.push(e);
                self.finish(idx, name, SourceStatus::Failed, 0, started.elapsed(), Some(msg));
                false
            }
        }
    }

    /// Score, filter and dedup each record, streaming survivors in adapter order.
    async fn emit(&mut self, name: &str, records: Vec<Record>) -> Emitted {
        let cancel = self.shared.cancel.clone();
        let mut found = 0usize;
        for record in records {
            let kept = match &self.profile {
                Some(p) => p.process(record),
                None => Some(record),
            };
            let Some(record) = kept else {
                self.summary.filtered += 1;
                counter!("aggregator_records_filtered_total").increment(1);
                continue;
            };
            if !self.dedup.admit(&record) {
                self.summary.duplicates += 1;
                counter!("aggregator_dedup_total").increment(1);
                continue;
            }
            if cancel.is_cancelled() {
                return Emitted::Interrupted(found);
            }
            let Some(tx) = &self.records_tx else {
                break;
            };
            if tx.send(record).is_err() {
                tracing::debug!(target: "aggregator", source = %name, "record receiver dropped");
                continue;
            }
            found += 1;
            self.summary.emitted += 1;
            counter!("aggregator_records_emitted_total").increment(1);
        }
        Emitted::All(found)
    }

    fn event(&self, idx: usize, name: &str, status: SourceStatus) -> ProgressEvent {
        ProgressEvent::new(name, idx + 1, self.adapters.len(), status)
    }

    fn progress(&self, ev: ProgressEvent) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.send(ev);
        }
    }

    fn finish(
        &mut self,
        idx: usize,
        name: &str,
        status: SourceStatus,
        found: usize,
        elapsed: Duration,
        error: Option<String>,
    ) {
        let elapsed_ms = elapsed.as_millis() as u64;
        let mut ev = self
            .event(idx, name, status)
            .with_found(found)
            .with_elapsed_ms(elapsed_ms);
        if let Some(e) = &error {
            ev = ev.with_error(e.clone());
        }
        self.progress(ev);
        self.statuses[idx] = Some(SourceSummary {
            name: name.to_string(),
            status,
            found,
            elapsed_ms,
            error,
        });
    }
}
