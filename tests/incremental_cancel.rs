// tests/incremental_cancel.rs
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use job_stream_aggregator::ingest::config::AggregatorSettings;
use job_stream_aggregator::{
    AggregateError, ExecutionMode, IncrementalAggregator, ProgressEvent, Record, RunState,
    SourceAdapter, SourceStatus,
};

struct Board(&'static str, usize);

#[async_trait]
impl SourceAdapter for Board {
    async fn fetch(&self) -> Result<Vec<Record>> {
        Ok((0..self.1)
            .map(|i| Record::new(self.0, &i.to_string(), "Rust Dev"))
            .collect())
    }
    fn name(&self) -> &str {
        self.0
    }
}

struct Hanging(&'static str);

#[async_trait]
impl SourceAdapter for Hanging {
    async fn fetch(&self) -> Result<Vec<Record>> {
        std::future::pending::<()>().await;
        Ok(vec![])
    }
    fn name(&self) -> &str {
        self.0
    }
}

fn terminal_of<'a>(progress: &'a [ProgressEvent], source: &str) -> &'a ProgressEvent {
    progress
        .iter()
        .filter(|p| p.source == source && p.status.is_terminal())
        .last()
        .unwrap_or_else(|| panic!("no terminal event for {source}"))
}

#[tokio::test]
async fn cancel_before_any_source_completes() {
    let agg = IncrementalAggregator::new(
        vec![Arc::new(Hanging("h1")), Arc::new(Hanging("h2"))],
        AggregatorSettings::default(),
    );
    let mut streams = agg.start().unwrap();
    agg.stop();

    let mut emitted = 0;
    while streams.records.recv().await.is_some() {
        emitted += 1;
    }
    assert_eq!(emitted, 0);

    let mut progress = Vec::new();
    while let Some(p) = streams.progress.recv().await {
        progress.push(p);
    }
    assert_eq!(terminal_of(&progress, "h1").status, SourceStatus::Cancelled);
    assert_eq!(terminal_of(&progress, "h2").status, SourceStatus::Cancelled);
    // cancellation is not an error
    assert!(streams.errors.recv().await.is_none());

    assert_eq!(agg.done().wait().await, RunState::Cancelled);
    let summary = agg.summary().unwrap();
    assert_eq!(summary.cancelled(), 2);
    assert!(summary.total_failure().is_none());
}

#[tokio::test]
async fn stop_mid_run_keeps_emitted_records() {
    let agg = IncrementalAggregator::new(
        vec![
            Arc::new(Board("first", 2)),
            Arc::new(Hanging("second")),
            Arc::new(Board("third", 1)),
        ],
        AggregatorSettings::default(),
    );
    let mut streams = agg.start().unwrap();

    // wait until the second source is in flight
    let mut progress = Vec::new();
    while let Some(p) = streams.progress.recv().await {
        let in_flight = p.source == "second" && p.status == SourceStatus::InProgress;
        progress.push(p);
        if in_flight {
            break;
        }
    }
    agg.stop();

    let mut records = Vec::new();
    while let Some(r) = streams.records.recv().await {
        records.push(r);
    }
    while let Some(p) = streams.progress.recv().await {
        progress.push(p);
    }

    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.source() == "first"));
    assert_eq!(terminal_of(&progress, "first").status, SourceStatus::Completed);
    assert_eq!(terminal_of(&progress, "second").status, SourceStatus::Cancelled);
    assert_eq!(terminal_of(&progress, "third").status, SourceStatus::Cancelled);
    // the third source never started
    assert!(!progress
        .iter()
        .any(|p| p.source == "third" && p.status == SourceStatus::InProgress));
    assert_eq!(agg.done().wait().await, RunState::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn run_deadline_behaves_like_stop() {
    let settings = AggregatorSettings {
        per_source_timeout: Duration::from_secs(60),
        run_deadline: Duration::from_secs(1),
        ..AggregatorSettings::default()
    };
    let agg = IncrementalAggregator::new(vec![Arc::new(Hanging("slow"))], settings);
    let mut streams = agg.start().unwrap();

    let t0 = tokio::time::Instant::now();
    assert!(streams.records.recv().await.is_none());
    assert!(t0.elapsed() < Duration::from_secs(60));
    let mut last = None;
    while let Some(p) = streams.progress.recv().await {
        last = Some(p);
    }
    assert_eq!(last.unwrap().status, SourceStatus::Cancelled);
    assert_eq!(agg.done().wait().await, RunState::Cancelled);
}

#[tokio::test]
async fn parallel_stop_aborts_in_flight_sources() {
    let settings = AggregatorSettings {
        mode: ExecutionMode::Parallel,
        ..AggregatorSettings::default()
    };
    let agg = IncrementalAggregator::new(
        vec![Arc::new(Hanging("p1")), Arc::new(Hanging("p2"))],
        settings,
    );
    let mut streams = agg.start().unwrap();
    agg.stop();
    while streams.progress.recv().await.is_some() {}
    assert_eq!(agg.done().wait().await, RunState::Cancelled);
    assert_eq!(agg.summary().unwrap().cancelled(), 2);
}

#[tokio::test]
async fn stop_on_idle_and_restart_rules() {
    let agg = IncrementalAggregator::new(vec![Arc::new(Board("a", 1))], AggregatorSettings::default());
    assert_eq!(agg.state(), RunState::Idle);
    assert!(!agg.done().is_done());
    agg.stop();
    assert_eq!(agg.state(), RunState::Cancelled);
    assert!(matches!(
        agg.start(),
        Err(AggregateError::InvalidState {
            state: RunState::Cancelled
        })
    ));
    // stopping again is harmless
    agg.stop();
    assert_eq!(agg.state(), RunState::Cancelled);
}

#[tokio::test]
async fn done_signal_is_selectable() {
    let agg = IncrementalAggregator::new(vec![Arc::new(Hanging("h"))], AggregatorSettings::default());
    let done = agg.done();
    let _streams = agg.start().unwrap();

    let stopper = done.clone();
    tokio::select! {
        _ = stopper.wait() => panic!("run cannot finish on its own"),
        _ = tokio::time::sleep(Duration::from_millis(50)) => agg.stop(),
    }
    let state = tokio::time::timeout(Duration::from_secs(5), done.wait())
        .await
        .expect("done fires after stop");
    assert_eq!(state, RunState::Cancelled);
    assert!(done.is_done());
}
