// tests/scheduler_run_once.rs
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use job_stream_aggregator::analyze::ContentScanner;
use job_stream_aggregator::ingest::config::AggregatorSettings;
use job_stream_aggregator::ingest::providers::{JsonApiAdapter, RssFeedAdapter};
use job_stream_aggregator::ingest::scheduler::{run_pipeline_once, spawn_scheduler, SchedulerCfg};
use job_stream_aggregator::ingest::sink::{MemorySink, RecordSink};
use job_stream_aggregator::profile::HotReloadProfile;
use job_stream_aggregator::{compile, AggregateError, Profile, Record, SourceAdapter};

const FEED: &str = include_str!("fixtures/jobs_rss.xml");
const API: &str = include_str!("fixtures/jobs_api.json");

struct Broken;

#[async_trait]
impl SourceAdapter for Broken {
    async fn fetch(&self) -> Result<Vec<Record>> {
        Err(anyhow!("dns failure"))
    }
    fn name(&self) -> &str {
        "broken"
    }
}

struct FailingSink;

#[async_trait]
impl RecordSink for FailingSink {
    async fn upsert(&self, _records: &[Record]) -> Result<usize> {
        Err(anyhow!("disk full"))
    }
}

fn adapters() -> Vec<Arc<dyn SourceAdapter>> {
    let api = JsonApiAdapter::from_fixture("api", API)
        .with_items_pointer("/data/jobs")
        .with_fields(job_stream_aggregator::ingest::providers::FieldMap {
            id: "slug".into(),
            title: "position".into(),
            company: "/org/name".into(),
            description: "body".into(),
            ..Default::default()
        });
    vec![
        Arc::new(RssFeedAdapter::from_fixture("rss", FEED)),
        Arc::new(api),
        Arc::new(Broken),
    ]
}

#[tokio::test]
async fn pipeline_pass_filters_and_stores() {
    let profile = Profile {
        keywords: vec!["rust".into()],
        exclude_flagged: true,
        ..Profile::default()
    };
    let sink = MemorySink::new();
    let report = run_pipeline_once(
        &adapters(),
        &compile(&profile),
        &AggregatorSettings::default(),
        &sink,
    )
    .await
    .unwrap();

    assert_eq!(report.total_sources, 3);
    assert_eq!(report.succeeded_sources, 2);
    assert_eq!(report.failed_sources(), vec!["broken"]);
    assert!(report.total_failure().is_none());
    // rss: 3 items, api: 2 titled items
    assert_eq!(report.fetched, 5);
    assert_eq!(report.kept, 2);
    assert_eq!(report.filtered, 3);
    assert_eq!(report.stored_new, 2);

    assert!(sink.get("rss:101").is_some());
    assert!(sink.get("api:rust-platform-1").is_some());
    let stored = sink.get("rss:101").unwrap();
    assert_eq!(stored.contact_email.as_deref(), Some("hiring@ferrous.example"));

    // second pass is idempotent for the store
    let again = run_pipeline_once(
        &adapters(),
        &compile(&profile),
        &AggregatorSettings::default(),
        &sink,
    )
    .await
    .unwrap();
    assert_eq!(again.stored_new, 0);
    assert_eq!(sink.len(), 2);
}

#[tokio::test]
async fn all_sources_failing_is_reported_not_thrown() {
    let sink = MemorySink::new();
    let only_broken: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(Broken)];
    let report = run_pipeline_once(
        &only_broken,
        &compile(&Profile::default()),
        &AggregatorSettings::default(),
        &sink,
    )
    .await
    .unwrap();
    assert_eq!(report.kept, 0);
    assert!(matches!(
        report.total_failure(),
        Some(AggregateError::AllSourcesFailed { total: 1, .. })
    ));
}

#[tokio::test]
async fn sink_errors_fail_the_pass() {
    let err = run_pipeline_once(
        &adapters(),
        &compile(&Profile::default()),
        &AggregatorSettings::default(),
        &FailingSink,
    )
    .await
    .unwrap_err();
    assert!(format!("{err:#}").contains("disk full"));
}

#[tokio::test(start_paused = true)]
async fn scheduler_ticks_into_the_sink() {
    let sink = Arc::new(MemorySink::new());
    let handle = spawn_scheduler(
        SchedulerCfg { interval_secs: 60 },
        adapters(),
        Arc::new(HotReloadProfile::fixed(Profile::default())),
        ContentScanner::default(),
        AggregatorSettings::default(),
        sink.clone(),
    );
    // first tick fires immediately
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(sink.len(), 5);
    handle.abort();
}
