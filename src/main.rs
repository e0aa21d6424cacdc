//! Job stream aggregator binary.
//!
//! One-shot mode (default): run the incremental aggregator over the configured
//! sources, print surviving records as JSON lines on stdout, log progress on
//! stderr. Ctrl-C stops the run cleanly.
//!
//! Scheduler mode (`AGG_SCHEDULE_SECS` set): repeat bulk pipeline passes into
//! an in-memory store until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use job_stream_aggregator::analyze::flags::load_flag_rules_default;
use job_stream_aggregator::analyze::ContentScanner;
use job_stream_aggregator::ingest::config::{build_adapters, load_sources_default, AggregatorSettings};
use job_stream_aggregator::ingest::scheduler::{spawn_scheduler, SchedulerCfg};
use job_stream_aggregator::ingest::sink::MemorySink;
use job_stream_aggregator::metrics::Metrics;
use job_stream_aggregator::profile::compiler::compile_with;
use job_stream_aggregator::profile::HotReloadProfile;
use job_stream_aggregator::IncrementalAggregator;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("aggregator=info,ingest=info,profile=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    // stdout carries records; logs go to stderr
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

async fn serve_metrics(addr: &str) -> Result<()> {
    let metrics = Metrics::init()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding metrics listener on {addr}"))?;
    tracing::info!(target: "aggregator", %addr, "serving /metrics");
    let router = metrics.router();
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::warn!(error = ?e, "metrics server stopped");
        }
    });
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    if let Ok(addr) = std::env::var("METRICS_ADDR") {
        serve_metrics(&addr).await?;
    }

    let specs = load_sources_default().context("loading sources")?;
    if specs.is_empty() {
        tracing::warn!(target: "aggregator", "no sources configured");
    }
    let adapters = build_adapters(&specs)?;
    let profile = Arc::new(HotReloadProfile::new(None));
    tracing::info!(target: "profile", path = %profile.path().display(), "profile source");
    let scanner = ContentScanner::new(&load_flag_rules_default().context("loading flag rules")?);
    let settings = AggregatorSettings::from_env();

    let schedule_secs = std::env::var("AGG_SCHEDULE_SECS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|n| *n > 0);

    if let Some(interval_secs) = schedule_secs {
        let sink = Arc::new(MemorySink::new());
        let handle = spawn_scheduler(
            SchedulerCfg { interval_secs },
            adapters,
            profile,
            scanner,
            settings,
            sink.clone(),
        );
        tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
        handle.abort();
        tracing::info!(target: "ingest", stored = sink.len(), "scheduler stopped");
        return Ok(());
    }

    let compiled = compile_with(profile.current(), scanner);
    let agg = IncrementalAggregator::new(adapters, settings).with_profile(compiled);
    let mut streams = agg.start()?;

    let (mut records_open, mut errors_open, mut progress_open) = (true, true, true);
    let mut stopping = false;
    while records_open || errors_open || progress_open {
        tokio::select! {
            r = streams.records.recv(), if records_open => match r {
                Some(rec) => println!("{}", serde_json::to_string(&rec)?),
                None => records_open = false,
            },
            e = streams.errors.recv(), if errors_open => match e {
                Some(e) => tracing::warn!(target: "aggregator", error = %e, "source error"),
                None => errors_open = false,
            },
            p = streams.progress.recv(), if progress_open => match p {
                Some(ev) => tracing::info!(
                    target: "aggregator",
                    source = %ev.source,
                    status = ?ev.status,
                    found = ev.found,
                    position = ev.position,
                    total = ev.total,
                    elapsed_ms = ev.elapsed_ms,
                    "progress"
                ),
                None => progress_open = false,
            },
            _ = tokio::signal::ctrl_c(), if !stopping => {
                tracing::info!(target: "aggregator", "ctrl-c: stopping run");
                agg.stop();
                stopping = true;
            }
        }
    }

    let state = agg.done().wait().await;
    if let Some(summary) = agg.summary() {
        tracing::info!(
            target: "aggregator",
            state = ?state,
            emitted = summary.emitted,
            failed = summary.failed(),
            "done"
        );
        if let Some(e) = summary.total_failure() {
            return Err(e.into());
        }
    }
    Ok(())
}
