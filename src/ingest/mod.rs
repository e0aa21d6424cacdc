// src/ingest/mod.rs
pub mod cancel;
pub mod config;
pub mod error;
pub mod incremental;
pub mod progress;
pub mod providers;
pub mod scheduler;
pub mod sink;
pub mod types;

use crate::ingest::error::{AggregateError, SourceError};
use crate::ingest::types::{Record, SourceAdapter};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

pub const MAX_TITLE_CHARS: usize = 300;
pub const MAX_FIELD_CHARS: usize = 200;
pub const MAX_DESCRIPTION_CHARS: usize = 5000;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "aggregator_source_runs_total",
            "Source adapter invocations."
        );
        describe_counter!(
            "aggregator_source_failures_total",
            "Source adapter failures and timeouts."
        );
        describe_counter!(
            "aggregator_records_emitted_total",
            "Records that passed the pipeline and were emitted."
        );
        describe_counter!(
            "aggregator_records_filtered_total",
            "Records dropped by the filter pipeline."
        );
        describe_counter!(
            "aggregator_dedup_total",
            "Records dropped as duplicate ids."
        );
        describe_counter!(
            "aggregator_scheduler_ticks_total",
            "Completed scheduled pipeline passes."
        );
        describe_histogram!(
            "aggregator_source_fetch_ms",
            "Source fetch time in milliseconds."
        );
        describe_gauge!(
            "aggregator_last_run_ts",
            "Unix ts when an aggregation run last finished."
        );
    });
}

/// Normalize text: decode entities, strip tags, collapse whitespace, cap length.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags (keep a space so adjacent blocks don't glue together)
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
    }
    out
}

/// First e-mail address in `text`, if any.
pub fn extract_email(text: &str) -> Option<String> {
    static RE_EMAIL: OnceCell<regex::Regex> = OnceCell::new();
    let re = RE_EMAIL.get_or_init(|| {
        regex::Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b").expect("email regex")
    });
    re.find(text).map(|m| m.as_str().to_ascii_lowercase())
}

/// Clean every descriptive field in place; fill `contact_email` from the
/// description when the adapter did not provide one.
pub fn sanitize(r: &mut Record) {
    r.title = normalize_text(&r.title, MAX_TITLE_CHARS);
    r.company = normalize_text(&r.company, MAX_FIELD_CHARS);
    r.location = normalize_text(&r.location, MAX_FIELD_CHARS);
    r.description = normalize_text(&r.description, MAX_DESCRIPTION_CHARS);
    r.url = r.url.trim().to_string();
    for opt in [&mut r.salary, &mut r.employment_type, &mut r.contact_email] {
        if let Some(v) = opt.as_deref() {
            let t = normalize_text(v, MAX_FIELD_CHARS);
            *opt = if t.is_empty() { None } else { Some(t) };
        }
    }
    if !r.has_contact_email() {
        r.contact_email = extract_email(&r.description);
    }
}

/// Invoke one adapter, mapping errors and an optional timeout into `SourceError`.
pub(crate) async fn call_adapter(
    adapter: &dyn SourceAdapter,
    timeout: Option<Duration>,
) -> Result<Vec<Record>, SourceError> {
    let fut = adapter.fetch();
    let res = match timeout {
        Some(t) => match tokio::time::timeout(t, fut).await {
            Ok(r) => r,
            Err(_) => {
                return Err(SourceError::Timeout {
                    name: adapter.name().to_string(),
                    timeout_ms: t.as_millis() as u64,
                })
            }
        },
        None => fut.await,
    };
    res.map_err(|e| SourceError::failed(adapter.name(), &e))
}

/// Result of a bulk run: every success plus every failure.
#[derive(Debug, Clone, Default)]
pub struct AggregateOutcome {
    /// Successful outputs, grouped by source in configuration order.
    pub records: Vec<Record>,
    /// Failures in completion order.
    pub failures: Vec<SourceError>,
    pub succeeded: usize,
    pub total: usize,
}

impl AggregateOutcome {
    pub fn last_error(&self) -> Option<&SourceError> {
        self.failures.last()
    }

    pub fn all_failed(&self) -> bool {
        self.total > 0 && self.succeeded == 0
    }

    /// `Err` only when every source failed; partial results are always `Ok`.
    pub fn into_result(self) -> Result<Vec<Record>, AggregateError> {
        if self.all_failed() {
            if let Some(last) = self.failures.last().cloned() {
                return Err(AggregateError::AllSourcesFailed {
                    total: self.total,
                    last,
                });
            }
        }
        Ok(self.records)
    }
}

/// Run every adapter concurrently (one task each) and wait for all of them.
///
/// A failing or timed-out adapter never blocks or fails the others. Without
/// `per_source_timeout` a hanging adapter delays the whole batch. Dropping the
/// returned future aborts every still-running adapter task.
pub async fn fetch_all(
    adapters: &[Arc<dyn SourceAdapter>],
    per_source_timeout: Option<Duration>,
) -> AggregateOutcome {
    ensure_metrics_described();

    let total = adapters.len();
    let mut outcome = AggregateOutcome {
        total,
        ..AggregateOutcome::default()
    };
    if total == 0 {
        return outcome;
    }

    let mut set = JoinSet::new();
    let mut task_index = HashMap::with_capacity(total);
    for (idx, adapter) in adapters.iter().enumerate() {
        let adapter = Arc::clone(adapter);
        let handle = set.spawn(async move {
            let t0 = Instant::now();
            let res = call_adapter(adapter.as_ref(), per_source_timeout).await;
            (idx, t0.elapsed(), res)
        });
        task_index.insert(handle.id(), idx);
    }

    let mut slots: Vec<Option<Vec<Record>>> = vec![None; total];
    let mut reported = vec![false; total];
    while let Some(joined) = set.join_next_with_id().await {
        let (idx, elapsed, res) = match joined {
            Ok((_id, out)) => out,
            Err(join_err) => {
                let Some(&idx) = task_index.get(&join_err.id()) else {
                    continue;
                };
                let name = adapters[idx].name().to_string();
                tracing::warn!(target: "aggregator", source = %name, error = %join_err, "adapter task aborted");
                (idx, Duration::ZERO, Err(SourceError::Aborted { name }))
            }
        };
        reported[idx] = true;
        let name = adapters[idx].name().to_string();
        counter!("aggregator_source_runs_total").increment(1);
        histogram!("aggregator_source_fetch_ms").record(elapsed.as_secs_f64() * 1_000.0);
        match res {
            Ok(v) => {
                tracing::debug!(target: "aggregator", source = %name, found = v.len(), elapsed_ms = elapsed.as_millis() as u64, "source ok");
                outcome.succeeded += 1;
                slots[idx] = Some(v);
            }
            Err(e) => {
                tracing::warn!(target: "aggregator", source = %name, error = %e, "source failed");
                counter!("aggregator_source_failures_total", "source" => name).increment(1);
                outcome.failures.push(e);
            }
        }
    }

    // Tasks that vanished without a result (should not happen with JoinSet).
    for (idx, seen) in reported.iter().enumerate() {
        if !seen {
            outcome.failures.push(SourceError::Aborted {
                name: adapters[idx].name().to_string(),
            });
        }
    }

    outcome.records = slots.into_iter().flatten().flatten().collect();
    tracing::info!(
        target: "aggregator",
        total,
        succeeded = outcome.succeeded,
        failed = outcome.failures.len(),
        records = outcome.records.len(),
        "bulk aggregation finished"
    );
    outcome
}
