//! Profile compiler: turns a profile snapshot into a filter pipeline plus scorer.
//!
//! Compilation is pure (no I/O) and cheap, so callers recompile per run instead
//! of caching. The compiled value owns an `Arc` of the snapshot it was built
//! from; later edits to the profile never reach a running pipeline.

use std::sync::Arc;

use crate::analyze::{CompositeScorer, ContentScanner, Enricher};
use crate::filter::{Filter, Pipeline};
use crate::profile::Profile;
use crate::record::Record;

#[derive(Debug, Clone)]
pub struct CompiledProfile {
    profile: Arc<Profile>,
    pipeline: Pipeline,
    scorer: CompositeScorer,
    enricher: Enricher,
}

/// Compile with the built-in content scanner.
pub fn compile(profile: &Profile) -> CompiledProfile {
    compile_with(Arc::new(profile.clone()), ContentScanner::default())
}

pub fn compile_with(profile: Arc<Profile>, scanner: ContentScanner) -> CompiledProfile {
    let pipeline = build_pipeline(&profile);
    let scorer = CompositeScorer::for_profile(&profile);
    CompiledProfile {
        profile,
        pipeline,
        scorer,
        enricher: Enricher::new(scanner),
    }
}

/// Filter order: content predicates, score bounds, boolean toggles, date
/// bounds, and `RemotePreferred` last so nothing after it reorders records.
pub fn build_pipeline(p: &Profile) -> Pipeline {
    let mut pipe = Pipeline::pipe([
        Filter::keywords_allow(&p.keywords),
        Filter::keywords_deny(&p.exclude_keywords),
        Filter::location_allow(&p.locations),
        Filter::location_deny(&p.exclude_locations),
        Filter::company_allow(&p.companies),
        Filter::company_deny(&p.exclude_companies),
        Filter::tech_allow(&p.technologies),
        Filter::tech_deny(&p.exclude_technologies),
        Filter::ScoreRange {
            min: p.min_score,
            max: p.max_score,
        },
    ]);
    if p.require_contact_email {
        pipe.push(Filter::RequireContactEmail);
    }
    if p.exclude_flagged {
        pipe.push(Filter::ExcludeFlagged);
    }
    if let Some(t) = p.posted_after {
        pipe.push(Filter::PostedAfter(t));
    }
    if let Some(t) = p.posted_before {
        pipe.push(Filter::PostedBefore(t));
    }
    if p.prefer_remote {
        pipe.push(Filter::RemotePreferred);
    }
    pipe
}

impl CompiledProfile {
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn scorer(&self) -> &CompositeScorer {
        &self.scorer
    }

    /// Enrich and rescore one record in place.
    pub fn prepare(&self, record: &mut Record) {
        self.enricher.enrich(record);
        record.score = self.scorer.score_record(record, &self.profile);
    }

    /// Streaming path: enrich, rescore, then run the pipeline on a single-record set.
    pub fn process(&self, mut record: Record) -> Option<Record> {
        self.prepare(&mut record);
        self.pipeline.apply(vec![record]).pop()
    }

    /// Batch path: enrich and rescore every record, then run the pipeline once
    /// over the whole set so order-dependent filters see all of it.
    pub fn process_batch(&self, records: Vec<Record>) -> Vec<Record> {
        let prepared: Vec<Record> = records
            .into_iter()
            .map(|mut r| {
                self.prepare(&mut r);
                r
            })
            .collect();
        self.pipeline.apply(prepared)
    }
}
