// src/analyze/mod.rs
//! Per-record analysis: sanitization, content-safety flags, relevance scoring.

pub mod flags;
pub mod scoring;
pub mod weights;

use crate::ingest::sanitize;
use crate::record::Record;

// Re-export convenient types.
pub use crate::analyze::flags::{ContentScanner, FlagRuleSet};
pub use crate::analyze::scoring::{CompositeScorer, Scorer, NEUTRAL_SCORE};
pub use crate::analyze::weights::{Dimension, ScoreWeights};

/// Enrichment applied to every record before scoring: text cleanup, then flag detection.
#[derive(Debug, Clone, Default)]
pub struct Enricher {
    scanner: ContentScanner,
}

impl Enricher {
    pub fn new(scanner: ContentScanner) -> Self {
        Self { scanner }
    }

    pub fn enrich(&self, record: &mut Record) {
        sanitize(record);
        self.scanner.scan(record);
    }
}
