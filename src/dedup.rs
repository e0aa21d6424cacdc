//! Identity-based deduplication: first record per `id` wins, order preserved.

use std::collections::HashSet;

use crate::record::Record;

/// Remembers every id it has admitted. Used directly by the streaming
/// aggregator (run-wide dedup across sources) and by [`dedup`].
#[derive(Debug, Default, Clone)]
pub struct Deduplicator {
    seen: HashSet<String>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time an id is seen.
    pub fn admit(&mut self, record: &Record) -> bool {
        if self.seen.contains(record.id()) {
            return false;
        }
        self.seen.insert(record.id().to_string());
        true
    }

    /// Number of distinct ids admitted so far.
    pub fn seen(&self) -> usize {
        self.seen.len()
    }
}

/// Keep the first record for each distinct id; kept records stay in first-occurrence order.
pub fn dedup(records: Vec<Record>) -> Vec<Record> {
    let mut d = Deduplicator::new();
    let mut keep = Vec::with_capacity(records.len());
    for r in records {
        if d.admit(&r) {
            keep.push(r);
        }
    }
    keep
}
