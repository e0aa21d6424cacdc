// src/ingest/sink.rs
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::ingest::types::Record;

/// Downstream store for emitted records.
///
/// Delivery is at-least-once, so `upsert` must be idempotent by `Record::id`.
#[async_trait::async_trait]
pub trait RecordSink: Send + Sync {
    /// Store records; returns how many ids were new.
    async fn upsert(&self, records: &[Record]) -> Result<usize>;
}

/// In-memory store keyed by id. Readers share the lock.
#[derive(Debug, Default)]
pub struct MemorySink {
    inner: RwLock<BTreeMap<String, Record>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Record> {
        self.inner.read().ok()?.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records ordered by id.
    pub fn snapshot(&self) -> Vec<Record> {
        self.inner
            .read()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl RecordSink for MemorySink {
    async fn upsert(&self, records: &[Record]) -> Result<usize> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| anyhow!("memory sink lock poisoned"))?;
        let mut inserted = 0;
        for r in records {
            let mut next = r.clone();
            match map.get(r.id()) {
                Some(prev) => {
                    // the applied mark belongs to the user, not the source
                    if prev.applied {
                        next.applied = true;
                        next.applied_at = prev.applied_at;
                    }
                }
                None => inserted += 1,
            }
            map.insert(next.id().to_string(), next);
        }
        Ok(inserted)
    }
}
