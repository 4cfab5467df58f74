// ABOUTME: Reconciliation counters and per-job summary aggregation
// ABOUTME: Stats add field-wise; summaries accumulate per record type and in total

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::AddAssign;

/// Counters for one reconciliation call or an aggregate of several.
///
/// `processed == created + updated + unchanged`; `deleted` and `failed` are
/// counted outside `processed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub deleted: u64,
    pub failed: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_consistent(&self) -> bool {
        self.processed == self.created + self.updated + self.unchanged
    }
}

impl AddAssign<&Stats> for Stats {
    fn add_assign(&mut self, other: &Stats) {
        self.processed += other.processed;
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.deleted += other.deleted;
        self.failed += other.failed;
    }
}

impl AddAssign for Stats {
    fn add_assign(&mut self, other: Stats) {
        *self += &other;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncSummary {
    pub total: Stats,
    pub by_type: BTreeMap<String, Stats>,
}

impl SyncSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pure accumulation: repeated calls for one record type sum, never replace.
    pub fn append(&mut self, record_type: &str, stats: &Stats) {
        *self.by_type.entry(record_type.to_string()).or_default() += stats;
        self.total += stats;
    }

    pub fn for_type(&self, record_type: &str) -> Stats {
        self.by_type.get(record_type).copied().unwrap_or_default()
    }
}
