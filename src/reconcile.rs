// ABOUTME: Reconciliation engine merging one dataset into the sync record mirror
// ABOUTME: Classifies each record as created, updated or unchanged, then soft-deletes reported ids

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::checksum::{checksum, RawRecord};
use crate::identity::resolve_external_id;
use crate::models::{Dataset, RecordKey, SyncRecord};
use crate::stats::Stats;
use crate::store::RecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug)]
pub enum RecordFailure {
    /// The dataset's id field held no usable value.
    Unresolved { field: String },
    Storage(anyhow::Error),
}

impl fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordFailure::Unresolved { field } => {
                write!(f, "no usable value in id field '{}'", field)
            }
            RecordFailure::Storage(err) => write!(f, "{:#}", err),
        }
    }
}

impl Stats {
    pub fn tally(&mut self, outcome: &Result<RecordOutcome, RecordFailure>) {
        match outcome {
            Ok(RecordOutcome::Created) => {
                self.created += 1;
                self.processed += 1;
            }
            Ok(RecordOutcome::Updated) => {
                self.updated += 1;
                self.processed += 1;
            }
            Ok(RecordOutcome::Unchanged) => {
                self.unchanged += 1;
                self.processed += 1;
            }
            Err(_) => self.failed += 1,
        }
    }
}

/// Merges datasets into a `RecordStore`. Callers must serialize sync jobs
/// per integration: find-then-write per record is not atomic.
pub struct Reconciler<S: RecordStore + ?Sized> {
    store: Arc<S>,
}

impl<S: RecordStore + ?Sized> Clone for Reconciler<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: RecordStore + ?Sized> Reconciler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns this call's contribution only. Per-record failures are counted
    /// in `failed`; only an error in the deletion pass escapes.
    pub fn reconcile_dataset(
        &self,
        job_id: &str,
        integration_id: &str,
        dataset: &Dataset,
    ) -> Result<Stats> {
        let mut stats = Stats::new();
        let mut seen: HashSet<String> = HashSet::new();
        let id_field = dataset.external_id_field.as_deref();

        for (index, raw) in dataset.records.iter().enumerate() {
            let outcome =
                self.reconcile_record(job_id, integration_id, dataset, raw, index, &mut seen);
            if let Err(failure) = &outcome {
                warn!(
                    job_id,
                    integration_id,
                    record_type = %dataset.record_type,
                    index,
                    id_field,
                    "Failed to reconcile record: {}",
                    failure
                );
            }
            stats.tally(&outcome);
        }

        if let Some(deleted_ids) = &dataset.deleted_external_ids {
            let mut handled: HashSet<&str> = HashSet::new();
            for external_id in deleted_ids {
                // Presence in this batch wins over a deletion report.
                if seen.contains(external_id.as_str()) || !handled.insert(external_id.as_str()) {
                    continue;
                }
                let key = RecordKey::new(integration_id, &dataset.record_type, external_id);
                if self.soft_delete(job_id, &key)? {
                    stats.deleted += 1;
                }
            }
        }

        info!(
            job_id,
            integration_id,
            record_type = %dataset.record_type,
            processed = stats.processed,
            created = stats.created,
            updated = stats.updated,
            unchanged = stats.unchanged,
            deleted = stats.deleted,
            failed = stats.failed,
            "Reconciled dataset"
        );
        Ok(stats)
    }

    fn reconcile_record(
        &self,
        job_id: &str,
        integration_id: &str,
        dataset: &Dataset,
        raw: &RawRecord,
        index: usize,
        seen: &mut HashSet<String>,
    ) -> Result<RecordOutcome, RecordFailure> {
        let id_field = dataset.external_id_field.as_deref();
        let identity = resolve_external_id(raw, &dataset.record_type, index, id_field)
            .ok_or_else(|| RecordFailure::Unresolved {
                field: id_field.unwrap_or_default().to_string(),
            })?;
        let external_id = identity.into_string();
        let sum = checksum(raw);
        seen.insert(external_id.clone());

        let key = RecordKey::new(integration_id, &dataset.record_type, external_id);
        self.upsert(job_id, key, sum, raw).map_err(RecordFailure::Storage)
    }

    fn upsert(
        &self,
        job_id: &str,
        key: RecordKey,
        sum: String,
        raw: &RawRecord,
    ) -> Result<RecordOutcome> {
        let now = Utc::now();
        match self.store.find_record(&key)? {
            None => {
                let record = new_record(job_id, key, sum, raw, now);
                self.store.insert_record(&record)?;
                Ok(RecordOutcome::Created)
            }
            Some(mut existing) => {
                // Resurrecting a soft-deleted record is a change even with an identical payload.
                let changed = existing.checksum != sum || existing.is_deleted;
                existing.checksum = sum;
                existing.payload = raw.clone();
                existing.is_deleted = false;
                existing.deleted_at = None;
                existing.last_seen_at = now;
                existing.last_synced_at = now;
                existing.last_job_id = job_id.to_string();
                self.store.replace_record(&existing)?;
                Ok(if changed {
                    RecordOutcome::Updated
                } else {
                    RecordOutcome::Unchanged
                })
            }
        }
    }

    /// Returns false when the record is unknown or already deleted.
    fn soft_delete(&self, job_id: &str, key: &RecordKey) -> Result<bool> {
        let Some(mut existing) = self.store.find_record(key)? else {
            debug!(%key, "Deletion reported for unknown record");
            return Ok(false);
        };
        if existing.is_deleted {
            return Ok(false);
        }
        let now = Utc::now();
        existing.is_deleted = true;
        existing.deleted_at = Some(now);
        existing.last_synced_at = now;
        existing.last_job_id = job_id.to_string();
        self.store.replace_record(&existing)?;
        Ok(true)
    }
}

fn new_record(
    job_id: &str,
    key: RecordKey,
    sum: String,
    raw: &RawRecord,
    now: DateTime<Utc>,
) -> SyncRecord {
    SyncRecord {
        integration_id: key.integration_id,
        record_type: key.record_type,
        external_id: key.external_id,
        checksum: sum,
        payload: raw.clone(),
        is_deleted: false,
        first_seen_at: now,
        last_seen_at: now,
        last_synced_at: now,
        last_job_id: job_id.to_string(),
        deleted_at: None,
    }
}
