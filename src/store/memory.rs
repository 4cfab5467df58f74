// ABOUTME: In-process store backed by mutex-guarded maps
// ABOUTME: Mirrors the unique-key semantics of the SQLite tables

use anyhow::{anyhow, bail, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::{JobStore, RecordStore};
use crate::error::SyncError;
use crate::models::{RecordKey, SyncJob, SyncRecord};

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<RecordKey, SyncRecord>>,
    jobs: Mutex<HashMap<String, SyncJob>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| anyhow!(SyncError::Storage("memory store lock poisoned".to_string())))
}

impl RecordStore for MemoryStore {
    fn find_record(&self, key: &RecordKey) -> Result<Option<SyncRecord>> {
        Ok(lock(&self.records)?.get(key).cloned())
    }

    fn insert_record(&self, record: &SyncRecord) -> Result<()> {
        let mut records = lock(&self.records)?;
        let key = record.key();
        if records.contains_key(&key) {
            bail!(SyncError::Storage(format!(
                "duplicate sync record key {}",
                key
            )));
        }
        records.insert(key, record.clone());
        Ok(())
    }

    fn replace_record(&self, record: &SyncRecord) -> Result<()> {
        let mut records = lock(&self.records)?;
        match records.get_mut(&record.key()) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(SyncError::record_not_found(record.key()).into()),
        }
    }

    fn list_records(&self, integration_id: &str, record_type: &str) -> Result<Vec<SyncRecord>> {
        Ok(lock(&self.records)?
            .values()
            .filter(|r| r.integration_id == integration_id && r.record_type == record_type)
            .cloned()
            .collect())
    }
}

impl JobStore for MemoryStore {
    fn insert_job(&self, job: &SyncJob) -> Result<()> {
        let mut jobs = lock(&self.jobs)?;
        if jobs.contains_key(&job.job_id) {
            bail!(SyncError::Storage(format!("duplicate job id {}", job.job_id)));
        }
        jobs.insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    fn find_job(&self, job_id: &str) -> Result<Option<SyncJob>> {
        Ok(lock(&self.jobs)?.get(job_id).cloned())
    }

    fn replace_job(&self, job: &SyncJob) -> Result<()> {
        let mut jobs = lock(&self.jobs)?;
        match jobs.get_mut(&job.job_id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(SyncError::job_not_found(&job.job_id).into()),
        }
    }

    fn list_jobs(&self, integration_id: &str) -> Result<Vec<SyncJob>> {
        let mut jobs: Vec<SyncJob> = lock(&self.jobs)?
            .values()
            .filter(|j| j.integration_id == integration_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        Ok(jobs)
    }
}
