// ABOUTME: Sync job lifecycle: creation, status transitions and summary aggregation
// ABOUTME: Every operation reads then replaces one job row, failing with NotFound if absent

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::SyncError;
use crate::models::{JobStatus, SyncJob};
use crate::stats::{Stats, SyncSummary};
use crate::store::JobStore;

/// Read-only projection of a job for presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncJobView {
    pub job_id: String,
    pub integration_id: String,
    pub status: JobStatus,
    pub attempt: u32,
    pub max_attempts: u32,
    pub summary: SyncSummary,
    pub last_error: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

fn iso(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl From<SyncJob> for SyncJobView {
    fn from(job: SyncJob) -> Self {
        Self {
            started_at: job.started_at.as_ref().map(iso),
            finished_at: job.finished_at.as_ref().map(iso),
            created_at: iso(&job.created_at),
            updated_at: iso(&job.updated_at),
            job_id: job.job_id,
            integration_id: job.integration_id,
            status: job.status,
            attempt: job.attempt,
            max_attempts: job.max_attempts,
            summary: job.summary,
            last_error: job.last_error,
        }
    }
}

/// Owns the job rows. Transitions carry no guards beyond "job exists";
/// the orchestrator is responsible for calling them in a sane order.
pub struct JobLedger<S: JobStore + ?Sized> {
    store: Arc<S>,
}

impl<S: JobStore + ?Sized> Clone for JobLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: JobStore + ?Sized> JobLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn create_job(&self, integration_id: &str, max_attempts: u32) -> Result<SyncJob> {
        if max_attempts == 0 {
            anyhow::bail!(SyncError::Config(
                "max_attempts must be at least 1".to_string()
            ));
        }
        let now = Utc::now();
        let job = SyncJob {
            job_id: Uuid::new_v4().to_string(),
            integration_id: integration_id.to_string(),
            status: JobStatus::Queued,
            attempt: 0,
            max_attempts,
            summary: SyncSummary::new(),
            last_error: None,
            started_at: None,
            finished_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_job(&job)?;
        info!(job_id = %job.job_id, integration_id, max_attempts, "Created sync job");
        Ok(job)
    }

    pub fn get_job(&self, job_id: &str) -> Result<SyncJob> {
        self.store
            .find_job(job_id)?
            .ok_or_else(|| SyncError::job_not_found(job_id).into())
    }

    /// Resets the summary: statistics from an earlier attempt do not carry over.
    pub fn mark_running(&self, job_id: &str, attempt: u32) -> Result<SyncJob> {
        self.update(job_id, |job, now| {
            job.status = JobStatus::Running;
            job.attempt = attempt;
            job.summary = SyncSummary::new();
            job.last_error = None;
            if job.started_at.is_none() {
                job.started_at = Some(now);
            }
            job.finished_at = None;
        })
    }

    pub fn mark_retrying(&self, job_id: &str, attempt: u32, error: &str) -> Result<SyncJob> {
        self.update(job_id, |job, _| {
            job.status = JobStatus::Retrying;
            job.attempt = attempt;
            job.last_error = Some(error.to_string());
            job.finished_at = None;
        })
    }

    pub fn mark_failed(&self, job_id: &str, attempt: u32, error: &str) -> Result<SyncJob> {
        self.update(job_id, |job, now| {
            job.status = JobStatus::Failed;
            job.attempt = attempt;
            job.last_error = Some(error.to_string());
            job.finished_at = Some(now);
        })
    }

    pub fn mark_succeeded(&self, job_id: &str, attempt: u32) -> Result<SyncJob> {
        self.update(job_id, |job, now| {
            job.status = JobStatus::Succeeded;
            job.attempt = attempt;
            job.last_error = None;
            job.finished_at = Some(now);
        })
    }

    /// Adds `stats` into the job's per-type entry and its total.
    pub fn append_dataset_summary(
        &self,
        job_id: &str,
        record_type: &str,
        stats: &Stats,
    ) -> Result<SyncJob> {
        self.update(job_id, |job, _| job.summary.append(record_type, stats))
    }

    pub fn get_job_view(&self, job_id: &str) -> Result<SyncJobView> {
        self.get_job(job_id).map(SyncJobView::from)
    }

    pub fn list_job_views(&self, integration_id: &str) -> Result<Vec<SyncJobView>> {
        Ok(self
            .store
            .list_jobs(integration_id)?
            .into_iter()
            .map(SyncJobView::from)
            .collect())
    }

    fn update(
        &self,
        job_id: &str,
        apply: impl FnOnce(&mut SyncJob, DateTime<Utc>),
    ) -> Result<SyncJob> {
        let mut job = self.get_job(job_id)?;
        let now = Utc::now();
        apply(&mut job, now);
        job.updated_at = now;
        self.store.replace_job(&job)?;
        debug!(job_id, status = %job.status, attempt = job.attempt, "Updated sync job");
        Ok(job)
    }
}
