// ABOUTME: Persistent data model: sync jobs, mirrored sync records and datasets
// ABOUTME: Rows are replaced whole by the stores; datasets are transient adapter input

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::checksum::RawRecord;
use crate::stats::SyncSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Retrying,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Retrying => "retrying",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "retrying" => Ok(JobStatus::Retrying),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            other => anyhow::bail!("Unknown job status '{}'", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncJob {
    pub job_id: String,
    pub integration_id: String,
    pub status: JobStatus,
    pub attempt: u32,
    pub max_attempts: u32,
    pub summary: SyncSummary,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Composite identity of a mirrored record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub integration_id: String,
    pub record_type: String,
    pub external_id: String,
}

impl RecordKey {
    pub fn new(
        integration_id: impl Into<String>,
        record_type: impl Into<String>,
        external_id: impl Into<String>,
    ) -> Self {
        Self {
            integration_id: integration_id.into(),
            record_type: record_type.into(),
            external_id: external_id.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.integration_id, self.record_type, self.external_id
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    pub integration_id: String,
    pub record_type: String,
    pub external_id: String,
    pub checksum: String,
    pub payload: RawRecord,
    pub is_deleted: bool,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub last_synced_at: DateTime<Utc>,
    pub last_job_id: String,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SyncRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.integration_id, &self.record_type, &self.external_id)
    }
}

/// One adapter-supplied batch of raw records for a single record type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub record_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id_field: Option<String>,
    #[serde(default)]
    pub records: Vec<RawRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_external_ids: Option<Vec<String>>,
}

impl Dataset {
    pub fn new(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            ..Self::default()
        }
    }

    pub fn with_external_id_field(mut self, field: impl Into<String>) -> Self {
        self.external_id_field = Some(field.into());
        self
    }

    pub fn with_records(mut self, records: Vec<RawRecord>) -> Self {
        self.records = records;
        self
    }

    pub fn with_deleted(mut self, ids: Vec<String>) -> Self {
        self.deleted_external_ids = Some(ids);
        self
    }
}
