// ABOUTME: SQLite-backed store for sync jobs and sync records
// ABOUTME: Creates both tables and their indexes on open; payloads and summaries are JSON text

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{JobStore, RecordStore};
use crate::checksum::RawRecord;
use crate::error::SyncError;
use crate::models::{RecordKey, SyncJob, SyncRecord};
use crate::stats::SyncSummary;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS sync_jobs (
    job_id TEXT PRIMARY KEY NOT NULL,
    integration_id TEXT NOT NULL,
    status TEXT NOT NULL,
    attempt INTEGER NOT NULL,
    max_attempts INTEGER NOT NULL,
    summary TEXT NOT NULL,
    last_error TEXT,
    started_at TEXT,
    finished_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sync_jobs_integration
    ON sync_jobs (integration_id);

CREATE TABLE IF NOT EXISTS sync_records (
    integration_id TEXT NOT NULL,
    record_type TEXT NOT NULL,
    external_id TEXT NOT NULL,
    checksum TEXT NOT NULL,
    payload TEXT NOT NULL,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    first_seen_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL,
    last_synced_at TEXT NOT NULL,
    last_job_id TEXT NOT NULL,
    deleted_at TEXT,
    PRIMARY KEY (integration_id, record_type, external_id)
);
CREATE INDEX IF NOT EXISTS idx_sync_records_type
    ON sync_records (integration_id, record_type);
";

const JOB_COLUMNS: &str = "job_id, integration_id, status, attempt, max_attempts, summary, \
     last_error, started_at, finished_at, created_at, updated_at";

const RECORD_COLUMNS: &str = "integration_id, record_type, external_id, checksum, payload, \
     is_deleted, first_seen_at, last_seen_at, last_synced_at, last_job_id, deleted_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open sync database at {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to create sync tables")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!(SyncError::Storage("sqlite connection lock poisoned".to_string())))
    }
}

fn ts(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid timestamp '{}' in sync database", value))?
        .with_timezone(&Utc))
}

fn parse_opt_ts(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_ts).transpose()
}

struct JobRow {
    job_id: String,
    integration_id: String,
    status: String,
    attempt: u32,
    max_attempts: u32,
    summary: String,
    last_error: Option<String>,
    started_at: Option<String>,
    finished_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            job_id: row.get(0)?,
            integration_id: row.get(1)?,
            status: row.get(2)?,
            attempt: row.get(3)?,
            max_attempts: row.get(4)?,
            summary: row.get(5)?,
            last_error: row.get(6)?,
            started_at: row.get(7)?,
            finished_at: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_job(self) -> Result<SyncJob> {
        let summary: SyncSummary = serde_json::from_str(&self.summary)
            .with_context(|| format!("Corrupt summary for job {}", self.job_id))?;
        Ok(SyncJob {
            status: self.status.parse()?,
            attempt: self.attempt,
            max_attempts: self.max_attempts,
            summary,
            last_error: self.last_error,
            started_at: parse_opt_ts(self.started_at)?,
            finished_at: parse_opt_ts(self.finished_at)?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            job_id: self.job_id,
            integration_id: self.integration_id,
        })
    }
}

struct RecordRow {
    integration_id: String,
    record_type: String,
    external_id: String,
    checksum: String,
    payload: String,
    is_deleted: bool,
    first_seen_at: String,
    last_seen_at: String,
    last_synced_at: String,
    last_job_id: String,
    deleted_at: Option<String>,
}

impl RecordRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            integration_id: row.get(0)?,
            record_type: row.get(1)?,
            external_id: row.get(2)?,
            checksum: row.get(3)?,
            payload: row.get(4)?,
            is_deleted: row.get(5)?,
            first_seen_at: row.get(6)?,
            last_seen_at: row.get(7)?,
            last_synced_at: row.get(8)?,
            last_job_id: row.get(9)?,
            deleted_at: row.get(10)?,
        })
    }

    fn into_record(self) -> Result<SyncRecord> {
        let payload: RawRecord = serde_json::from_str(&self.payload).with_context(|| {
            format!(
                "Corrupt payload for record {}/{}/{}",
                self.integration_id, self.record_type, self.external_id
            )
        })?;
        Ok(SyncRecord {
            checksum: self.checksum,
            payload,
            is_deleted: self.is_deleted,
            first_seen_at: parse_ts(&self.first_seen_at)?,
            last_seen_at: parse_ts(&self.last_seen_at)?,
            last_synced_at: parse_ts(&self.last_synced_at)?,
            last_job_id: self.last_job_id,
            deleted_at: parse_opt_ts(self.deleted_at)?,
            integration_id: self.integration_id,
            record_type: self.record_type,
            external_id: self.external_id,
        })
    }
}

impl RecordStore for SqliteStore {
    fn find_record(&self, key: &RecordKey) -> Result<Option<SyncRecord>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM sync_records \
                     WHERE integration_id = ?1 AND record_type = ?2 AND external_id = ?3",
                    RECORD_COLUMNS
                ),
                params![key.integration_id, key.record_type, key.external_id],
                RecordRow::from_row,
            )
            .optional()
            .with_context(|| format!("Failed to look up sync record {}", key))?;
        row.map(RecordRow::into_record).transpose()
    }

    fn insert_record(&self, record: &SyncRecord) -> Result<()> {
        let payload = serde_json::to_string(&record.payload)?;
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO sync_records ({}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                RECORD_COLUMNS
            ),
            params![
                record.integration_id,
                record.record_type,
                record.external_id,
                record.checksum,
                payload,
                record.is_deleted,
                ts(&record.first_seen_at),
                ts(&record.last_seen_at),
                ts(&record.last_synced_at),
                record.last_job_id,
                record.deleted_at.as_ref().map(ts),
            ],
        )
        .with_context(|| format!("Failed to insert sync record {}", record.key()))?;
        Ok(())
    }

    fn replace_record(&self, record: &SyncRecord) -> Result<()> {
        let payload = serde_json::to_string(&record.payload)?;
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE sync_records SET checksum = ?4, payload = ?5, is_deleted = ?6, \
                 first_seen_at = ?7, last_seen_at = ?8, last_synced_at = ?9, \
                 last_job_id = ?10, deleted_at = ?11 \
                 WHERE integration_id = ?1 AND record_type = ?2 AND external_id = ?3",
                params![
                    record.integration_id,
                    record.record_type,
                    record.external_id,
                    record.checksum,
                    payload,
                    record.is_deleted,
                    ts(&record.first_seen_at),
                    ts(&record.last_seen_at),
                    ts(&record.last_synced_at),
                    record.last_job_id,
                    record.deleted_at.as_ref().map(ts),
                ],
            )
            .with_context(|| format!("Failed to update sync record {}", record.key()))?;
        if changed == 0 {
            return Err(SyncError::record_not_found(record.key()).into());
        }
        Ok(())
    }

    fn list_records(&self, integration_id: &str, record_type: &str) -> Result<Vec<SyncRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sync_records \
             WHERE integration_id = ?1 AND record_type = ?2 ORDER BY external_id",
            RECORD_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![integration_id, record_type], RecordRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list sync records")?;
        rows.into_iter().map(RecordRow::into_record).collect()
    }
}

impl JobStore for SqliteStore {
    fn insert_job(&self, job: &SyncJob) -> Result<()> {
        let summary = serde_json::to_string(&job.summary)?;
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO sync_jobs ({}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                JOB_COLUMNS
            ),
            params![
                job.job_id,
                job.integration_id,
                job.status.as_str(),
                job.attempt,
                job.max_attempts,
                summary,
                job.last_error,
                job.started_at.as_ref().map(ts),
                job.finished_at.as_ref().map(ts),
                ts(&job.created_at),
                ts(&job.updated_at),
            ],
        )
        .with_context(|| format!("Failed to insert sync job {}", job.job_id))?;
        Ok(())
    }

    fn find_job(&self, job_id: &str) -> Result<Option<SyncJob>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM sync_jobs WHERE job_id = ?1", JOB_COLUMNS),
                params![job_id],
                JobRow::from_row,
            )
            .optional()
            .with_context(|| format!("Failed to look up sync job {}", job_id))?;
        row.map(JobRow::into_job).transpose()
    }

    fn replace_job(&self, job: &SyncJob) -> Result<()> {
        let summary = serde_json::to_string(&job.summary)?;
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE sync_jobs SET integration_id = ?2, status = ?3, attempt = ?4, \
                 max_attempts = ?5, summary = ?6, last_error = ?7, started_at = ?8, \
                 finished_at = ?9, created_at = ?10, updated_at = ?11 \
                 WHERE job_id = ?1",
                params![
                    job.job_id,
                    job.integration_id,
                    job.status.as_str(),
                    job.attempt,
                    job.max_attempts,
                    summary,
                    job.last_error,
                    job.started_at.as_ref().map(ts),
                    job.finished_at.as_ref().map(ts),
                    ts(&job.created_at),
                    ts(&job.updated_at),
                ],
            )
            .with_context(|| format!("Failed to update sync job {}", job.job_id))?;
        if changed == 0 {
            return Err(SyncError::job_not_found(&job.job_id).into());
        }
        Ok(())
    }

    fn list_jobs(&self, integration_id: &str) -> Result<Vec<SyncJob>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sync_jobs WHERE integration_id = ?1 ORDER BY created_at, job_id",
            JOB_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![integration_id], JobRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list sync jobs")?;
        rows.into_iter().map(JobRow::into_job).collect()
    }
}
