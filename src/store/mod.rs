// ABOUTME: Storage abstraction for sync jobs and mirrored sync records
// ABOUTME: Insert, find-one-by-key and whole-row replace, plus secondary-index listings

pub mod memory;
pub mod sqlite;

use anyhow::Result;

use crate::models::{RecordKey, SyncJob, SyncRecord};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// `sync_records`: unique on (integration, record type, external id).
///
/// Find-then-write is not atomic across callers; sync jobs for one
/// integration must be serialized by the caller.
pub trait RecordStore: Send + Sync {
    fn find_record(&self, key: &RecordKey) -> Result<Option<SyncRecord>>;
    /// Fails if a row with the same key already exists.
    fn insert_record(&self, record: &SyncRecord) -> Result<()>;
    /// Fails with `SyncError::NotFound` if the row does not exist.
    fn replace_record(&self, record: &SyncRecord) -> Result<()>;
    /// Ordered by external id.
    fn list_records(&self, integration_id: &str, record_type: &str) -> Result<Vec<SyncRecord>>;
}

/// `sync_jobs`: unique on job id, indexed by integration.
pub trait JobStore: Send + Sync {
    fn insert_job(&self, job: &SyncJob) -> Result<()>;
    fn find_job(&self, job_id: &str) -> Result<Option<SyncJob>>;
    fn replace_job(&self, job: &SyncJob) -> Result<()>;
    /// Ordered by creation time.
    fn list_jobs(&self, integration_id: &str) -> Result<Vec<SyncJob>>;
}

/// Opens the configured backend. `":memory:"` selects the in-process store.
pub fn open(database: &str) -> Result<std::sync::Arc<dyn SyncStore>> {
    if database == ":memory:" {
        Ok(std::sync::Arc::new(MemoryStore::new()))
    } else {
        Ok(std::sync::Arc::new(SqliteStore::open(database)?))
    }
}

/// A backend holding both collections.
pub trait SyncStore: RecordStore + JobStore {}

impl<T: RecordStore + JobStore> SyncStore for T {}
