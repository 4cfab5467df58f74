// ABOUTME: Library root for the integration sync reconciliation engine
// ABOUTME: Re-exports the engine, job ledger, orchestrator and storage backends

pub mod checksum;
pub mod config;
pub mod error;
pub mod identity;
pub mod jobs;
pub mod models;
pub mod reconcile;
pub mod remote;
pub mod runner;
pub mod stats;
pub mod store;

pub use checksum::{checksum, RawRecord};
pub use config::Config;
pub use error::SyncError;
pub use identity::{resolve_external_id, ExternalIdentity};
pub use jobs::{JobLedger, SyncJobView};
pub use models::{Dataset, JobStatus, RecordKey, SyncJob, SyncRecord};
pub use reconcile::{RecordFailure, RecordOutcome, Reconciler};
pub use runner::{DatasetSource, FileDatasetSource, StaticDatasetSource, SyncRunner};
pub use stats::{Stats, SyncSummary};
pub use store::{JobStore, MemoryStore, RecordStore, SqliteStore, SyncStore};
