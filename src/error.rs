// ABOUTME: Custom error types for the sync engine
// ABOUTME: Provides context-specific error variants callers can downcast from anyhow

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    NotFound { entity: &'static str, id: String },
    Storage(String),
    Adapter(String),
    Config(String),
}

impl SyncError {
    pub fn job_not_found(job_id: &str) -> Self {
        SyncError::NotFound {
            entity: "sync job",
            id: job_id.to_string(),
        }
    }

    pub fn record_not_found(key: impl fmt::Display) -> Self {
        SyncError::NotFound {
            entity: "sync record",
            id: key.to_string(),
        }
    }

    /// True when `err` carries a `SyncError::NotFound` anywhere in its chain.
    pub fn is_not_found(err: &anyhow::Error) -> bool {
        err.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<SyncError>(),
                Some(SyncError::NotFound { .. })
            )
        })
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SyncError::NotFound { entity, id } => write!(f, "Not found: {} '{}'", entity, id),
            SyncError::Storage(msg) => write!(f, "Storage error: {}", msg),
            SyncError::Adapter(msg) => write!(f, "Adapter error: {}", msg),
            SyncError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for SyncError {}
