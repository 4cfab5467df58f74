// ABOUTME: Wire structures returned by a remote dataset endpoint
// ABOUTME: These are deserialized from JSON before reaching the reconciliation engine

use serde::Deserialize;

use crate::models::Dataset;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetBatch {
    #[serde(default)]
    pub datasets: Vec<Dataset>,
    pub integration_id: Option<String>,
    pub fetched_at: Option<String>, // ISO-8601, informational only
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub error: Option<String>,
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn describe(&self) -> Option<&str> {
        self.message.as_deref().or(self.error.as_deref())
    }
}
