// ABOUTME: Job orchestrator driving a sync job through its retryable lifecycle
// ABOUTME: Fetches datasets per attempt, reconciles each one and folds stats into the job

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::SyncConfig;
use crate::jobs::{JobLedger, SyncJobView};
use crate::models::Dataset;
use crate::reconcile::Reconciler;
use crate::store::SyncStore;

/// Supplies already-fetched datasets for one attempt of a sync job.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    async fn fetch_datasets(&self, integration_id: &str, attempt: u32) -> Result<Vec<Dataset>>;
}

pub struct StaticDatasetSource {
    datasets: Vec<Dataset>,
}

impl StaticDatasetSource {
    pub fn new(datasets: Vec<Dataset>) -> Self {
        Self { datasets }
    }
}

#[async_trait]
impl DatasetSource for StaticDatasetSource {
    async fn fetch_datasets(&self, _integration_id: &str, _attempt: u32) -> Result<Vec<Dataset>> {
        Ok(self.datasets.clone())
    }
}

/// Reads one dataset object or an array of them from a JSON file.
pub struct FileDatasetSource {
    path: PathBuf,
}

impl FileDatasetSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum DatasetFile {
    Many(Vec<Dataset>),
    One(Dataset),
}

#[async_trait]
impl DatasetSource for FileDatasetSource {
    async fn fetch_datasets(&self, _integration_id: &str, _attempt: u32) -> Result<Vec<Dataset>> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read dataset file {}", self.path.display()))?;
        let parsed: DatasetFile = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse dataset file {}", self.path.display()))?;
        Ok(match parsed {
            DatasetFile::Many(datasets) => datasets,
            DatasetFile::One(dataset) => vec![dataset],
        })
    }
}

pub struct SyncRunner<S: SyncStore + ?Sized> {
    ledger: JobLedger<S>,
    reconciler: Reconciler<S>,
    config: SyncConfig,
}

impl<S: SyncStore + ?Sized + 'static> SyncRunner<S> {
    pub fn new(store: Arc<S>, config: SyncConfig) -> Self {
        Self {
            ledger: JobLedger::new(Arc::clone(&store)),
            reconciler: Reconciler::new(store),
            config,
        }
    }

    pub fn ledger(&self) -> &JobLedger<S> {
        &self.ledger
    }

    /// Runs a new job to a terminal state. A failed sync is `Ok` with
    /// `status=failed`; only job bookkeeping errors are returned as `Err`.
    pub async fn run(
        &self,
        integration_id: &str,
        max_attempts: Option<u32>,
        source: &dyn DatasetSource,
    ) -> Result<SyncJobView> {
        let max_attempts = max_attempts.unwrap_or(self.config.max_attempts);
        let job = self.ledger.create_job(integration_id, max_attempts)?;
        let job_id = job.job_id;

        for attempt in 1..=max_attempts {
            self.ledger.mark_running(&job_id, attempt)?;
            info!(%job_id, integration_id, attempt, max_attempts, "Sync attempt started");

            match self.run_attempt(&job_id, integration_id, attempt, source).await {
                Ok(()) => {
                    self.ledger.mark_succeeded(&job_id, attempt)?;
                    info!(%job_id, integration_id, attempt, "Sync job succeeded");
                    break;
                }
                Err(err) => {
                    let message = format!("{:#}", err);
                    if attempt < max_attempts {
                        warn!(
                            %job_id,
                            integration_id,
                            attempt,
                            error = %message,
                            "Sync attempt failed, retrying"
                        );
                        self.ledger.mark_retrying(&job_id, attempt, &message)?;
                        tokio::time::sleep(self.backoff(attempt)).await;
                    } else {
                        error!(
                            %job_id,
                            integration_id,
                            attempt,
                            error = %message,
                            "Sync job failed"
                        );
                        self.ledger.mark_failed(&job_id, attempt, &message)?;
                    }
                }
            }
        }

        self.ledger.get_job_view(&job_id)
    }

    /// Store access is blocking, so the attempt's reconciliation runs on the
    /// blocking pool rather than on a runtime worker.
    async fn run_attempt(
        &self,
        job_id: &str,
        integration_id: &str,
        attempt: u32,
        source: &dyn DatasetSource,
    ) -> Result<()> {
        let datasets = source
            .fetch_datasets(integration_id, attempt)
            .await
            .context("Failed to fetch datasets")?;

        let reconciler = self.reconciler.clone();
        let ledger = self.ledger.clone();
        let job_id = job_id.to_string();
        let integration_id = integration_id.to_string();

        tokio::task::spawn_blocking(move || -> Result<()> {
            for dataset in &datasets {
                let stats = reconciler
                    .reconcile_dataset(&job_id, &integration_id, dataset)
                    .with_context(|| {
                        format!("Failed to reconcile '{}' dataset", dataset.record_type)
                    })?;
                ledger.append_dataset_summary(&job_id, &dataset.record_type, &stats)?;
            }
            Ok(())
        })
        .await
        .context("Reconciliation task did not complete")?
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.config.retry_backoff_ms.saturating_mul(u64::from(attempt));
        let jitter = if self.config.retry_jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.config.retry_jitter_ms)
        } else {
            0
        };
        Duration::from_millis(base.saturating_add(jitter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::models::{JobStatus, RecordKey, SyncJob, SyncRecord};
    use crate::store::{JobStore, MemoryStore, RecordStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn no_wait() -> SyncConfig {
        SyncConfig {
            max_attempts: 3,
            retry_backoff_ms: 0,
            retry_jitter_ms: 0,
        }
    }

    fn tickets(ids: &[&str]) -> Dataset {
        Dataset::new("tickets").with_records(
            ids.iter()
                .map(|id| json!({"id": id}).as_object().cloned().unwrap())
                .collect(),
        )
    }

    /// Fails the first `failures` attempts, then yields two pages of tickets.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl DatasetSource for Flaky {
        async fn fetch_datasets(
            &self,
            _integration_id: &str,
            attempt: u32,
        ) -> Result<Vec<Dataset>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if attempt <= self.failures {
                anyhow::bail!(SyncError::Adapter(format!("upstream 503 on attempt {}", attempt)));
            }
            Ok(vec![tickets(&["1", "2"]), tickets(&["3"])])
        }
    }

    #[tokio::test]
    async fn test_run_succeeds_first_attempt() {
        let runner = SyncRunner::new(Arc::new(MemoryStore::new()), no_wait());
        let source = StaticDatasetSource::new(vec![tickets(&["1", "2"])]);
        let view = runner.run("glpi", None, &source).await.unwrap();
        assert_eq!(view.status, JobStatus::Succeeded);
        assert_eq!(view.attempt, 1);
        assert_eq!(view.max_attempts, 3);
        assert_eq!(view.summary.total.created, 2);
        assert!(view.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_run_retries_then_succeeds() {
        let runner = SyncRunner::new(Arc::new(MemoryStore::new()), no_wait());
        let source = Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let view = runner.run("glpi", Some(3), &source).await.unwrap();
        assert_eq!(view.status, JobStatus::Succeeded);
        assert_eq!(view.attempt, 3);
        assert!(view.last_error.is_none());
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        // Paginated pages of one record type accumulate.
        assert_eq!(view.summary.by_type["tickets"].created, 3);
        assert_eq!(view.summary.total.processed, 3);
    }

    #[tokio::test]
    async fn test_run_exhausts_attempts_and_fails() {
        let runner = SyncRunner::new(Arc::new(MemoryStore::new()), no_wait());
        let source = Flaky {
            failures: 5,
            calls: AtomicU32::new(0),
        };
        let view = runner.run("sat", Some(2), &source).await.unwrap();
        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(view.attempt, 2);
        assert!(view
            .last_error
            .as_deref()
            .unwrap()
            .contains("upstream 503 on attempt 2"));
        assert!(view.finished_at.is_some());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_file_source_accepts_single_and_many() {
        let dir = tempfile::tempdir().unwrap();
        let single = dir.path().join("single.json");
        std::fs::write(&single, r#"{"recordType": "invoices", "records": [{"sourceId": "1"}]}"#)
            .unwrap();
        let many = dir.path().join("many.json");
        std::fs::write(
            &many,
            r#"[{"recordType": "invoices"}, {"recordType": "clients", "records": []}]"#,
        )
        .unwrap();

        let one = FileDatasetSource::new(&single).fetch_datasets("sat", 1).await.unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].records.len(), 1);

        let two = FileDatasetSource::new(&many).fetch_datasets("sat", 1).await.unwrap();
        assert_eq!(two.len(), 2);
        assert_eq!(two[1].record_type, "clients");

        let missing = FileDatasetSource::new(dir.path().join("none.json"));
        assert!(missing.fetch_datasets("sat", 1).await.is_err());
    }

    #[test]
    fn test_backoff_grows_with_attempt() {
        let runner = SyncRunner::new(
            Arc::new(MemoryStore::new()),
            SyncConfig {
                max_attempts: 3,
                retry_backoff_ms: 100,
                retry_jitter_ms: 10,
            },
        );
        let first = runner.backoff(1);
        let third = runner.backoff(3);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(110));
        assert!(third >= Duration::from_millis(300) && third <= Duration::from_millis(310));
    }

    /// Memory store whose record inserts panic for one external id.
    #[derive(Default)]
    struct PanickingInserts {
        inner: MemoryStore,
    }

    impl RecordStore for PanickingInserts {
        fn find_record(&self, key: &RecordKey) -> Result<Option<SyncRecord>> {
            self.inner.find_record(key)
        }
        fn insert_record(&self, record: &SyncRecord) -> Result<()> {
            if record.external_id == "panic" {
                panic!("driver crashed while inserting {}", record.key());
            }
            self.inner.insert_record(record)
        }
        fn replace_record(&self, record: &SyncRecord) -> Result<()> {
            self.inner.replace_record(record)
        }
        fn list_records(&self, integration_id: &str, record_type: &str) -> Result<Vec<SyncRecord>> {
            self.inner.list_records(integration_id, record_type)
        }
    }

    impl JobStore for PanickingInserts {
        fn insert_job(&self, job: &SyncJob) -> Result<()> {
            self.inner.insert_job(job)
        }
        fn find_job(&self, job_id: &str) -> Result<Option<SyncJob>> {
            self.inner.find_job(job_id)
        }
        fn replace_job(&self, job: &SyncJob) -> Result<()> {
            self.inner.replace_job(job)
        }
        fn list_jobs(&self, integration_id: &str) -> Result<Vec<SyncJob>> {
            self.inner.list_jobs(integration_id)
        }
    }

    #[tokio::test]
    async fn test_reconciliation_panic_fails_attempt_not_runtime() {
        let store = Arc::new(PanickingInserts::default());
        let runner = SyncRunner::new(Arc::clone(&store), no_wait());
        let source = StaticDatasetSource::new(vec![tickets(&["ok", "panic"])]);

        let view = runner.run("glpi", Some(2), &source).await.unwrap();
        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(view.attempt, 2);
        assert!(view
            .last_error
            .as_deref()
            .unwrap()
            .contains("Reconciliation task did not complete"));
        assert_eq!(store.list_records("glpi", "tickets").unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_on_multi_thread_runtime_with_sqlite() {
        let store = Arc::new(crate::store::SqliteStore::open_in_memory().unwrap());
        let runner = SyncRunner::new(Arc::clone(&store), no_wait());
        let source = StaticDatasetSource::new(vec![tickets(&["1", "2", "3"])]);

        let view = runner.run("glpi", None, &source).await.unwrap();
        assert_eq!(view.status, JobStatus::Succeeded);
        assert_eq!(view.summary.total.created, 3);
        assert_eq!(store.list_records("glpi", "tickets").unwrap().len(), 3);
    }
}
