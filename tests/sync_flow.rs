// ABOUTME: End-to-end sync flows against the in-memory and SQLite stores
// ABOUTME: Covers the invoice scenario, resurrection, summary resets and not-found handling

use serde_json::{json, Value};
use std::sync::Arc;

use crm_sync_engine::config::SyncConfig;
use crm_sync_engine::{
    checksum, Dataset, JobLedger, JobStatus, MemoryStore, RawRecord, Reconciler, RecordKey,
    RecordStore, SqliteStore, Stats, StaticDatasetSource, SyncError, SyncRunner, SyncStore,
};

fn raw(value: Value) -> RawRecord {
    value.as_object().cloned().expect("object literal")
}

fn stats(
    processed: u64,
    created: u64,
    updated: u64,
    unchanged: u64,
    deleted: u64,
    failed: u64,
) -> Stats {
    Stats {
        processed,
        created,
        updated,
        unchanged,
        deleted,
        failed,
    }
}

fn invoice_scenario<S: SyncStore + ?Sized>(store: Arc<S>) {
    let ledger = JobLedger::new(Arc::clone(&store));
    let engine = Reconciler::new(Arc::clone(&store));

    let job = ledger.create_job("sat", 3).unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    ledger.mark_running(&job.job_id, 1).unwrap();

    let first = Dataset::new("invoices")
        .with_external_id_field("sourceId")
        .with_records(vec![
            raw(json!({"sourceId": "1", "total": 100.0, "issuedAt": "2024-03-01T00:00:00.000Z"})),
            raw(json!({"sourceId": "2", "total": 250.5, "issuedAt": "2024-03-02T00:00:00.000Z"})),
            raw(json!({"sourceId": "3", "total": 75.0, "issuedAt": "2024-03-03T00:00:00.000Z"})),
        ]);
    let first_stats = engine
        .reconcile_dataset(&job.job_id, "sat", &first)
        .unwrap();
    assert_eq!(first_stats, stats(3, 3, 0, 0, 0, 0));
    ledger
        .append_dataset_summary(&job.job_id, "invoices", &first_stats)
        .unwrap();

    let second = Dataset::new("invoices")
        .with_external_id_field("sourceId")
        .with_records(vec![
            // Same content, different key order.
            raw(json!({"issuedAt": "2024-03-01T00:00:00.000Z", "total": 100.0, "sourceId": "1"})),
            raw(json!({"sourceId": "2", "total": 300.0, "issuedAt": "2024-03-02T00:00:00.000Z"})),
        ])
        .with_deleted(vec!["3".to_string()]);
    let second_stats = engine
        .reconcile_dataset(&job.job_id, "sat", &second)
        .unwrap();
    assert_eq!(second_stats, stats(2, 0, 1, 1, 1, 0));
    ledger
        .append_dataset_summary(&job.job_id, "invoices", &second_stats)
        .unwrap();

    ledger.mark_succeeded(&job.job_id, 1).unwrap();

    let view = ledger.get_job_view(&job.job_id).unwrap();
    assert_eq!(view.status, JobStatus::Succeeded);
    assert_eq!(view.attempt, 1);
    assert_eq!(view.summary.total, stats(5, 3, 1, 1, 1, 0));
    assert_eq!(view.summary.by_type["invoices"], stats(5, 3, 1, 1, 1, 0));
    assert!(view.started_at.is_some());
    assert!(view.finished_at.is_some());

    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["status"], "succeeded");
    assert_eq!(
        json["summary"]["total"],
        json!({
            "processed": 5,
            "created": 3,
            "updated": 1,
            "unchanged": 1,
            "deleted": 1,
            "failed": 0
        })
    );

    let deleted = store
        .find_record(&RecordKey::new("sat", "invoices", "3"))
        .unwrap()
        .unwrap();
    assert!(deleted.is_deleted);
    assert_eq!(deleted.last_job_id, job.job_id);

    let mirrored = store.list_records("sat", "invoices").unwrap();
    assert_eq!(mirrored.len(), 3);
    assert_eq!(mirrored[1].payload["total"], json!(300.0));
}

#[test]
fn test_invoice_scenario_in_memory() {
    invoice_scenario(Arc::new(MemoryStore::new()));
}

#[test]
fn test_invoice_scenario_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("sync.db")).unwrap();
    invoice_scenario(Arc::new(store));
}

#[test]
fn test_resurrection_counts_as_update_sqlite() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let engine = Reconciler::new(Arc::clone(&store));
    let records = |ids: &[&str]| -> Vec<RawRecord> {
        ids.iter().map(|id| raw(json!({"code": id, "name": "Client"}))).collect()
    };

    let a = Dataset::new("clients").with_records(records(&["1", "2", "3"]));
    assert_eq!(engine.reconcile_dataset("j1", "crm", &a).unwrap(), stats(3, 3, 0, 0, 0, 0));

    let b = Dataset::new("clients")
        .with_records(records(&["1", "2"]))
        .with_deleted(vec!["3".to_string()]);
    assert_eq!(engine.reconcile_dataset("j2", "crm", &b).unwrap(), stats(2, 0, 0, 2, 1, 0));

    let c = Dataset::new("clients").with_records(records(&["3"]));
    assert_eq!(engine.reconcile_dataset("j3", "crm", &c).unwrap(), stats(1, 0, 1, 0, 0, 0));

    let revived = store
        .find_record(&RecordKey::new("crm", "clients", "3"))
        .unwrap()
        .unwrap();
    assert!(!revived.is_deleted);
    assert!(revived.deleted_at.is_none());
    assert_eq!(revived.last_job_id, "j3");
}

#[test]
fn test_fallback_identity_keyed_by_checksum() {
    let store = Arc::new(MemoryStore::new());
    let engine = Reconciler::new(Arc::clone(&store));
    let message = raw(json!({"subject": "Renewal", "folder": "INBOX"}));
    let dataset = Dataset::new("messages").with_records(vec![message.clone()]);

    assert_eq!(engine.reconcile_dataset("j1", "zimbra", &dataset).unwrap().created, 1);
    assert_eq!(engine.reconcile_dataset("j2", "zimbra", &dataset).unwrap().unchanged, 1);

    let mirrored = store.list_records("zimbra", "messages").unwrap();
    assert_eq!(mirrored.len(), 1);
    assert_eq!(mirrored[0].external_id, checksum(&message));
}

#[test]
fn test_summary_resets_when_attempt_restarts() {
    let store = Arc::new(MemoryStore::new());
    let ledger = JobLedger::new(Arc::clone(&store));
    let job = ledger.create_job("glpi", 3).unwrap();

    ledger.mark_running(&job.job_id, 1).unwrap();
    ledger
        .append_dataset_summary(&job.job_id, "tickets", &stats(4, 4, 0, 0, 0, 0))
        .unwrap();
    ledger.mark_retrying(&job.job_id, 1, "GLPI session expired").unwrap();

    ledger.mark_running(&job.job_id, 2).unwrap();
    ledger
        .append_dataset_summary(&job.job_id, "tickets", &stats(1, 0, 0, 1, 0, 0))
        .unwrap();
    let job = ledger.mark_succeeded(&job.job_id, 2).unwrap();

    // Attempt 1's partial progress is not carried into the final summary.
    assert_eq!(job.summary.total, stats(1, 0, 0, 1, 0, 0));
}

#[test]
fn test_missing_job_is_not_found() {
    let ledger = JobLedger::new(Arc::new(MemoryStore::new()));
    let err = ledger.get_job_view("missing").unwrap_err();
    assert!(SyncError::is_not_found(&err));
    assert!(matches!(
        err.downcast_ref::<SyncError>(),
        Some(SyncError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_runner_end_to_end_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("sync.db")).unwrap());
    let runner = SyncRunner::new(
        Arc::clone(&store),
        SyncConfig {
            max_attempts: 2,
            retry_backoff_ms: 0,
            retry_jitter_ms: 0,
        },
    );

    let source = StaticDatasetSource::new(vec![
        Dataset::new("projects").with_records(vec![raw(json!({"id": 10, "title": "Rollout"}))]),
        Dataset::new("tasks")
            .with_external_id_field("taskId")
            .with_records(vec![
                raw(json!({"taskId": "t-1", "done": false})),
                raw(json!({"title": "missing id"})),
            ]),
    ]);
    let view = runner.run("crm", None, &source).await.unwrap();
    assert_eq!(view.status, JobStatus::Succeeded);
    assert_eq!(view.summary.by_type["projects"], stats(1, 1, 0, 0, 0, 0));
    assert_eq!(view.summary.by_type["tasks"], stats(1, 1, 0, 0, 0, 1));
    assert_eq!(view.summary.total, stats(2, 2, 0, 0, 0, 1));

    let again = runner.run("crm", None, &source).await.unwrap();
    assert_eq!(again.summary.total, stats(2, 0, 0, 2, 0, 1));

    let jobs = runner.ledger().list_job_views("crm").unwrap();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.status == JobStatus::Succeeded));
}
