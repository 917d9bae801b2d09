// crates/dataset-engine/tests/imports.rs
// ============================================================================
// Module: IO Job Tests
// Description: Import jobs, resume after failure, and job lifecycle.
// Purpose: Pin exactly-once import progress and job status transitions.
// Dependencies: dataset-core, dataset-engine, tokio
// ============================================================================

//! ## Overview
//! Runs import jobs over the in-memory `memory` provider. The resume test
//! fails a progress commit part-way and checks that the retried delivery
//! finishes with every count exact.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use dataset_core::DatasetError;
use dataset_core::DatasetFeatures;
use dataset_core::DatasetId;
use dataset_core::DatasetSpec;
use dataset_core::Endpoint;
use dataset_core::ErrorKind;
use dataset_core::FieldMapping;
use dataset_core::FieldSchema;
use dataset_core::FileEndpoint;
use dataset_core::IoJob;
use dataset_core::JobStatus;
use dataset_core::JobType;
use dataset_core::LockBackend;
use dataset_core::PageRequest;
use dataset_core::core::message::IO_JOB_TYPE;
use dataset_engine::BatchCreateOptions;
use dataset_engine::EngineConfig;
use dataset_engine::ImportConfig;
use dataset_engine::IoJobService;
use dataset_engine::events::IMPORT_COMPLETED;
use dataset_engine::events::JOB_FAILED;
use dataset_engine::events::JOB_REQUEUED;
use dataset_engine::events::JOB_SKIPPED;
use dataset_engine::events::LOCK_CONTENDED;

use crate::common::Harness;
use crate::common::MEMORY_PROVIDER;
use crate::common::OPERATOR;
use crate::common::SPACE;
use crate::common::capped;
use crate::common::ctx;
use crate::common::harness;
use crate::common::harness_with;
use crate::common::jsonl_rows;
use crate::common::text_items;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn import_job(dataset_id: DatasetId, path: &str, files: &[&str]) -> IoJob {
    let mut job = IoJob::new(SPACE, dataset_id, JobType::ImportFromFile);
    job.source = Endpoint {
        file: Some(FileEndpoint {
            provider: MEMORY_PROVIDER.to_string(),
            path: path.to_string(),
            files: files.iter().map(ToString::to_string).collect(),
            ..FileEndpoint::default()
        }),
        dataset: None,
    };
    job
}

async fn create(h: &Harness, job: IoJob) -> IoJob {
    h.engine.jobs().create_job(&ctx(), job, OPERATOR).await.unwrap()
}

async fn run_last(h: &Harness) {
    h.engine.jobs().run_job(&ctx(), &h.last_sent()).await.unwrap();
}

// ============================================================================
// SECTION: Imports
// ============================================================================

/// Verifies a failed progress commit is retried without double counting.
#[tokio::test]
async fn import_resumes_exactly_once_after_commit_failure() {
    let h = harness();
    let (dataset, _) = h.dataset(DatasetSpec::default(), DatasetFeatures::default()).await;
    h.files.insert("in/rows.jsonl", jsonl_rows(1000)).unwrap();
    let job = create(&h, import_job(dataset.id, "in/rows.jsonl", &[])).await;
    h.memory.repository.inject_fault("apply_job_delta", 3, 1).unwrap();

    run_last(&h).await;

    let interrupted = h.engine.jobs().get_job(job.id).unwrap();
    assert_eq!(interrupted.status, JobStatus::Running);
    assert_eq!(interrupted.progress.processed, 200);
    assert!(h.saw(JOB_REQUEUED));
    let retry = h.last_sent();
    assert_eq!(retry.msg_type, IO_JOB_TYPE);
    assert_eq!(retry.retry_times().unwrap(), 1);

    h.engine.jobs().run_job(&ctx(), &retry).await.unwrap();

    let done = h.engine.jobs().get_job(job.id).unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress.total, Some(1000));
    assert_eq!(done.progress.processed, 1000);
    assert_eq!(done.progress.added, 1000);
    let sub = done.progress.sub_progress("rows.jsonl").unwrap();
    assert!(sub.completed);
    assert_eq!(sub.processed, 1000);
    assert!(done.errors.is_empty());
    assert_eq!(h.counter(&dataset), 1000);
    assert_eq!(h.engine.items().recount_items(dataset.id).unwrap(), 1000);
    assert!(h.saw(IMPORT_COMPLETED));
}

/// Verifies directory imports map columns, report bad rows, and overwrite.
#[tokio::test]
async fn directory_import_maps_columns_and_overwrites() {
    let h = harness();
    let fields = vec![FieldSchema::text("question"), FieldSchema::text("answer")];
    let (dataset, _) = h.dataset_with_fields(DatasetSpec::default(), DatasetFeatures::default(), fields).await;
    let options = BatchCreateOptions {
        partial_add: true,
        operator: OPERATOR.to_string(),
    };
    let stale: Vec<_> = text_items(3)
        .into_iter()
        .map(|mut indexed| {
            indexed.item.data[0].name = "question".to_string();
            indexed
        })
        .collect();
    h.engine.items().batch_create(&ctx(), dataset.id, stale, &options).await.unwrap();
    h.files.insert("batch/a.csv", "q,a\nwhat,that\nwho,them\n").unwrap();
    h.files.insert("batch/b.jsonl", "{\"q\":\"why\",\"a\":\"because\"}\n{\"q\":\"\",\"a\":\"\"}\n").unwrap();
    let mut job = import_job(dataset.id, "batch", &[]);
    job.field_mappings = vec![
        FieldMapping {
            source: "q".to_string(),
            target: "question".to_string(),
        },
        FieldMapping {
            source: "a".to_string(),
            target: "answer".to_string(),
        },
    ];
    job.option.overwrite_dataset = true;
    let job = create(&h, job).await;

    run_last(&h).await;

    let done = h.engine.jobs().get_job(job.id).unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress.total, Some(4));
    assert_eq!(done.progress.processed, 4);
    assert_eq!(done.progress.added, 3);
    assert_eq!(done.progress.sub_progresses.len(), 2);
    assert_eq!(done.errors.len(), 1);
    assert_eq!(done.errors[0].kind, ErrorKind::EmptyData);
    let live = h.engine.items().list_items(dataset.id, &PageRequest::first(10)).await.unwrap();
    let questions: Vec<String> = live
        .items
        .iter()
        .filter_map(|item| item.data.iter().find(|field| field.key == "question").map(|field| field.content.clone()))
        .collect();
    assert_eq!(questions, vec!["what".to_string(), "who".to_string(), "why".to_string()]);
    assert_eq!(h.counter(&dataset), 3);
}

/// Verifies a full dataset keeps counting records without adding items.
#[tokio::test]
async fn import_into_full_dataset_scans_remaining_records() {
    let config = EngineConfig {
        import: ImportConfig {
            flush_every: 4,
            ..ImportConfig::default()
        },
        ..EngineConfig::default()
    };
    let h = harness_with(config, BTreeMap::new());
    let (dataset, _) = h.dataset(capped(5), DatasetFeatures::default()).await;
    h.files.insert("rows.jsonl", jsonl_rows(12)).unwrap();
    let job = create(&h, import_job(dataset.id, "rows.jsonl", &[])).await;

    run_last(&h).await;

    let done = h.engine.jobs().get_job(job.id).unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress.added, 5);
    assert_eq!(done.progress.total, Some(12));
    assert!(done.errors.iter().any(|group| group.kind == ErrorKind::ExceedDatasetCapacity));
    assert_eq!(h.counter(&dataset), 5);
}

/// Verifies a redelivery after a lost commit on a full dataset counts the
/// rows the first delivery stored.
#[tokio::test]
async fn redelivery_at_capacity_keeps_added_count() {
    let h = harness();
    let (dataset, _) = h.dataset(capped(5), DatasetFeatures::default()).await;
    h.files.insert("rows.jsonl", jsonl_rows(10)).unwrap();
    let job = create(&h, import_job(dataset.id, "rows.jsonl", &[])).await;
    h.memory.repository.inject_fault("apply_job_delta", 1, 1).unwrap();

    run_last(&h).await;

    let interrupted = h.engine.jobs().get_job(job.id).unwrap();
    assert_eq!(interrupted.status, JobStatus::Running);
    assert_eq!(interrupted.progress.added, 0);
    assert_eq!(h.counter(&dataset), 5);

    h.engine.jobs().run_job(&ctx(), &h.last_sent()).await.unwrap();

    let done = h.engine.jobs().get_job(job.id).unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress.added, 5);
    assert_eq!(done.progress.total, Some(10));
    assert!(done.errors.iter().any(|group| group.kind == ErrorKind::ExceedDatasetCapacity));
    assert_eq!(h.counter(&dataset), 5);
    assert_eq!(h.engine.items().recount_items(dataset.id).unwrap(), 5);
}

/// Verifies an import without a readable source is rejected up front.
#[tokio::test]
async fn create_job_rejects_missing_source() {
    let h = harness();
    let (dataset, _) = h.dataset(DatasetSpec::default(), DatasetFeatures::default()).await;

    let missing = h.engine.jobs().create_job(&ctx(), import_job(dataset.id, "nope.csv", &[]), OPERATOR).await;
    assert!(matches!(missing, Err(DatasetError::NotFound(_))));

    h.files.insert("data.bin", "raw").unwrap();
    let unknown = h.engine.jobs().create_job(&ctx(), import_job(dataset.id, "data.bin", &[]), OPERATOR).await;
    assert!(matches!(unknown, Err(DatasetError::InvalidParam(_))));
    assert!(h.sent().is_empty());
}

// ============================================================================
// SECTION: Job Lifecycle
// ============================================================================

/// Verifies a publish failure marks the new job failed.
#[tokio::test]
async fn publish_failure_fails_job() {
    let h = harness();
    let (dataset, _) = h.dataset(DatasetSpec::default(), DatasetFeatures::default()).await;
    h.files.insert("rows.jsonl", jsonl_rows(2)).unwrap();
    h.memory.bus.fail_next_sends(1).unwrap();

    let result = h.engine.jobs().create_job(&ctx(), import_job(dataset.id, "rows.jsonl", &[]), OPERATOR).await;

    assert!(result.is_err());
    assert!(h.saw(JOB_FAILED));
    let jobs = h.engine.jobs().list_jobs(dataset.id, &PageRequest::first(10)).unwrap();
    assert_eq!(jobs.items.len(), 1);
    assert_eq!(jobs.items[0].status, JobStatus::Failed);
}

/// Verifies cancelled jobs are skipped and cannot be cancelled twice.
#[tokio::test]
async fn cancelled_job_is_skipped() {
    let h = harness();
    let (dataset, _) = h.dataset(DatasetSpec::default(), DatasetFeatures::default()).await;
    h.files.insert("rows.jsonl", jsonl_rows(2)).unwrap();
    let job = create(&h, import_job(dataset.id, "rows.jsonl", &[])).await;

    let cancelled = h.engine.jobs().cancel_job(job.id).unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.ended_at_ms.is_some());
    assert!(matches!(h.engine.jobs().cancel_job(job.id), Err(DatasetError::InvalidParam(_))));

    run_last(&h).await;

    assert!(h.saw(JOB_SKIPPED));
    assert_eq!(h.counter(&dataset), 0);
}

/// Verifies a delivery yields when another worker holds the job lock.
#[tokio::test]
async fn held_job_lock_skips_delivery() {
    let h = harness();
    let (dataset, _) = h.dataset(DatasetSpec::default(), DatasetFeatures::default()).await;
    h.files.insert("rows.jsonl", jsonl_rows(2)).unwrap();
    let job = create(&h, import_job(dataset.id, "rows.jsonl", &[])).await;
    let key = IoJobService::lock_key(job.id);
    assert!(h.memory.locks.try_acquire(&key, "other-worker", Duration::from_secs(60)).await.unwrap());

    run_last(&h).await;

    assert!(h.saw(LOCK_CONTENDED));
    assert_eq!(h.engine.jobs().get_job(job.id).unwrap().status, JobStatus::Pending);
    assert_eq!(h.memory.locks.holder(&key).unwrap().as_deref(), Some("other-worker"));
}

/// Verifies export jobs are accepted but fail as unsupported when run.
#[tokio::test]
async fn export_jobs_fail_when_run() {
    let h = harness();
    let (dataset, _) = h.dataset(DatasetSpec::default(), DatasetFeatures::default()).await;
    let job = create(&h, IoJob::new(SPACE, dataset.id, JobType::ExportToFile)).await;

    run_last(&h).await;

    let failed = h.engine.jobs().get_job(job.id).unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(h.saw(JOB_FAILED));
}
