// crates/dataset-core/tests/memory_repository.rs
// ============================================================================
// Module: In-Memory Repository Tests
// Description: Item windows, transactions, snapshots, and job deltas.
// Purpose: Pin the repository contract the engine relies on.
// ============================================================================

//! ## Overview
//! The in-memory repository is the reference implementation of the
//! repository contract; these tests pin the behaviors every backend shares.

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

use dataset_core::Dataset;
use dataset_core::DatasetError;
use dataset_core::DatasetId;
use dataset_core::ErrorKind;
use dataset_core::FieldData;
use dataset_core::IoJob;
use dataset_core::Item;
use dataset_core::ItemErrorGroup;
use dataset_core::ItemSnapshot;
use dataset_core::JobDelta;
use dataset_core::JobStatus;
use dataset_core::JobType;
use dataset_core::PageRequest;
use dataset_core::ReadOptions;
use dataset_core::Repository;
use dataset_core::RepositoryOps;
use dataset_core::SpaceId;
use dataset_core::StoreError;
use dataset_core::SubProgress;
use dataset_core::VersionId;
use dataset_core::runtime::memory::InMemoryRepository;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn seeded() -> (InMemoryRepository, DatasetId) {
    let repository = InMemoryRepository::new();
    let dataset = repository.insert_dataset(&Dataset::new(SpaceId::new(1), "ds")).unwrap();
    (repository, dataset.id)
}

fn item(dataset_id: DatasetId, key: &str, add_vn: u64) -> Item {
    let mut item = Item::with_data(vec![FieldData::keyed("f", key)]).with_item_key(key);
    item.dataset_id = dataset_id;
    item.add_vn = add_vn;
    item
}

// ============================================================================
// SECTION: Items
// ============================================================================

/// Verifies ids are assigned and live key conflicts are skipped.
#[test]
fn insert_items_skips_live_key_conflicts() {
    let (repository, dataset_id) = seeded();
    let first = repository.insert_items(&[item(dataset_id, "a", 1), item(dataset_id, "b", 1)]).unwrap();
    assert_eq!(first.len(), 2);
    assert!(first.iter().all(|row| !row.id.is_unset() && row.item_id.get() == row.id.get()));

    let second = repository.insert_items(&[item(dataset_id, "a", 1), item(dataset_id, "c", 1)]).unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].item_key, "c");
    assert_eq!(repository.count_live_items(dataset_id).unwrap(), 3);
}

/// Verifies an archived key may be inserted again.
#[test]
fn insert_items_allows_key_reuse_after_archive() {
    let (repository, dataset_id) = seeded();
    let rows = repository.insert_items(&[item(dataset_id, "a", 1)]).unwrap();
    assert_eq!(repository.archive_items(dataset_id, &[rows[0].id], 2).unwrap(), 1);
    let again = repository.insert_items(&[item(dataset_id, "a", 2)]).unwrap();
    assert_eq!(again.len(), 1);
}

/// Verifies missing item keys default to the item id.
#[test]
fn insert_items_defaults_item_key() {
    let (repository, dataset_id) = seeded();
    let rows = repository.insert_items(&[item(dataset_id, "", 1)]).unwrap();
    assert_eq!(rows[0].item_key, rows[0].item_id.to_string());
}

/// Verifies clear removes uncommitted rows and archives committed ones.
#[test]
fn archive_all_live_splits_by_add_vn() {
    let (repository, dataset_id) = seeded();
    let rows = repository.insert_items(&[item(dataset_id, "old", 1), item(dataset_id, "new", 2)]).unwrap();
    assert_eq!(repository.archive_all_live(dataset_id, 2).unwrap(), 2);
    let remaining = repository.get_items(dataset_id, &[rows[0].id, rows[1].id]).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].del_vn, Some(2));
    assert_eq!(repository.count_items_at_version(dataset_id, 1).unwrap(), 1);
    assert_eq!(repository.count_live_items(dataset_id).unwrap(), 0);
}

/// Verifies version windows and cursor pagination.
#[test]
fn list_items_at_version_follows_windows() {
    let (repository, dataset_id) = seeded();
    let rows = repository
        .insert_items(&[item(dataset_id, "a", 1), item(dataset_id, "b", 1), item(dataset_id, "c", 2)])
        .unwrap();
    repository.archive_items(dataset_id, &[rows[0].id], 2).unwrap();

    let first = repository.list_items_at_version(dataset_id, 1, &PageRequest::first(1)).unwrap();
    assert_eq!(first.items[0].item_key, "a");
    let second = repository.list_items_at_version(dataset_id, 1, &PageRequest::after(first.next_cursor, 1)).unwrap();
    assert_eq!(second.items[0].item_key, "b");
    assert!(second.next_cursor.is_none());

    let at_two: Vec<String> = repository
        .list_items_at_version(dataset_id, 2, &PageRequest::first(10))
        .unwrap()
        .items
        .into_iter()
        .map(|row| row.item_key)
        .collect();
    assert_eq!(at_two, vec!["b".to_string(), "c".to_string()]);
}

/// Verifies updates never touch archived rows.
#[test]
fn update_item_rejects_archived_rows() {
    let (repository, dataset_id) = seeded();
    let rows = repository.insert_items(&[item(dataset_id, "a", 1)]).unwrap();
    repository.archive_items(dataset_id, &[rows[0].id], 2).unwrap();
    let err = repository.update_item(&rows[0]).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

// ============================================================================
// SECTION: Transactions
// ============================================================================

/// Verifies a failing body leaves every table untouched.
#[test]
fn transaction_rolls_back_on_error() {
    let (repository, dataset_id) = seeded();
    let result = repository.transaction(&mut |tx| {
        tx.insert_items(&[item(dataset_id, "a", 1)])?;
        Err(DatasetError::Internal("abort".to_string()))
    });
    assert!(result.is_err());
    assert_eq!(repository.count_live_items(dataset_id).unwrap(), 0);
}

/// Verifies optimistic guards surface as conflicts.
#[test]
fn update_dataset_checks_next_version_num() {
    let (repository, dataset_id) = seeded();
    let mut dataset = repository.get_dataset(dataset_id, ReadOptions::master()).unwrap().unwrap();
    dataset.next_version_num = 2;
    let err: DatasetError = repository.update_dataset(&dataset, 5).unwrap_err().into();
    assert_eq!(err.kind(), ErrorKind::ConcurrentDatasetOperations);
    repository.update_dataset(&dataset, 1).unwrap();
}

/// Verifies injected faults fail the named operation after the skip budget.
#[test]
fn inject_fault_fails_after_skip() {
    let (repository, dataset_id) = seeded();
    repository.inject_fault("count_live_items", 1, 1).unwrap();
    repository.count_live_items(dataset_id).unwrap();
    assert!(matches!(repository.count_live_items(dataset_id), Err(StoreError::Io(_))));
    repository.count_live_items(dataset_id).unwrap();
}

// ============================================================================
// SECTION: Snapshots
// ============================================================================

/// Verifies snapshots deduplicate on (version, item id).
#[test]
fn upsert_snapshots_deduplicates() {
    let (repository, dataset_id) = seeded();
    let rows = repository.insert_items(&[item(dataset_id, "a", 1), item(dataset_id, "b", 1)]).unwrap();
    let version_id = VersionId::new(99);
    let snapshots: Vec<ItemSnapshot> = rows
        .iter()
        .map(|row| ItemSnapshot {
            version_id,
            item: row.clone(),
            snapshot_created_at_ms: 1,
        })
        .collect();
    repository.upsert_snapshots(&snapshots).unwrap();
    repository.upsert_snapshots(&snapshots).unwrap();
    assert_eq!(repository.count_snapshots(version_id).unwrap(), 2);
    let page = repository.list_snapshots(version_id, &PageRequest::first(1)).unwrap();
    assert_eq!(page.items.len(), 1);
    assert!(page.next_cursor.is_some());
    assert_eq!(repository.delete_snapshots(version_id).unwrap(), 2);
}

// ============================================================================
// SECTION: Jobs
// ============================================================================

/// Verifies deltas accumulate and are guarded by the processed pre-image.
#[test]
fn apply_job_delta_accumulates_and_guards() {
    let (repository, dataset_id) = seeded();
    let job = repository.insert_job(&IoJob::new(SpaceId::new(1), dataset_id, JobType::ImportFromFile)).unwrap();
    let delta = JobDelta {
        expected_processed: 0,
        delta_processed: 100,
        delta_added: 90,
        sub_progresses: vec![SubProgress {
            name: "a.jsonl".to_string(),
            processed: 100,
            cursor: 100,
            ..SubProgress::default()
        }],
        errors: vec![ItemErrorGroup::counted(ErrorKind::SchemaMismatch, 10)],
        max_error_details: 10,
        status: Some(JobStatus::Running),
        ..JobDelta::default()
    };
    let updated = repository.apply_job_delta(job.id, &delta).unwrap();
    assert_eq!(updated.progress.processed, 100);
    assert_eq!(updated.progress.added, 90);
    assert_eq!(updated.progress.sub_progress("a.jsonl").unwrap().cursor, 100);

    let stale = repository.apply_job_delta(job.id, &delta).unwrap_err();
    assert!(matches!(stale, StoreError::Conflict(_)));

    let finished = repository.transition_job(job.id, JobStatus::Completed, 5).unwrap();
    assert_eq!(finished.ended_at_ms, Some(5));
    assert!(repository.transition_job(job.id, JobStatus::Cancelled, 6).is_err());
}

/// Verifies jobs list newest first.
#[test]
fn list_jobs_is_newest_first() {
    let (repository, dataset_id) = seeded();
    let first = repository.insert_job(&IoJob::new(SpaceId::new(1), dataset_id, JobType::ImportFromFile)).unwrap();
    let second = repository.insert_job(&IoJob::new(SpaceId::new(1), dataset_id, JobType::ExportToFile)).unwrap();
    let page = repository.list_jobs(dataset_id, &PageRequest::first(1)).unwrap();
    assert_eq!(page.items[0].id, second.id);
    let next = repository.list_jobs(dataset_id, &PageRequest::after(page.next_cursor, 1)).unwrap();
    assert_eq!(next.items[0].id, first.id);
}
