// crates/dataset-engine/tests/versions.rs
// ============================================================================
// Module: Version and Schema Tests
// Description: Version creation, schema evolution, and snapshot builds.
// Purpose: Pin version windows, schema freezing, and resumable snapshots.
// Dependencies: dataset-core, dataset-engine, tokio
// ============================================================================

//! ## Overview
//! Covers the version lifecycle end to end: creating a version freezes the
//! schema and publishes a snapshot job, the snapshot builder copies the
//! version window page by page, and schema edits fork or fail closed.

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

use dataset_core::DatasetError;
use dataset_core::DatasetFeatures;
use dataset_core::DatasetSpec;
use dataset_core::FieldSchema;
use dataset_core::PageRequest;
use dataset_core::SchemaKey;
use dataset_core::SnapshotStatus;
use dataset_core::core::message::SNAPSHOT_JOB_TYPE;
use dataset_engine::BatchCreateOptions;
use dataset_engine::SnapshotOutcome;
use dataset_engine::events::SNAPSHOT_COMPLETED;
use dataset_engine::events::SNAPSHOT_ENQUEUE_FAILED;

use crate::common::Harness;
use crate::common::OPERATOR;
use crate::common::ctx;
use crate::common::editable;
use crate::common::harness;
use crate::common::text_items;

// ============================================================================
// SECTION: Helpers
// ============================================================================

async fn seed(h: &Harness, dataset_id: dataset_core::DatasetId, count: u64) {
    let options = BatchCreateOptions {
        partial_add: true,
        operator: OPERATOR.to_string(),
    };
    let outcome = h.engine.items().batch_create(&ctx(), dataset_id, text_items(count), &options).await.unwrap();
    assert_eq!(outcome.added(), count);
}

// ============================================================================
// SECTION: Versions
// ============================================================================

/// Verifies a version captures the version number, freezes the schema, and
/// publishes a snapshot job.
#[tokio::test]
async fn create_version_freezes_schema_and_enqueues_snapshot() {
    let h = harness();
    let (dataset, schema) = h.dataset(DatasetSpec::default(), DatasetFeatures::default()).await;
    seed(&h, dataset.id, 3).await;

    let version = h.engine.versions().create_version(&ctx(), dataset.id, "1.0.0", "first", OPERATOR).await.unwrap();

    assert_eq!(version.version_num, 1);
    assert_eq!(version.snapshot_status, SnapshotStatus::Unstarted);
    assert_eq!(version.schema_id, schema.id);
    let reloaded = h.reload(&dataset);
    assert_eq!(reloaded.next_version_num, 2);
    assert_eq!(reloaded.latest_version.as_deref(), Some("1.0.0"));
    let frozen = h.engine.schemas().get_schema(dataset.id).unwrap();
    assert!(frozen.immutable);
    assert_eq!(frozen.update_version, schema.update_version + 1);
    let message = h.last_sent();
    assert_eq!(message.msg_type, SNAPSHOT_JOB_TYPE);
    assert_eq!(message.version_id().unwrap(), version.id);
    assert_eq!(message.retry_times().unwrap(), 0);
    assert_eq!(h.engine.versions().get_item_count_of_version(version.id).unwrap(), 3);
}

/// Verifies versions must be strict SemVer and strictly ascending.
#[tokio::test]
async fn versions_must_advance() {
    let h = harness();
    let (dataset, _) = h.dataset(DatasetSpec::default(), DatasetFeatures::default()).await;
    h.engine.versions().create_version(&ctx(), dataset.id, "1.2.0", "", OPERATOR).await.unwrap();

    for candidate in ["1.2.0", "1.1.9", "v2", "2.0"] {
        let result = h.engine.versions().create_version(&ctx(), dataset.id, candidate, "", OPERATOR).await;
        assert!(matches!(result, Err(DatasetError::InvalidParam(_))), "{candidate} accepted");
    }
    h.engine.versions().create_version(&ctx(), dataset.id, "1.10.0-rc.1", "", OPERATOR).await.unwrap();
    assert_eq!(h.reload(&dataset).next_version_num, 3);
}

/// Verifies a failed snapshot publish keeps the version and reports it.
#[tokio::test]
async fn snapshot_publish_failure_keeps_version() {
    let h = harness();
    let (dataset, _) = h.dataset(DatasetSpec::default(), DatasetFeatures::default()).await;
    h.memory.bus.fail_next_sends(1).unwrap();

    let version = h.engine.versions().create_version(&ctx(), dataset.id, "1.0.0", "", OPERATOR).await.unwrap();

    assert!(h.saw(SNAPSHOT_ENQUEUE_FAILED));
    assert!(h.sent().is_empty());
    let stored = h.engine.versions().get_version(version.id).unwrap();
    assert_eq!(stored.snapshot_status, SnapshotStatus::Unstarted);
}

// ============================================================================
// SECTION: Snapshots
// ============================================================================

/// Verifies a snapshot interrupted mid-way resumes from its committed cursor
/// and captures only the version window.
#[tokio::test]
async fn snapshot_resumes_after_transient_failure() {
    let h = harness();
    let (dataset, _) = h.dataset(DatasetSpec::default(), DatasetFeatures::default()).await;
    seed(&h, dataset.id, 120).await;
    let version = h.engine.versions().create_version(&ctx(), dataset.id, "1.0.0", "", OPERATOR).await.unwrap();
    let message = h.last_sent();
    seed(&h, dataset.id, 5).await;
    h.memory.repository.inject_fault("upsert_snapshots", 1, 1).unwrap();

    let first = h.engine.snapshots().build(&ctx(), &message).await.unwrap();

    assert_eq!(first, SnapshotOutcome::Requeued {
        retry_times: 1
    });
    let partial = h.engine.versions().get_version(version.id).unwrap();
    assert_eq!(partial.snapshot_status, SnapshotStatus::InProgress);
    assert_eq!(partial.snapshot_progress.processed, 50);
    assert!(partial.snapshot_progress.cursor.is_some());
    let retry = h.last_sent();
    assert_eq!(retry.retry_times().unwrap(), 1);

    let second = h.engine.snapshots().build(&ctx(), &retry).await.unwrap();

    assert_eq!(second, SnapshotOutcome::Completed {
        item_count: 120
    });
    let done = h.engine.versions().get_version(version.id).unwrap();
    assert_eq!(done.snapshot_status, SnapshotStatus::Completed);
    assert_eq!(done.item_count, 120);
    assert_eq!(h.engine.versions().get_item_count_of_version(version.id).unwrap(), 120);
    assert!(h.saw(SNAPSHOT_COMPLETED));

    let mut listed = 0;
    let mut page = PageRequest::first(50);
    loop {
        let items = h.engine.versions().list_items_of_version(version.id, &page).await.unwrap();
        listed += items.items.len();
        match items.next_cursor {
            Some(cursor) => page = PageRequest::after(Some(cursor), 50),
            None => break,
        }
    }
    assert_eq!(listed, 120);

    let third = h.engine.snapshots().build(&ctx(), &retry).await.unwrap();
    assert_eq!(third, SnapshotOutcome::AlreadyTerminal);
}

/// Verifies the build gives up once the retry budget is spent.
#[tokio::test]
async fn snapshot_fails_past_retry_budget() {
    let h = harness();
    let (dataset, _) = h.dataset(DatasetSpec::default(), DatasetFeatures::default()).await;
    let version = h.engine.versions().create_version(&ctx(), dataset.id, "1.0.0", "", OPERATOR).await.unwrap();
    let exhausted = h.last_sent().with_retry_times(99);

    let outcome = h.engine.snapshots().build(&ctx(), &exhausted).await.unwrap();

    assert_eq!(outcome, SnapshotOutcome::Failed);
    let failed = h.engine.versions().get_version(version.id).unwrap();
    assert_eq!(failed.snapshot_status, SnapshotStatus::Failed);
    assert!(failed.snapshot_progress.failure.is_some());
}

/// Verifies purging removes the version and its snapshots but not items.
#[tokio::test]
async fn purge_version_drops_snapshots() {
    let h = harness();
    let (dataset, _) = h.dataset(DatasetSpec::default(), DatasetFeatures::default()).await;
    seed(&h, dataset.id, 4).await;
    let version = h.engine.versions().create_version(&ctx(), dataset.id, "1.0.0", "", OPERATOR).await.unwrap();
    h.engine.snapshots().build(&ctx(), &h.last_sent()).await.unwrap();

    assert_eq!(h.engine.versions().purge_version(version.id).unwrap(), 4);

    assert!(matches!(h.engine.versions().get_version(version.id), Err(DatasetError::NotFound(_))));
    assert_eq!(h.engine.items().recount_items(dataset.id).unwrap(), 4);
    assert_eq!(h.reload(&dataset).latest_version.as_deref(), Some("1.0.0"));
}

// ============================================================================
// SECTION: Schema Evolution
// ============================================================================

/// Verifies a narrowing field type fails while items exist.
#[tokio::test]
async fn incompatible_schema_edit_needs_empty_dataset() {
    let h = harness();
    let fields = vec![FieldSchema::text("q").with_schema_key(SchemaKey::String)];
    let (dataset, _) = h.dataset_with_fields(DatasetSpec::default(), editable(), fields).await;
    seed(&h, dataset.id, 1).await;
    let narrowed = vec![FieldSchema::text("q").with_schema_key(SchemaKey::Integer)];

    let result = h.engine.schemas().update_schema(&ctx(), dataset.id, narrowed.clone(), OPERATOR).await;
    assert!(matches!(result, Err(DatasetError::IncompatibleDatasetSchema(_))));

    h.engine.items().clear(&ctx(), dataset.id, OPERATOR).await.unwrap();
    let updated = h.engine.schemas().update_schema(&ctx(), dataset.id, narrowed, OPERATOR).await.unwrap();
    assert_eq!(updated.fields[0].schema_key, Some(SchemaKey::Integer));
    assert_eq!(updated.fields[0].key, "q");
}

/// Verifies compatible edits bump the schema and frozen schemas fork.
#[tokio::test]
async fn compatible_edit_updates_or_forks() {
    let h = harness();
    let (dataset, schema) = h.dataset(DatasetSpec::default(), editable()).await;
    seed(&h, dataset.id, 2).await;

    let widened = vec![FieldSchema::text("q"), FieldSchema::text("answer")];
    let updated = h.engine.schemas().update_schema(&ctx(), dataset.id, widened.clone(), OPERATOR).await.unwrap();
    assert_eq!(updated.id, schema.id);
    assert_eq!(updated.update_version, schema.update_version + 1);

    h.engine.versions().create_version(&ctx(), dataset.id, "1.0.0", "", OPERATOR).await.unwrap();
    let renamed = vec![FieldSchema::text("question").with_key("q"), FieldSchema::text("answer")];
    let forked = h.engine.schemas().update_schema(&ctx(), dataset.id, renamed, OPERATOR).await.unwrap();

    assert_ne!(forked.id, schema.id);
    assert_eq!(forked.update_version, 1);
    assert!(!forked.immutable);
    assert_eq!(h.reload(&dataset).schema_id, forked.id);
    assert!(h.engine.schemas().get_schema(dataset.id).unwrap().fields.iter().any(|field| field.name == "question"));
}

/// Verifies schema edits require the edit feature.
#[tokio::test]
async fn schema_edit_requires_feature() {
    let h = harness();
    let (dataset, _) = h.dataset(DatasetSpec::default(), DatasetFeatures::default()).await;
    let result = h.engine.schemas().update_schema(&ctx(), dataset.id, vec![FieldSchema::text("q")], OPERATOR).await;
    assert!(matches!(result, Err(DatasetError::InvalidParam(_))));
}
