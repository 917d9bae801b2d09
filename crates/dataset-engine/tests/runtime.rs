// crates/dataset-engine/tests/runtime.rs
// ============================================================================
// Module: Runtime Coordination Tests
// Description: Operation barriers, payload tiers, and the job worker.
// Purpose: Pin barrier timeouts, object-tier round trips, and message routing.
// Dependencies: dataset-core, dataset-engine, tokio
// ============================================================================

//! ## Overview
//! Barrier tests run on paused tokio time so the wait budget elapses
//! without real sleeps. Tier tests register an in-memory payload driver as
//! the object tier and inspect the keys it receives.

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
use std::sync::Arc;
use std::time::Duration;

use dataset_core::DatasetError;
use dataset_core::DatasetFeatures;
use dataset_core::DatasetId;
use dataset_core::DatasetSpec;
use dataset_core::IndexedItem;
use dataset_core::JobId;
use dataset_core::JobRunMessage;
use dataset_core::OperationKind;
use dataset_core::PayloadDriver;
use dataset_core::SnapshotStatus;
use dataset_core::SpaceId;
use dataset_core::StorageProvider;
use dataset_core::runtime::memory::InMemoryPayloadDriver;
use dataset_engine::BarrierConfig;
use dataset_engine::BatchCreateOptions;
use dataset_engine::DatasetEngine;
use dataset_engine::EngineConfig;
use dataset_engine::OperationBarrier;
use dataset_engine::Tier;
use dataset_engine::TierConfig;
use dataset_engine::events::BARRIER_WAIT_TIMEOUT;
use dataset_engine::events::JOB_FAILED;

use crate::common::OPERATOR;
use crate::common::ctx;
use crate::common::harness;
use crate::common::harness_with;
use crate::common::text_item;
use crate::common::text_items;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn short_wait() -> BarrierConfig {
    BarrierConfig {
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(200),
        max_wait: Duration::from_secs(2),
        ttl: Duration::from_secs(600),
    }
}

fn two_tiers() -> TierConfig {
    TierConfig {
        tiers: vec![
            Tier {
                provider: StorageProvider::InlineRow,
                max_size: 8,
            },
            Tier {
                provider: StorageProvider::ObjectStoreA,
                max_size: u64::MAX,
            },
        ],
    }
}

fn options() -> BatchCreateOptions {
    BatchCreateOptions {
        partial_add: true,
        operator: OPERATOR.to_string(),
    }
}

// ============================================================================
// SECTION: Barriers
// ============================================================================

/// Verifies a write waits out its budget behind a version barrier, then
/// proceeds once the barrier is released.
#[tokio::test(start_paused = true)]
async fn write_times_out_behind_version_barrier() {
    let h = harness();
    let barrier = OperationBarrier::new(h.memory.collaborators.clone(), short_wait());
    let dataset_id = DatasetId::new(7);
    let version = barrier.acquire(&ctx(), dataset_id, OperationKind::CreateVersion).await.unwrap();

    let blocked = barrier.acquire(&ctx(), dataset_id, OperationKind::WriteItem).await;

    assert!(matches!(blocked, Err(DatasetError::ConcurrentDatasetOperations(_))));
    assert!(h.saw(BARRIER_WAIT_TIMEOUT));

    version.release().unwrap();
    let first = barrier.acquire(&ctx(), dataset_id, OperationKind::WriteItem).await.unwrap();
    let second = barrier.acquire(&ctx(), dataset_id, OperationKind::WriteItem).await.unwrap();
    assert_eq!(first.kind(), Some(OperationKind::WriteItem));
    assert_eq!(second.kind(), Some(OperationKind::WriteItem));
}

/// Verifies barriers on different datasets never wait on each other.
#[tokio::test(start_paused = true)]
async fn barriers_are_scoped_per_dataset() {
    let h = harness();
    let barrier = OperationBarrier::new(h.memory.collaborators.clone(), short_wait());
    let _held = barrier.acquire(&ctx(), DatasetId::new(1), OperationKind::UpdateSchema).await.unwrap();

    let other = barrier.acquire(&ctx(), DatasetId::new(2), OperationKind::CreateVersion).await;

    assert!(other.is_ok());
    assert!(!h.saw(BARRIER_WAIT_TIMEOUT));
}

/// Verifies a cancelled context aborts the wait.
#[tokio::test(start_paused = true)]
async fn cancelled_wait_returns_context_error() {
    let h = harness();
    let barrier = OperationBarrier::new(h.memory.collaborators.clone(), short_wait());
    let dataset_id = DatasetId::new(3);
    let _held = barrier.acquire(&ctx(), dataset_id, OperationKind::WriteItem).await.unwrap();
    let cancelled = ctx();
    cancelled.cancel();

    let result = barrier.acquire(&cancelled, dataset_id, OperationKind::UpdateSchema).await;

    assert!(matches!(result, Err(DatasetError::Cancelled)));
}

// ============================================================================
// SECTION: Payload Tiers
// ============================================================================

/// Verifies large payloads move to the object tier and read back intact.
#[tokio::test]
async fn large_payload_round_trips_through_object_tier() {
    let driver = Arc::new(InMemoryPayloadDriver::new());
    let mut drivers: BTreeMap<StorageProvider, Arc<dyn PayloadDriver>> = BTreeMap::new();
    drivers.insert(StorageProvider::ObjectStoreA, driver.clone());
    let config = EngineConfig {
        tiers: two_tiers(),
        ..EngineConfig::default()
    };
    let h = harness_with(config, drivers);
    let (dataset, _) = h.dataset(DatasetSpec::default(), DatasetFeatures::default()).await;
    let long = "a payload well past the inline limit";
    let items = vec![
        IndexedItem {
            index: 0,
            item: text_item("tiny"),
        },
        IndexedItem {
            index: 1,
            item: text_item(long),
        },
    ];

    let outcome = h.engine.items().batch_create(&ctx(), dataset.id, items, &options()).await.unwrap();

    assert_eq!(outcome.added(), 2);
    let keys = driver.keys().unwrap();
    assert_eq!(keys.len(), 1);
    let large = &outcome.items[1].item;
    assert_eq!(keys[0], format!("dataset:{}:item:{}:vn:{}", dataset.id, large.item_id, large.add_vn));
    let small = h.engine.items().get_item(dataset.id, outcome.items[0].item.id).await.unwrap();
    assert_eq!(small.data_properties.storage, StorageProvider::InlineRow);
    let restored = h.engine.items().get_item(dataset.id, large.id).await.unwrap();
    assert_eq!(restored.data_properties.storage, StorageProvider::ObjectStoreA);
    assert_eq!(restored.data[0].content, long);
}

/// Verifies the engine refuses an object tier without a driver.
#[test]
fn engine_rejects_tier_without_driver() {
    let h = harness();
    let config = EngineConfig {
        tiers: two_tiers(),
        ..EngineConfig::default()
    };

    let result = DatasetEngine::new(h.memory.collaborators.clone(), BTreeMap::new(), config);

    assert!(matches!(result, Err(DatasetError::InvalidParam(_))));
}

/// Verifies the engine refuses a tier table whose sizes do not ascend.
#[test]
fn engine_rejects_unordered_tiers() {
    let h = harness();
    let mut tiers = two_tiers();
    tiers.tiers.reverse();
    let config = EngineConfig {
        tiers,
        ..EngineConfig::default()
    };

    let result = DatasetEngine::new(h.memory.collaborators.clone(), BTreeMap::new(), config);

    assert!(matches!(result, Err(DatasetError::InvalidParam(_))));
}

// ============================================================================
// SECTION: Worker
// ============================================================================

/// Verifies messages without a runner fail and are reported.
#[tokio::test]
async fn worker_rejects_unknown_message_type() {
    let h = harness();
    let mut message = JobRunMessage::io_job(SpaceId::new(1), JobId::new(9), OPERATOR);
    message.msg_type = "reindex".to_string();

    let result = h.engine.worker().dispatch(&ctx(), &message).await;

    assert!(matches!(result, Err(DatasetError::InvalidParam(_))));
    assert!(h.saw(JOB_FAILED));
}

/// Verifies the worker drains queued snapshot jobs until its context ends.
#[tokio::test]
async fn worker_drains_snapshot_messages() {
    let mut h = harness();
    let (dataset, _) = h.dataset(DatasetSpec::default(), DatasetFeatures::default()).await;
    h.engine.items().batch_create(&ctx(), dataset.id, text_items(3), &options()).await.unwrap();
    let version = h.engine.versions().create_version(&ctx(), dataset.id, "1.0.0", "", OPERATOR).await.unwrap();
    let worker = h.engine.worker();

    let handled = worker.run(&ctx().with_timeout(Duration::from_millis(300)), &mut h.memory.receiver).await;

    assert_eq!(handled, 1);
    let built = h.engine.versions().get_version(version.id).unwrap();
    assert_eq!(built.snapshot_status, SnapshotStatus::Completed);
    assert_eq!(built.item_count, 3);
}
