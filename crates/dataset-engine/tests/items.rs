// crates/dataset-engine/tests/items.rs
// ============================================================================
// Module: Item Service Tests
// Description: Batch create, capacity, idempotency, updates, and removal.
// Purpose: Pin item write semantics against the in-memory backends.
// Dependencies: dataset-core, dataset-engine, tokio
// ============================================================================

//! ## Overview
//! Drives [`dataset_engine::ItemService`] through the engine and checks the
//! stored rows, the item counter, and the emitted events.

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

use dataset_core::DatasetFeatures;
use dataset_core::DatasetSpec;
use dataset_core::ErrorKind;
use dataset_core::FieldData;
use dataset_core::IndexedItem;
use dataset_core::Item;
use dataset_core::ItemCounter;
use dataset_core::PageRequest;
use dataset_engine::BatchCreateOptions;
use dataset_engine::events::CAPACITY_REFUND;
use dataset_engine::events::COUNTER_ANOMALY;
use dataset_engine::events::ID_FALLBACK;

use crate::common::OPERATOR;
use crate::common::capped;
use crate::common::ctx;
use crate::common::harness;
use crate::common::object_tier_harness;
use crate::common::text_item;
use crate::common::text_items;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn partial() -> BatchCreateOptions {
    BatchCreateOptions {
        partial_add: true,
        operator: OPERATOR.to_string(),
    }
}

fn all_or_nothing() -> BatchCreateOptions {
    BatchCreateOptions {
        partial_add: false,
        operator: OPERATOR.to_string(),
    }
}

fn keyed(index: u64, key: &str, content: &str) -> IndexedItem {
    IndexedItem {
        index,
        item: text_item(content).with_item_key(key),
    }
}

// ============================================================================
// SECTION: Capacity
// ============================================================================

/// Verifies partial add inserts the first items that fit and reports the rest.
#[tokio::test]
async fn partial_add_fills_remaining_capacity() {
    let h = harness();
    let (dataset, _) = h.dataset(capped(5), DatasetFeatures::default()).await;

    let outcome = h.engine.items().batch_create(&ctx(), dataset.id, text_items(7), &partial()).await.unwrap();

    assert_eq!(outcome.added(), 5);
    assert_eq!(outcome.inserted, 5);
    assert!(outcome.dataset_full);
    assert_eq!(outcome.errors.count_of(ErrorKind::ExceedDatasetCapacity), 2);
    let indexes: Vec<u64> = outcome.items.iter().map(|indexed| indexed.index).collect();
    assert_eq!(indexes, vec![0, 1, 2, 3, 4]);
    assert_eq!(h.counter(&dataset), 5);
    assert_eq!(h.engine.items().recount_items(dataset.id).unwrap(), 5);
}

/// Verifies an all-or-nothing batch that does not fit inserts nothing.
#[tokio::test]
async fn all_or_nothing_rejects_oversized_batch() {
    let h = harness();
    let (dataset, _) = h.dataset(capped(5), DatasetFeatures::default()).await;

    let outcome = h.engine.items().batch_create(&ctx(), dataset.id, text_items(7), &all_or_nothing()).await.unwrap();

    assert_eq!(outcome.added(), 0);
    assert!(outcome.dataset_full);
    assert_eq!(outcome.errors.count_of(ErrorKind::ExceedDatasetCapacity), 7);
    assert_eq!(h.counter(&dataset), 0);
    assert!(h.saw(CAPACITY_REFUND));
}

/// Verifies item-level failures are reported without failing the batch.
#[tokio::test]
async fn invalid_items_are_grouped_by_kind() {
    let h = harness();
    let spec = DatasetSpec {
        max_item_size: 8,
        ..DatasetSpec::default()
    };
    let (dataset, _) = h.dataset(spec, DatasetFeatures::default()).await;
    let items = vec![
        IndexedItem {
            index: 0,
            item: text_item("fits"),
        },
        IndexedItem {
            index: 1,
            item: Item::with_data(vec![FieldData::keyed("missing", "x")]),
        },
        IndexedItem {
            index: 2,
            item: text_item("   "),
        },
        IndexedItem {
            index: 3,
            item: text_item("far too long for the limit"),
        },
    ];

    let outcome = h.engine.items().batch_create(&ctx(), dataset.id, items, &partial()).await.unwrap();

    assert_eq!(outcome.added(), 1);
    assert_eq!(outcome.errors.count_of(ErrorKind::SchemaMismatch), 1);
    assert_eq!(outcome.errors.count_of(ErrorKind::EmptyData), 1);
    assert_eq!(outcome.errors.count_of(ErrorKind::ItemDataSizeExceeded), 1);
    assert_eq!(h.counter(&dataset), 1);
}

// ============================================================================
// SECTION: Idempotency
// ============================================================================

/// Verifies repeated item keys reload the stored row and refund the slot.
#[tokio::test]
async fn item_key_conflicts_reload_stored_rows() {
    let h = harness();
    let (dataset, _) = h.dataset(DatasetSpec::default(), DatasetFeatures::default()).await;
    let first =
        h.engine.items().batch_create(&ctx(), dataset.id, vec![keyed(0, "k1", "original")], &partial()).await.unwrap();
    let stored_id = first.items[0].item.id;

    let again = h
        .engine
        .items()
        .batch_create(&ctx(), dataset.id, vec![keyed(0, "k1", "replacement"), keyed(1, "k2", "new")], &partial())
        .await
        .unwrap();

    assert_eq!(again.inserted, 1);
    assert_eq!(again.added(), 2);
    assert_eq!(again.items[0].item.id, stored_id);
    assert_eq!(again.items[1].item.item_key, "k2");
    assert_eq!(h.counter(&dataset), 2);
    let reloaded = h.engine.items().get_item(dataset.id, stored_id).await.unwrap();
    assert_eq!(reloaded.data[0].content, "original");
}

/// Verifies keyless items sharing a batch with conflicting keys are stored
/// and the counter matches the live rows.
#[tokio::test]
async fn keyless_items_survive_key_conflicts_in_same_batch() {
    let (h, driver) = object_tier_harness();
    let (dataset, _) = h.dataset(DatasetSpec::default(), DatasetFeatures::default()).await;
    h.engine.items().batch_create(&ctx(), dataset.id, vec![keyed(0, "k1", "a")], &partial()).await.unwrap();
    let mixed = vec![
        IndexedItem {
            index: 0,
            item: text_item("keyless payload past the inline limit"),
        },
        keyed(1, "k1", "b"),
        keyed(2, "k2", "c"),
        keyed(3, "k2", "d"),
    ];

    let outcome = h.engine.items().batch_create(&ctx(), dataset.id, mixed, &partial()).await.unwrap();

    assert_eq!(outcome.inserted, 2);
    assert_eq!(outcome.added(), 4);
    let keyless = &outcome.items[0].item;
    assert_eq!(keyless.item_key, keyless.item_id.to_string());
    assert_eq!(outcome.items[1].item.data[0].content, "a");
    assert_eq!(outcome.items[3].item.id, outcome.items[2].item.id);
    assert_eq!(h.counter(&dataset), 3);
    assert_eq!(h.engine.items().recount_items(dataset.id).unwrap(), 3);
    assert_eq!(driver.keys().unwrap().len(), 1);
    let restored = h.engine.items().get_item(dataset.id, keyless.id).await.unwrap();
    assert_eq!(restored.data[0].content, "keyless payload past the inline limit");
}

/// Verifies keyless items with store-assigned ids map back by position.
#[tokio::test]
async fn store_ids_map_back_around_conflicts() {
    let h = harness();
    let (dataset, _) = h.dataset(DatasetSpec::default(), DatasetFeatures::default()).await;
    h.memory.ids.set_unavailable(true);
    let mixed = vec![
        keyed(0, "k2", "b"),
        IndexedItem {
            index: 1,
            item: text_item("first"),
        },
        keyed(2, "k2", "c"),
        IndexedItem {
            index: 3,
            item: text_item("second"),
        },
    ];

    let outcome = h.engine.items().batch_create(&ctx(), dataset.id, mixed, &partial()).await.unwrap();

    assert_eq!(outcome.inserted, 3);
    let contents: Vec<String> = outcome.items.iter().map(|indexed| indexed.item.data[0].content.clone()).collect();
    assert_eq!(contents, vec!["b".to_string(), "first".to_string(), "b".to_string(), "second".to_string()]);
    assert_eq!(h.counter(&dataset), 3);
    assert_eq!(h.engine.items().recount_items(dataset.id).unwrap(), 3);
}

/// Verifies the store assigns ids when the generator is down.
#[tokio::test]
async fn generator_outage_falls_back_to_store_ids() {
    let h = harness();
    let (dataset, _) = h.dataset(DatasetSpec::default(), DatasetFeatures::default()).await;
    h.memory.ids.set_unavailable(true);

    let outcome = h.engine.items().batch_create(&ctx(), dataset.id, text_items(3), &partial()).await.unwrap();

    assert_eq!(outcome.inserted, 3);
    assert!(outcome.items.iter().all(|indexed| !indexed.item.id.is_unset()));
    assert!(outcome.items.iter().all(|indexed| indexed.item.item_key == indexed.item.item_id.to_string()));
    assert!(h.saw(ID_FALLBACK));
}

// ============================================================================
// SECTION: Updates
// ============================================================================

/// Verifies uncommitted rows change in place and committed rows are archived.
#[tokio::test]
async fn update_in_place_then_archive_after_version() {
    let h = harness();
    let (dataset, _) = h.dataset(DatasetSpec::default(), DatasetFeatures::default()).await;
    let created = h.engine.items().batch_create(&ctx(), dataset.id, text_items(1), &partial()).await.unwrap();
    let original = created.items[0].item.clone();

    let mut change = text_item("edited");
    change.id = original.id;
    let updated = h.engine.items().update_item(&ctx(), dataset.id, change, OPERATOR).await.unwrap();
    assert_eq!(updated.id, original.id);
    assert_eq!(h.engine.items().get_item(dataset.id, original.id).await.unwrap().data[0].content, "edited");

    let version = h.engine.versions().create_version(&ctx(), dataset.id, "1.0.0", "", OPERATOR).await.unwrap();
    let mut change = text_item("after release");
    change.id = original.id;
    let replaced = h.engine.items().update_item(&ctx(), dataset.id, change, OPERATOR).await.unwrap();

    assert_ne!(replaced.id, original.id);
    assert_eq!(replaced.item_id, original.item_id);
    assert_eq!(replaced.add_vn, 2);
    let archived = h.engine.items().get_item(dataset.id, original.id).await.unwrap();
    assert_eq!(archived.del_vn, Some(2));
    let captured =
        h.engine.versions().list_items_of_version(version.id, &PageRequest::first(10)).await.unwrap();
    assert_eq!(captured.items.len(), 1);
    assert_eq!(captured.items[0].data[0].content, "edited");
    assert_eq!(h.engine.items().recount_items(dataset.id).unwrap(), 1);
}

/// Verifies a failed in-place update keeps the committed payload readable.
#[tokio::test]
async fn failed_update_keeps_committed_object_payload() {
    let (h, driver) = object_tier_harness();
    let (dataset, _) = h.dataset(DatasetSpec::default(), DatasetFeatures::default()).await;
    let original_text = "original payload past the inline limit";
    let created = h
        .engine
        .items()
        .batch_create(&ctx(), dataset.id, vec![keyed(0, "k1", original_text)], &partial())
        .await
        .unwrap();
    let original = created.items[0].item.clone();
    h.memory.repository.inject_fault("update_item", 0, 1).unwrap();

    let mut change = text_item("replacement payload past the inline limit");
    change.id = original.id;
    let failed = h.engine.items().update_item(&ctx(), dataset.id, change.clone(), OPERATOR).await;

    assert!(failed.is_err());
    let reread = h.engine.items().get_item(dataset.id, original.id).await.unwrap();
    assert_eq!(reread.data[0].content, original_text);
    assert_eq!(driver.keys().unwrap().len(), 1);

    let updated = h.engine.items().update_item(&ctx(), dataset.id, change, OPERATOR).await.unwrap();
    assert_eq!(updated.id, original.id);
    let keys = driver.keys().unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(Some(&keys[0]), updated.data_properties.storage_key.as_ref());
    let reread = h.engine.items().get_item(dataset.id, original.id).await.unwrap();
    assert_eq!(reread.data[0].content, "replacement payload past the inline limit");
}

/// Verifies archive-and-create on a row outside every version rewrites it
/// instead of leaving an empty window behind.
#[tokio::test]
async fn archive_and_create_rewrites_unversioned_row() {
    let (h, driver) = object_tier_harness();
    let (dataset, _) = h.dataset(DatasetSpec::default(), DatasetFeatures::default()).await;
    let created = h
        .engine
        .items()
        .batch_create(&ctx(), dataset.id, vec![keyed(0, "k1", "first payload past the limit")], &partial())
        .await
        .unwrap();
    let old = created.items[0].item.clone();

    let replaced = h
        .engine
        .items()
        .archive_and_create(&ctx(), dataset.id, old.id, text_item("second payload past the limit"), OPERATOR)
        .await
        .unwrap();

    assert_eq!(replaced.id, old.id);
    assert_eq!(replaced.del_vn, None);
    let live = h.engine.items().list_items(dataset.id, &PageRequest::first(10)).await.unwrap();
    assert_eq!(live.items.len(), 1);
    assert_eq!(live.items[0].data[0].content, "second payload past the limit");
    let rows = h.engine.items().batch_get(dataset.id, &[old.id]).await.unwrap();
    assert!(rows.iter().all(|row| row.del_vn.is_none_or(|del_vn| del_vn > row.add_vn)));
    assert_eq!(driver.keys().unwrap().len(), 1);
    assert_eq!(h.engine.items().recount_items(dataset.id).unwrap(), 1);
}

// ============================================================================
// SECTION: Removal
// ============================================================================

/// Verifies deletes remove uncommitted rows and archive committed ones.
#[tokio::test]
async fn batch_delete_deletes_or_archives() {
    let h = harness();
    let (dataset, _) = h.dataset(DatasetSpec::default(), DatasetFeatures::default()).await;
    let committed = h.engine.items().batch_create(&ctx(), dataset.id, text_items(2), &partial()).await.unwrap();
    h.engine.versions().create_version(&ctx(), dataset.id, "0.1.0", "", OPERATOR).await.unwrap();
    let fresh = h.engine.items().batch_create(&ctx(), dataset.id, text_items(1), &partial()).await.unwrap();
    let ids = vec![committed.items[0].item.id, fresh.items[0].item.id];

    let removed = h.engine.items().batch_delete(&ctx(), dataset.id, &ids, OPERATOR).await.unwrap();

    assert_eq!(removed, 2);
    assert_eq!(h.counter(&dataset), 1);
    let rows = h.engine.items().batch_get(dataset.id, &ids).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].del_vn, Some(2));
    let live = h.engine.items().list_items(dataset.id, &PageRequest::first(10)).await.unwrap();
    assert_eq!(live.items.len(), 1);
}

/// Verifies clear ends every live item and zeroes the counter.
#[tokio::test]
async fn clear_resets_items_and_counter() {
    let h = harness();
    let (dataset, _) = h.dataset(capped(10), DatasetFeatures::default()).await;
    h.engine.items().batch_create(&ctx(), dataset.id, text_items(4), &partial()).await.unwrap();

    let affected = h.engine.items().clear(&ctx(), dataset.id, OPERATOR).await.unwrap();

    assert_eq!(affected, 4);
    assert_eq!(h.counter(&dataset), 0);
    let live = h.engine.items().list_items(dataset.id, &PageRequest::first(10)).await.unwrap();
    assert!(live.items.is_empty());
    let refill = h.engine.items().batch_create(&ctx(), dataset.id, text_items(10), &partial()).await.unwrap();
    assert_eq!(refill.added(), 10);
}

// ============================================================================
// SECTION: Reads
// ============================================================================

/// Verifies live listing pages by row id.
#[tokio::test]
async fn list_items_pages_through_live_rows() {
    let h = harness();
    let (dataset, _) = h.dataset(DatasetSpec::default(), DatasetFeatures::default()).await;
    h.engine.items().batch_create(&ctx(), dataset.id, text_items(5), &partial()).await.unwrap();

    let first = h.engine.items().list_items(dataset.id, &PageRequest::first(3)).await.unwrap();
    assert_eq!(first.items.len(), 3);
    assert_eq!(first.items[0].data[0].name, "q");
    let rest = h.engine.items().list_items(dataset.id, &PageRequest::after(first.next_cursor, 3)).await.unwrap();
    assert_eq!(rest.items.len(), 2);
    assert!(rest.next_cursor.is_none());
}

/// Verifies a recount repairs a drifted counter and reports the anomaly.
#[tokio::test]
async fn recount_repairs_counter_drift() {
    let h = harness();
    let (dataset, _) = h.dataset(DatasetSpec::default(), DatasetFeatures::default()).await;
    h.engine.items().batch_create(&ctx(), dataset.id, text_items(3), &partial()).await.unwrap();
    h.memory.counter.set_item_count(dataset.id, 99).unwrap();

    assert_eq!(h.engine.items().recount_items(dataset.id).unwrap(), 3);
    assert_eq!(h.counter(&dataset), 3);
    assert!(h.saw(COUNTER_ANOMALY));
}
