// crates/dataset-object-store/tests/local_driver.rs
// ============================================================================
// Module: Local Payload Driver Tests
// Description: Round trips, missing keys, and key validation on disk.
// Purpose: Pin the payload driver contract for the local backend.
// Dependencies: dataset-core, dataset-object-store, tempfile, tokio
// ============================================================================

//! ## Overview
//! Drives [`LocalPayloadDriver`] through the [`PayloadDriver`] trait against
//! a temporary root and checks the files it leaves behind.

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

use dataset_core::PayloadDriver;
use dataset_core::PayloadEntry;
use dataset_core::PayloadError;
use dataset_object_store::LocalPayloadDriver;
use dataset_object_store::ObjectStoreError;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn entry(key: &str, bytes: &[u8]) -> PayloadEntry {
    PayloadEntry {
        key: key.to_string(),
        bytes: bytes.to_vec(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Verifies payloads round trip and land at the nested key path.
#[tokio::test]
async fn payloads_round_trip_through_nested_files() {
    let dir = TempDir::new().unwrap();
    let driver = LocalPayloadDriver::open(dir.path().join("payloads")).unwrap();
    let keys = vec!["dataset:1:item:2:vn:1".to_string(), "dataset:1:item:3:vn:1".to_string()];

    driver.mset_item_data(&[entry(&keys[0], b"first"), entry(&keys[1], b"second")]).await.unwrap();

    let values = driver.mget_item_data(&keys).await.unwrap();
    assert_eq!(values, vec![Some(b"first".to_vec()), Some(b"second".to_vec())]);
    let on_disk = std::fs::read(driver.root_path().join("dataset/1/item/2/vn/1")).unwrap();
    assert_eq!(on_disk, b"first");
}

/// Verifies overwrites replace the payload in place.
#[tokio::test]
async fn overwrite_replaces_payload() {
    let dir = TempDir::new().unwrap();
    let driver = LocalPayloadDriver::open(dir.path()).unwrap();
    let key = "dataset:9:item:1:vn:2".to_string();

    driver.mset_item_data(&[entry(&key, b"old")]).await.unwrap();
    driver.mset_item_data(&[entry(&key, b"new")]).await.unwrap();

    assert_eq!(driver.mget_item_data(&[key]).await.unwrap(), vec![Some(b"new".to_vec())]);
}

/// Verifies missing keys read as `None` and delete is idempotent.
#[tokio::test]
async fn missing_keys_are_not_errors() {
    let dir = TempDir::new().unwrap();
    let driver = LocalPayloadDriver::open(dir.path()).unwrap();
    let stored = "dataset:1:item:1:vn:1".to_string();
    let absent = "dataset:1:item:404:vn:1".to_string();
    driver.mset_item_data(&[entry(&stored, b"x")]).await.unwrap();

    let values = driver.mget_item_data(&[stored.clone(), absent.clone()]).await.unwrap();
    assert_eq!(values, vec![Some(b"x".to_vec()), None]);

    driver.delete_item_data(&[stored.clone(), absent]).await.unwrap();
    driver.delete_item_data(std::slice::from_ref(&stored)).await.unwrap();
    assert_eq!(driver.mget_item_data(&[stored]).await.unwrap(), vec![None]);
}

/// Verifies traversal keys are rejected before touching disk.
#[tokio::test]
async fn traversal_keys_are_rejected() {
    let dir = TempDir::new().unwrap();
    let driver = LocalPayloadDriver::open(dir.path().join("root")).unwrap();

    let result = driver.mset_item_data(&[entry("dataset:..:..:escape", b"x")]).await;

    assert!(matches!(result, Err(PayloadError::Invalid(_))));
    assert!(!dir.path().join("escape").exists());
}

/// Verifies an empty root is refused.
#[test]
fn empty_root_is_rejected() {
    assert!(matches!(LocalPayloadDriver::open(""), Err(ObjectStoreError::Invalid(_))));
}
