// crates/dataset-config/tests/load_validation.rs
// ============================================================================
// Module: Config Load and Validation Tests
// Description: File loading limits, defaults, and cross-section checks.
// Purpose: Ensure configuration fails closed and maps onto engine values.
// Dependencies: dataset-config, dataset-core, dataset-engine, tempfile, tokio
// ============================================================================

//! ## Overview
//! Parses TOML snippets and temporary files into [`DatasetEngineConfig`]
//! and checks both the rejection messages and the typed values handed to
//! the engine, the store, and the payload drivers.

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

use std::time::Duration;

use dataset_config::ConfigError;
use dataset_config::DatasetEngineConfig;
use dataset_config::EventSinkKind;
use dataset_config::PayloadBackendConfig;
use dataset_core::StorageProvider;
use dataset_engine::EngineConfig;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn assert_invalid(result: Result<DatasetEngineConfig, ConfigError>, needle: &str) {
    match result {
        Err(ConfigError::Invalid(message)) => {
            assert!(message.contains(needle), "error {message} did not contain {needle}");
        }
        Err(other) => panic!("expected invalid config, got {other}"),
        Ok(_) => panic!("expected invalid config"),
    }
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Verifies an empty file yields the engine defaults.
#[test]
fn empty_config_matches_engine_defaults() {
    let config = DatasetEngineConfig::from_toml("").unwrap();

    assert_eq!(config.engine_config(), EngineConfig::default());
    assert!(config.store.is_none());
    assert_eq!(config.events.sink, EventSinkKind::Stderr);
    assert!(config.open_repository().unwrap().is_none());
}

/// Verifies millisecond settings convert to durations.
#[test]
fn sections_convert_to_engine_values() {
    let config = DatasetEngineConfig::from_toml(
        r#"
[barrier]
initial_backoff_ms = 20
max_backoff_ms = 400
max_wait_ms = 2000

[snapshot]
page_size = 200
max_retry_times = 2

[import]
flush_every = 500
retry_delay_ms = 250
"#,
    )
    .unwrap();

    let engine = config.engine_config();
    assert_eq!(engine.barrier.initial_backoff, Duration::from_millis(20));
    assert_eq!(engine.barrier.max_wait, Duration::from_secs(2));
    assert_eq!(engine.barrier.ttl, Duration::from_secs(60));
    assert_eq!(engine.snapshot.page_size, 200);
    assert_eq!(engine.snapshot.max_retry_times, 2);
    assert_eq!(engine.import.flush_every, 500);
    assert_eq!(engine.import.retry_delay, Duration::from_millis(250));
    assert_eq!(engine.import.max_retry_times, 10);
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Verifies files over the size cap are rejected before parsing.
#[test]
fn load_rejects_oversized_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("engine.toml");
    std::fs::write(&path, "#".repeat(1024 * 1024 + 1)).unwrap();

    assert_invalid(DatasetEngineConfig::load(&path), "size limit");
}

/// Verifies non-UTF-8 files and malformed TOML are rejected.
#[test]
fn load_rejects_bad_encoding_and_syntax() {
    let dir = TempDir::new().unwrap();
    let binary = dir.path().join("binary.toml");
    std::fs::write(&binary, [0xff, 0xfe, 0x00]).unwrap();
    assert_invalid(DatasetEngineConfig::load(&binary), "utf-8");

    let broken = dir.path().join("broken.toml");
    std::fs::write(&broken, "[barrier\n").unwrap();
    assert!(matches!(DatasetEngineConfig::load(&broken), Err(ConfigError::Parse(_))));

    let missing = dir.path().join("missing.toml");
    assert!(matches!(DatasetEngineConfig::load(&missing), Err(ConfigError::Io(_))));
}

/// Verifies unknown keys fail closed.
#[test]
fn unknown_keys_are_rejected() {
    let result = DatasetEngineConfig::from_toml("[barrier]\nmax_wiat_ms = 5\n");
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

/// Verifies a store section opens a repository on disk.
#[test]
fn store_section_opens_sqlite_repository() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("data/engine.db");
    let path = dir.path().join("engine.toml");
    std::fs::write(&path, format!("[store]\npath = {:?}\njournal_mode = \"delete\"\n", db.display().to_string()))
        .unwrap();

    let config = DatasetEngineConfig::load(&path).unwrap();
    let repository = config.open_repository().unwrap().unwrap();

    assert_eq!(repository.path(), db.as_path());
    repository.readiness().unwrap();
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Verifies engine sections reject unusable values.
#[test]
fn engine_sections_reject_unusable_values() {
    assert_invalid(DatasetEngineConfig::from_toml("[barrier]\nmax_wait_ms = 0\n"), "barrier.max_wait_ms");
    assert_invalid(
        DatasetEngineConfig::from_toml("[barrier]\ninitial_backoff_ms = 500\nmax_backoff_ms = 100\n"),
        "barrier.max_backoff_ms",
    );
    assert_invalid(DatasetEngineConfig::from_toml("[snapshot]\npage_size = 0\n"), "snapshot.page_size");
    assert_invalid(DatasetEngineConfig::from_toml("[snapshot]\npage_size = 5000\n"), "snapshot.page_size");
    assert_invalid(DatasetEngineConfig::from_toml("[import]\nflush_every = 0\n"), "import.flush_every");
}

/// Verifies tier tables must ascend and name configured backends.
#[test]
fn tiers_require_order_and_backends() {
    assert_invalid(DatasetEngineConfig::from_toml("tiers = []\n"), "tiers");
    assert_invalid(
        DatasetEngineConfig::from_toml(
            "[[tiers]]\nprovider = \"inline_row\"\n\n[[tiers]]\nprovider = \"object_store_a\"\nmax_size = 10\n",
        ),
        "tiers[0].max_size",
    );
    assert_invalid(
        DatasetEngineConfig::from_toml(
            "[[tiers]]\nprovider = \"inline_row\"\nmax_size = 10\n\n[[tiers]]\nprovider = \"object_store_a\"\n",
        ),
        "without an object_store backend",
    );
    assert_invalid(
        DatasetEngineConfig::from_toml(
            r#"
[[tiers]]
provider = "inline_row"
max_size = 100

[[tiers]]
provider = "object_store_a"
max_size = 50

[object_store.object_store_a]
backend = "local"
root = "payloads"
"#,
        ),
        "ascend",
    );
}

/// Verifies S3 backends are validated inside the object store section.
#[test]
fn s3_backend_requires_https_endpoint() {
    let toml = r#"
[[tiers]]
provider = "inline_row"
max_size = 1024

[[tiers]]
provider = "object_store_a"

[object_store.object_store_a]
backend = "s3"
bucket = "payloads"
endpoint = "http://localhost:9000"
"#;
    assert_invalid(DatasetEngineConfig::from_toml(toml), "object_store.object_store_a");

    let allowed = toml.replace("endpoint", "allow_http = true\nendpoint");
    let config = DatasetEngineConfig::from_toml(&allowed).unwrap();
    let Some(PayloadBackendConfig::S3(s3)) = &config.object_store.object_store_a else {
        panic!("expected s3 backend");
    };
    assert_eq!(s3.bucket, "payloads");
    assert!(s3.allow_http);
    assert_eq!(config.tier_config().tiers[1].max_size, u64::MAX);
}

/// Verifies the file sink requires a path and other sinks refuse one.
#[test]
fn event_sink_path_pairing() {
    assert_invalid(DatasetEngineConfig::from_toml("[events]\nsink = \"file\"\n"), "events.path is required");
    assert_invalid(
        DatasetEngineConfig::from_toml("[events]\nsink = \"none\"\npath = \"events.jsonl\"\n"),
        "only valid for the file sink",
    );

    let dir = TempDir::new().unwrap();
    let log = dir.path().join("events.jsonl");
    let config =
        DatasetEngineConfig::from_toml(&format!("[events]\nsink = \"file\"\npath = {:?}\n", log.display().to_string()))
            .unwrap();
    config.event_sink().unwrap();
    assert!(log.exists());
}

// ============================================================================
// SECTION: Payload Drivers
// ============================================================================

/// Verifies local backends produce a driver keyed by tier provider.
#[tokio::test]
async fn local_backend_builds_payload_driver() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("objects");
    let config = DatasetEngineConfig::from_toml(&format!(
        r#"
[[tiers]]
provider = "inline_row"
max_size = 4096

[[tiers]]
provider = "object_store_b"

[object_store.object_store_b]
backend = "local"
root = {:?}
"#,
        root.display().to_string()
    ))
    .unwrap();

    let drivers = config.payload_drivers().await.unwrap();

    assert_eq!(drivers.len(), 1);
    assert!(drivers.contains_key(&StorageProvider::ObjectStoreB));
    assert!(root.is_dir());
}
