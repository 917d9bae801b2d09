// crates/dataset-core/tests/schema_engine.rs
// ============================================================================
// Module: Schema Engine Tests
// Description: Field validation, key generation, compatibility, and merge.
// Purpose: Ensure field keys stay stable and schema evolution fails closed.
// ============================================================================

//! ## Overview
//! Covers the schema rules applied on dataset creation and schema updates.

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

use std::collections::BTreeSet;

use dataset_core::ContentType;
use dataset_core::Dataset;
use dataset_core::DatasetError;
use dataset_core::FieldSchema;
use dataset_core::FieldStatus;
use dataset_core::SchemaKey;
use dataset_core::SpaceId;
use dataset_core::runtime::schema::compatible;
use dataset_core::runtime::schema::gen_field_keys;
use dataset_core::runtime::schema::is_valid_field_key;
use dataset_core::runtime::schema::merge;
use dataset_core::runtime::schema::validate_fields;
use proptest::prelude::*;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn dataset() -> Dataset {
    Dataset::new(SpaceId::new(1), "ds")
}

fn keyed(name: &str, key: &str) -> FieldSchema {
    FieldSchema::text(name).with_key(key)
}

// ============================================================================
// SECTION: Key Generation
// ============================================================================

/// Verifies valid names become keys and collisions get numeric suffixes.
#[test]
fn gen_field_keys_uses_name_prefix_and_suffixes() {
    let mut fields = vec![keyed("input", "input"), FieldSchema::text("input"), FieldSchema::text("输出")];
    gen_field_keys(&mut fields);
    assert_eq!(fields[0].key, "input");
    assert_eq!(fields[1].key, "input_1");
    assert_eq!(fields[2].key, "key_1");
}

/// Verifies the reserved word is never assigned as a key.
#[test]
fn gen_field_keys_skips_reserved_word() {
    let mut fields = vec![FieldSchema::text("key"), FieldSchema::text("key")];
    gen_field_keys(&mut fields);
    assert_eq!(fields[0].key, "key_1");
    assert_eq!(fields[1].key, "key_2");
}

proptest! {
    /// Verifies generated keys are valid and unique for arbitrary names.
    #[test]
    fn gen_field_keys_yields_unique_valid_keys(names in proptest::collection::vec(".{0,80}", 1..12)) {
        let mut fields: Vec<FieldSchema> = names.iter().map(FieldSchema::text).collect();
        gen_field_keys(&mut fields);
        let keys: BTreeSet<&str> = fields.iter().map(|field| field.key.as_str()).collect();
        prop_assert_eq!(keys.len(), fields.len());
        for field in &fields {
            prop_assert!(is_valid_field_key(&field.key));
            prop_assert_ne!(field.key.as_str(), "key");
        }
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Verifies duplicate available names are rejected.
#[test]
fn validate_rejects_duplicate_names() {
    let fields = vec![keyed("a", "a"), keyed("a", "b")];
    let err = validate_fields(&dataset(), &fields).unwrap_err();
    assert!(matches!(err, DatasetError::InvalidParam(_)));
}

/// Verifies tombstoned fields may share a name with an available field.
#[test]
fn validate_allows_tombstone_name_reuse() {
    let mut old = keyed("a", "a");
    old.status = FieldStatus::Deleted;
    let fields = vec![old, keyed("a", "a_1")];
    validate_fields(&dataset(), &fields).unwrap();
}

/// Verifies multi-modal fields require the dataset feature.
#[test]
fn validate_rejects_multi_modal_without_feature() {
    let fields = vec![keyed("img", "img").with_content_type(ContentType::Image)];
    assert!(validate_fields(&dataset(), &fields).is_err());
    let mut enabled = dataset();
    enabled.features.multi_modal = true;
    validate_fields(&enabled, &fields).unwrap();
}

/// Verifies the field count limit counts only available fields.
#[test]
fn validate_enforces_max_field_count() {
    let mut limited = dataset();
    limited.spec.max_field_count = 1;
    let fields = vec![keyed("a", "a"), keyed("b", "b")];
    assert!(validate_fields(&limited, &fields).is_err());
}

/// Verifies an empty field list is rejected.
#[test]
fn validate_requires_an_available_field() {
    assert!(validate_fields(&dataset(), &[]).is_err());
}

/// Verifies an inline schema that does not compile is rejected.
#[test]
fn validate_rejects_broken_text_schema() {
    let mut field = keyed("a", "a");
    field.text_schema = Some("{\"type\": 12}".to_string());
    assert!(validate_fields(&dataset(), &[field]).is_err());
}

// ============================================================================
// SECTION: Compatibility
// ============================================================================

/// Verifies content type changes are incompatible.
#[test]
fn compatible_rejects_content_type_change() {
    let pre = vec![keyed("x", "x")];
    let cur = vec![keyed("x", "x").with_content_type(ContentType::Image)];
    assert!(!compatible(&pre, &cur));
}

/// Verifies integer may widen to float but not the reverse.
#[test]
fn compatible_allows_widening_only() {
    let integer = vec![keyed("x", "x").with_schema_key(SchemaKey::Integer)];
    let float = vec![keyed("x", "x").with_schema_key(SchemaKey::Float)];
    assert!(compatible(&integer, &float));
    assert!(!compatible(&float, &integer));
}

/// Verifies declared JSON types must be a subset of the new types.
#[test]
fn compatible_checks_declared_type_subset() {
    let mut pre = keyed("x", "x");
    pre.text_schema = Some(r#"{"type":["string","null"]}"#.to_string());
    let mut cur = keyed("x", "x");
    cur.text_schema = Some(r#"{"type":["string"]}"#.to_string());
    assert!(!compatible(std::slice::from_ref(&pre), std::slice::from_ref(&cur)));
    assert!(compatible(&[cur], &[pre]));
}

/// Verifies new fields never affect compatibility.
#[test]
fn compatible_ignores_new_fields() {
    let pre = vec![keyed("x", "x")];
    let cur = vec![keyed("x", "x"), keyed("y", "y").with_content_type(ContentType::Audio)];
    assert!(compatible(&pre, &cur));
}

// ============================================================================
// SECTION: Merge
// ============================================================================

/// Verifies merge keeps previous keys and tombstones removed fields.
#[test]
fn merge_keeps_keys_and_tombstones_removed_fields() {
    let pre = vec![keyed("in", "in"), keyed("out", "out")];
    let cur = vec![FieldSchema::text("in"), FieldSchema::text("extra")];
    let merged = merge(&dataset(), &pre, cur).unwrap();
    let by_key: Vec<(&str, FieldStatus)> =
        merged.iter().map(|field| (field.key.as_str(), field.status)).collect();
    assert_eq!(by_key, vec![
        ("in", FieldStatus::Available),
        ("extra", FieldStatus::Available),
        ("out", FieldStatus::Deleted),
    ]);
}

/// Verifies a re-added field name does not reuse a tombstoned key.
#[test]
fn merge_does_not_revive_tombstone_keys_by_name() {
    let mut removed = keyed("a", "a");
    removed.status = FieldStatus::Deleted;
    let pre = vec![keyed("b", "b"), removed];
    let merged = merge(&dataset(), &pre, vec![keyed("b", "b"), FieldSchema::text("a")]).unwrap();
    assert!(merged.iter().any(|field| field.key == "a_1" && field.is_available()));
    assert!(merged.iter().any(|field| field.key == "a" && !field.is_available()));
}
