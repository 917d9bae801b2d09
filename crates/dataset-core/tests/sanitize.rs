// crates/dataset-core/tests/sanitize.rs
// ============================================================================
// Module: Item Sanitization Tests
// Description: Input normalization, validation, and output backfill.
// Purpose: Ensure payloads are canonical before they are sized and stored.
// ============================================================================

//! ## Overview
//! Exercises key resolution, type coercion, validation failure kinds, and
//! the idempotence of input sanitization.

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

use dataset_core::ContentType;
use dataset_core::Dataset;
use dataset_core::DatasetError;
use dataset_core::DatasetId;
use dataset_core::DatasetSchema;
use dataset_core::ErrorKind;
use dataset_core::FieldData;
use dataset_core::FieldFormat;
use dataset_core::FieldSchema;
use dataset_core::FieldStatus;
use dataset_core::IndexedItem;
use dataset_core::Item;
use dataset_core::ObjectRef;
use dataset_core::RepeatedRow;
use dataset_core::SchemaKey;
use dataset_core::SpaceId;
use dataset_core::runtime::field_data::SchemaValidator;
use dataset_core::runtime::sanitize::prepare_items;
use dataset_core::runtime::sanitize::sanitize_item;
use dataset_core::runtime::sanitize::sanitize_output;
use dataset_core::runtime::sanitize::validate_item;
use proptest::prelude::*;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn dataset() -> Dataset {
    let mut dataset = Dataset::new(SpaceId::new(1), "ds");
    dataset.id = DatasetId::new(7);
    dataset
}

fn schema() -> DatasetSchema {
    let mut retired = FieldSchema::text("retired").with_key("retired");
    retired.status = FieldStatus::Deleted;
    let mut answer = FieldSchema::text("answer").with_key("answer");
    answer.default_format = FieldFormat::Markdown;
    DatasetSchema::new(DatasetId::new(7), vec![
        FieldSchema::text("question").with_key("question"),
        answer,
        FieldSchema::text("flag").with_key("flag").with_schema_key(SchemaKey::Bool),
        FieldSchema::text("count").with_key("count").with_schema_key(SchemaKey::Integer),
        retired,
    ])
}

fn indexed(index: u64, data: Vec<FieldData>) -> IndexedItem {
    IndexedItem {
        index,
        item: Item::with_data(data),
    }
}

// ============================================================================
// SECTION: Input Sanitization
// ============================================================================

/// Verifies fields addressed by name resolve to keys and pick up defaults.
#[test]
fn sanitize_resolves_names_and_defaults() {
    let mut item = Item::with_data(vec![FieldData::named("answer", "  hello  "), FieldData::keyed("question", "q")]);
    sanitize_item(&dataset(), &schema(), &mut item);
    assert_eq!(item.data[0].key, "answer");
    assert_eq!(item.data[0].content, "hello");
    assert_eq!(item.data[0].format, Some(FieldFormat::Markdown));
    assert_eq!(item.data[1].format, Some(FieldFormat::Plain));
}

/// Verifies zero-byte fields are dropped after trimming.
#[test]
fn sanitize_drops_empty_fields() {
    let mut item = Item::with_data(vec![FieldData::keyed("question", "   "), FieldData::keyed("answer", "a")]);
    sanitize_item(&dataset(), &schema(), &mut item);
    assert_eq!(item.data.len(), 1);
    assert_eq!(item.data[0].key, "answer");
}

/// Verifies text fields lose attachments and parts.
#[test]
fn sanitize_strips_foreign_payload_parts() {
    let mut field = FieldData::keyed("question", "q");
    field.attachments.push(ObjectRef {
        uri: "s3://bucket/a.png".to_string(),
        ..ObjectRef::default()
    });
    field.parts.push(FieldData::keyed("inner", "x"));
    let mut item = Item::with_data(vec![field]);
    sanitize_item(&dataset(), &schema(), &mut item);
    assert!(item.data[0].attachments.is_empty());
    assert!(item.data[0].parts.is_empty());
}

/// Verifies multipart payloads keep at most one nesting level.
#[test]
fn sanitize_flattens_multipart_depth() {
    let mut grandchild = FieldData::keyed("", "deep");
    grandchild.content_type = ContentType::Text;
    let mut child = FieldData::default();
    child.content_type = ContentType::Multipart;
    child.parts.push(grandchild);
    let mut text_child = FieldData::keyed("", "shallow");
    text_child.content_type = ContentType::Text;
    let mut parent = FieldData::keyed("mixed", "");
    parent.parts = vec![child, text_child];

    let mut multi = dataset();
    multi.features.multi_modal = true;
    let schema = DatasetSchema::new(DatasetId::new(7), vec![
        FieldSchema::text("mixed").with_key("mixed").with_content_type(ContentType::Multipart),
    ]);
    let mut item = Item::with_data(vec![parent]);
    sanitize_item(&multi, &schema, &mut item);
    assert_eq!(item.data[0].parts.len(), 1);
    assert_eq!(item.data[0].parts[0].content, "shallow");
}

/// Verifies repeated-data datasets keep only repeated rows.
#[test]
fn sanitize_switches_on_repeated_layout() {
    let mut repeated = dataset();
    repeated.features.repeated_data = true;
    let mut item = Item::with_data(vec![FieldData::keyed("question", "single")]);
    item.repeated_data = vec![
        RepeatedRow {
            data: vec![FieldData::keyed("question", " row ")],
        },
        RepeatedRow {
            data: vec![FieldData::keyed("question", " ")],
        },
    ];
    sanitize_item(&repeated, &schema(), &mut item);
    assert!(item.data.is_empty());
    assert_eq!(item.repeated_data.len(), 1);
    assert_eq!(item.repeated_data[0].data[0].content, "row");
}

proptest! {
    /// Verifies sanitizing a sanitized item changes nothing.
    #[test]
    fn sanitize_is_idempotent(
        fields in proptest::collection::vec(
            (prop_oneof![Just("question"), Just("answer"), Just("flag"), Just("retired"), Just("nope")], ".{0,24}", any::<bool>()),
            0..6,
        )
    ) {
        let data: Vec<FieldData> = fields
            .into_iter()
            .map(|(target, content, by_name)| {
                if by_name { FieldData::named(target, content) } else { FieldData::keyed(target, content) }
            })
            .collect();
        let mut once = Item::with_data(data);
        sanitize_item(&dataset(), &schema(), &mut once);
        let mut twice = once.clone();
        sanitize_item(&dataset(), &schema(), &mut twice);
        prop_assert_eq!(once, twice);
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Verifies declared booleans are matched case-insensitively and integers
/// never accept date-like literals.
#[test]
fn prepare_coerces_booleans_and_rejects_dates_as_integers() {
    let batch = vec![
        indexed(0, vec![FieldData::keyed("flag", " TRUE ")]),
        indexed(1, vec![FieldData::keyed("count", "2024-01-01")]),
        indexed(2, vec![FieldData::keyed("count", "42")]),
    ];
    let prepared = prepare_items(&dataset(), &schema(), batch).unwrap();
    let good: Vec<u64> = prepared.good.iter().map(|item| item.index).collect();
    assert_eq!(good, vec![0, 2]);
    assert_eq!(prepared.good[0].item.data[0].content, "true");
    assert_eq!(prepared.errors.count_of(ErrorKind::SchemaMismatch), 1);
}

/// Verifies a boolean field lowercases mixed-case literals and rejects a
/// date literal instead of truncating it.
#[test]
fn bool_field_accepts_mixed_case_and_rejects_date() {
    let batch = vec![
        indexed(0, vec![FieldData::keyed("flag", "FaLSe")]),
        indexed(1, vec![FieldData::keyed("flag", "2024-01-01")]),
    ];
    let prepared = prepare_items(&dataset(), &schema(), batch).unwrap();
    assert_eq!(prepared.good.len(), 1);
    assert_eq!(prepared.good[0].index, 0);
    assert_eq!(prepared.good[0].item.data[0].content, "false");
    assert_eq!(prepared.errors.count_of(ErrorKind::SchemaMismatch), 1);
}

/// Verifies each failure kind is reported for the right item.
#[test]
fn prepare_reports_failure_kinds() {
    let mut limited = dataset();
    limited.spec.max_item_size = 8;
    let batch = vec![
        indexed(0, vec![FieldData::keyed("question", " ")]),
        indexed(1, vec![FieldData::keyed("question", "far too long for the limit")]),
        indexed(2, vec![FieldData::keyed("question", "nul\0")]),
        indexed(3, vec![FieldData::keyed("question", "ok")]),
    ];
    let prepared = prepare_items(&limited, &schema(), batch).unwrap();
    assert_eq!(prepared.good.len(), 1);
    assert_eq!(prepared.errors.count_of(ErrorKind::EmptyData), 1);
    assert_eq!(prepared.errors.count_of(ErrorKind::ItemDataSizeExceeded), 1);
    assert_eq!(prepared.errors.count_of(ErrorKind::IllegalContent), 1);
}

/// Verifies sizes are measured after sanitization.
#[test]
fn prepare_measures_sanitized_payload() {
    let prepared =
        prepare_items(&dataset(), &schema(), vec![indexed(0, vec![FieldData::keyed("question", "  héllo  ")])]).unwrap();
    let properties = &prepared.good[0].item.data_properties;
    assert_eq!(properties.bytes, 6);
    assert_eq!(properties.runes, 5);
}

/// Verifies unknown field keys are schema mismatches.
#[test]
fn validate_rejects_unknown_fields() {
    let validator = SchemaValidator::new(&schema()).unwrap();
    let mut item = Item::with_data(vec![FieldData::keyed("retired", "x")]);
    item.compute_data_properties();
    let err = validate_item(&dataset(), &validator, &item).unwrap_err();
    assert!(matches!(err, DatasetError::SchemaMismatch(_)));
}

// ============================================================================
// SECTION: Output Sanitization
// ============================================================================

/// Verifies output hides tombstoned fields and backfills names.
#[test]
fn sanitize_output_hides_retired_fields() {
    let mut item = Item::with_data(vec![FieldData::keyed("retired", "old"), FieldData::keyed("answer", "a")]);
    item.data[1].content_type = ContentType::Unknown;
    sanitize_output(&schema(), &mut item);
    assert_eq!(item.data.len(), 1);
    assert_eq!(item.data[0].name, "answer");
    assert_eq!(item.data[0].content_type, ContentType::Text);
    assert_eq!(item.data[0].format, Some(FieldFormat::Markdown));
}
