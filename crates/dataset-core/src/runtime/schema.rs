// crates/dataset-core/src/runtime/schema.rs
// ============================================================================
// Module: Schema Engine
// Description: Field validation, key generation, compatibility, and merge.
// Purpose: Keep schema evolution additive and field keys stable.
// Dependencies: jsonschema, serde_json
// ============================================================================

//! ## Overview
//! The schema engine enforces the field rules of a dataset schema. Keys are
//! generated once and then never change; a removed field stays in the list
//! as a tombstone. [`compatible`] decides whether existing items remain valid
//! under a new field list, and [`merge`] produces the persisted field list of
//! a schema update.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde_json::Value;

use crate::core::dataset::Dataset;
use crate::core::error::DatasetError;
use crate::core::schema::FieldSchema;
use crate::core::schema::FieldStatus;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum field key length.
pub const MAX_FIELD_KEY_LEN: usize = 64;

/// Reserved key that may never be assigned to a field.
pub const RESERVED_FIELD_KEY: &str = "key";

// ============================================================================
// SECTION: Keys
// ============================================================================

/// Returns true when `key` matches `^[A-Za-z][A-Za-z0-9_]{0,63}$`.
#[must_use]
pub fn is_valid_field_key(key: &str) -> bool {
    let bytes = key.as_bytes();
    let Some(first) = bytes.first() else {
        return false;
    };
    bytes.len() <= MAX_FIELD_KEY_LEN
        && first.is_ascii_alphabetic()
        && bytes.iter().all(|byte| byte.is_ascii_alphanumeric() || *byte == b'_')
}

/// Assigns a key to every field whose key is empty.
///
/// The field name is used as the key prefix when it is itself a valid key,
/// otherwise the prefix is `key`. Candidates are the bare prefix (unless it
/// is the reserved word), then `prefix_1`, `prefix_2`, and so on, checked
/// against every key already present.
pub fn gen_field_keys(fields: &mut [FieldSchema]) {
    let mut taken: BTreeSet<String> = fields
        .iter()
        .filter(|field| !field.key.is_empty())
        .map(|field| field.key.clone())
        .collect();
    taken.insert(RESERVED_FIELD_KEY.to_string());
    for field in fields.iter_mut().filter(|field| field.key.is_empty()) {
        let prefix = if is_valid_field_key(&field.name) { field.name.as_str() } else { RESERVED_FIELD_KEY };
        let key = next_free_key(prefix, &taken);
        taken.insert(key.clone());
        field.key = key;
    }
}

/// Returns the first free key derived from `prefix`.
fn next_free_key(prefix: &str, taken: &BTreeSet<String>) -> String {
    if !taken.contains(prefix) {
        return prefix.to_string();
    }
    let mut suffix: u64 = 1;
    loop {
        let tail = format!("_{suffix}");
        let keep = MAX_FIELD_KEY_LEN.saturating_sub(tail.len()).min(prefix.len());
        let candidate = format!("{}{tail}", &prefix[.. keep]);
        if !taken.contains(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates a field list against the dataset limits and feature switches.
///
/// # Errors
///
/// Returns [`DatasetError::InvalidParam`] describing the first violation.
pub fn validate_fields(dataset: &Dataset, fields: &[FieldSchema]) -> Result<(), DatasetError> {
    let available: Vec<&FieldSchema> = fields.iter().filter(|field| field.is_available()).collect();
    if available.is_empty() {
        return Err(DatasetError::InvalidParam("schema requires at least one available field".to_string()));
    }
    let mut keys = BTreeSet::new();
    for field in fields {
        if !is_valid_field_key(&field.key) || field.key == RESERVED_FIELD_KEY {
            return Err(DatasetError::InvalidParam(format!("invalid field key {:?}", field.key)));
        }
        if !keys.insert(field.key.as_str()) {
            return Err(DatasetError::InvalidParam(format!("duplicate field key {:?}", field.key)));
        }
    }
    let mut names = BTreeSet::new();
    for field in &available {
        if field.name.trim().is_empty() {
            return Err(DatasetError::InvalidParam(format!("field {} has an empty name", field.key)));
        }
        if !names.insert(field.name.as_str()) {
            return Err(DatasetError::InvalidParam(format!("duplicate field name {:?}", field.name)));
        }
        if field.content_type.is_multi_modal() && !dataset.features.multi_modal {
            return Err(DatasetError::InvalidParam(format!(
                "field {} uses a multi-modal content type but the dataset is not multi-modal",
                field.key
            )));
        }
        if let Some(raw) = field.text_schema.as_deref().filter(|raw| !raw.trim().is_empty()) {
            compile_text_schema(&field.key, raw)?;
        }
    }
    let max = dataset.spec.max_field_count;
    if max > 0 && available.len() > max {
        return Err(DatasetError::InvalidParam(format!(
            "schema has {} available fields, limit is {max}",
            available.len()
        )));
    }
    Ok(())
}

/// Parses and compiles an inline JSON-Schema document.
fn compile_text_schema(key: &str, raw: &str) -> Result<(), DatasetError> {
    let document: Value = serde_json::from_str(raw)
        .map_err(|err| DatasetError::InvalidParam(format!("field {key} text schema is not json: {err}")))?;
    jsonschema::validator_for(&document)
        .map_err(|err| DatasetError::InvalidParam(format!("field {key} text schema is invalid: {err}")))?;
    Ok(())
}

// ============================================================================
// SECTION: Compatibility
// ============================================================================

/// Returns the declared JSON types of a schema document, or `None` for "any".
#[must_use]
pub fn declared_json_types(schema: &Value) -> Option<BTreeSet<String>> {
    match schema.get("type")? {
        Value::String(single) => Some(BTreeSet::from([single.clone()])),
        Value::Array(many) => Some(many.iter().filter_map(Value::as_str).map(str::to_string).collect()),
        _ => None,
    }
}

/// Returns true when items valid under `pre` remain valid under `cur`.
///
/// Only fields present in both lists (by key) are compared.
#[must_use]
pub fn compatible(pre: &[FieldSchema], cur: &[FieldSchema]) -> bool {
    cur.iter().filter(|field| !field.key.is_empty()).all(|field| {
        pre.iter()
            .find(|previous| previous.key == field.key)
            .is_none_or(|previous| field_compatible(previous, field))
    })
}

/// Compares one field pair.
fn field_compatible(pre: &FieldSchema, cur: &FieldSchema) -> bool {
    if pre.content_type != cur.content_type {
        return false;
    }
    match (pre.schema_key, cur.schema_key) {
        (Some(before), Some(after)) if !before.widens_to(after) => return false,
        _ => {}
    }
    let (Some(before), Some(after)) = (pre.effective_json_schema(), cur.effective_json_schema()) else {
        return true;
    };
    match (declared_json_types(&before), declared_json_types(&after)) {
        (_, None) => true,
        (None, Some(_)) => false,
        (Some(before), Some(after)) => {
            before.iter().all(|kind| after.contains(kind) || (kind == "integer" && after.contains("number")))
        }
    }
}

// ============================================================================
// SECTION: Merge
// ============================================================================

/// Merges a requested field list onto the previous schema fields.
///
/// Requested fields become available. A requested field without a key reuses
/// the key of the previous available field with the same name, so renames
/// keep keys only when the caller supplies them. Previous fields whose keys
/// are no longer requested become tombstones appended after the requested
/// fields. Keys are then generated and the result validated.
///
/// # Errors
///
/// Returns [`DatasetError::InvalidParam`] when the merged list is invalid.
pub fn merge(
    dataset: &Dataset,
    pre: &[FieldSchema],
    cur: Vec<FieldSchema>,
) -> Result<Vec<FieldSchema>, DatasetError> {
    let mut merged: Vec<FieldSchema> = cur
        .into_iter()
        .map(|mut field| {
            field.status = FieldStatus::Available;
            if field.key.is_empty()
                && let Some(previous) = pre.iter().find(|previous| previous.is_available() && previous.name == field.name)
            {
                field.key = previous.key.clone();
            }
            field
        })
        .collect();
    let requested: BTreeSet<String> = merged.iter().map(|field| field.key.clone()).collect();
    for previous in pre {
        if !requested.contains(&previous.key) {
            let mut tombstone = previous.clone();
            tombstone.status = FieldStatus::Deleted;
            merged.push(tombstone);
        }
    }
    gen_field_keys(&mut merged);
    validate_fields(dataset, &merged)?;
    Ok(merged)
}

/// Prepares the field list of a new dataset.
///
/// # Errors
///
/// Returns [`DatasetError::InvalidParam`] when the fields are invalid.
pub fn prepare_fields(dataset: &Dataset, fields: Vec<FieldSchema>) -> Result<Vec<FieldSchema>, DatasetError> {
    merge(dataset, &[], fields)
}
