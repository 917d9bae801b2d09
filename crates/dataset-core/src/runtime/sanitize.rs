// crates/dataset-core/src/runtime/sanitize.rs
// ============================================================================
// Module: Item Sanitization
// Description: Normalizes item payloads on input and output.
// Purpose: Make stored payloads canonical before size and schema checks.
// Dependencies: crate::core, crate::runtime::field_data
// ============================================================================

//! ## Overview
//! Input sanitization resolves field keys (by key, then by available field
//! name), fills content type and format from the schema, trims text, strips
//! payload parts that do not belong to the content type, flattens multipart
//! to one nesting level, and drops zero-byte fields. It is idempotent:
//! sanitizing a sanitized item changes nothing.
//!
//! Output sanitization hides fields that are no longer available and
//! backfills denormalized attributes for callers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::dataset::Dataset;
use crate::core::error::DatasetError;
use crate::core::item::FieldData;
use crate::core::item::IndexedItem;
use crate::core::item::Item;
use crate::core::item_error::ItemErrorCollector;
use crate::core::schema::ContentType;
use crate::core::schema::DatasetSchema;
use crate::core::schema::FieldSchema;
use crate::core::schema::SchemaKey;
use crate::runtime::field_data::SchemaValidator;
use crate::runtime::schema::declared_json_types;

// ============================================================================
// SECTION: Input Sanitization
// ============================================================================

/// Walk level allowing one more nesting level of multipart parts.
const WALK_LEVEL_TOP: u8 = 1;

/// Sanitizes an item in place for the dataset's layout and schema.
pub fn sanitize_item(dataset: &Dataset, schema: &DatasetSchema, item: &mut Item) {
    if dataset.features.repeated_data {
        item.data.clear();
        for row in &mut item.repeated_data {
            row.data = sanitize_fields(schema, std::mem::take(&mut row.data));
        }
        item.repeated_data.retain(|row| !row.data.is_empty());
    } else {
        item.repeated_data.clear();
        item.data = sanitize_fields(schema, std::mem::take(&mut item.data));
    }
}

/// Sanitizes a field list, dropping zero-byte fields.
fn sanitize_fields(schema: &DatasetSchema, fields: Vec<FieldData>) -> Vec<FieldData> {
    fields
        .into_iter()
        .filter_map(|mut field| {
            let declared_boolean = match resolve_field(schema, &field) {
                Some(definition) => {
                    field.key.clone_from(&definition.key);
                    field.name.clone_from(&definition.name);
                    field.content_type = definition.content_type;
                    if field.format.is_none() {
                        field.format = Some(definition.default_format);
                    }
                    declares_boolean(definition)
                }
                None => false,
            };
            sanitize_field(&mut field, WALK_LEVEL_TOP, declared_boolean);
            (field.byte_len() > 0).then_some(field)
        })
        .collect()
}

/// Finds the available field a payload field refers to.
fn resolve_field<'a>(schema: &'a DatasetSchema, field: &FieldData) -> Option<&'a FieldSchema> {
    if !field.key.is_empty() {
        return schema.available_field(&field.key);
    }
    schema.available_fields().find(|definition| !field.name.is_empty() && definition.name == field.name)
}

/// Returns true when text content of the field must be a JSON boolean.
fn declares_boolean(definition: &FieldSchema) -> bool {
    if definition.text_schema.as_deref().is_some_and(|raw| !raw.trim().is_empty()) {
        return definition
            .effective_json_schema()
            .and_then(|document| declared_json_types(&document))
            .is_some_and(|declared| declared.len() == 1 && declared.contains("boolean"));
    }
    definition.schema_key == Some(SchemaKey::Bool)
}

/// Strips payload parts that do not belong to the content type.
fn sanitize_field(field: &mut FieldData, level: u8, declared_boolean: bool) {
    match field.content_type {
        ContentType::Text => {
            let trimmed = field.content.trim();
            field.content =
                if declared_boolean { trimmed.to_ascii_lowercase() } else { trimmed.to_string() };
            field.attachments.clear();
            field.parts.clear();
        }
        ContentType::Image | ContentType::Audio | ContentType::Video => {
            field.content.clear();
            field.parts.clear();
        }
        ContentType::Multipart => {
            field.content.clear();
            field.attachments.clear();
            if level == 0 {
                field.parts.clear();
            } else {
                let mut parts = std::mem::take(&mut field.parts);
                for part in &mut parts {
                    sanitize_field(part, level - 1, false);
                }
                parts.retain(|part| part.byte_len() > 0);
                field.parts = parts;
            }
        }
        ContentType::Unknown => {
            field.content.clear();
            field.attachments.clear();
            field.parts.clear();
        }
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Result of preparing a caller batch.
#[derive(Debug, Default)]
pub struct PreparedItems {
    /// Items that passed validation, in caller order.
    pub good: Vec<IndexedItem>,
    /// Rejected items grouped by error kind.
    pub errors: ItemErrorCollector,
}

/// Sanitizes, measures, and validates a caller batch.
///
/// # Errors
///
/// Returns [`DatasetError::InvalidParam`] when the schema itself cannot be
/// compiled; item failures are collected instead.
pub fn prepare_items(
    dataset: &Dataset,
    schema: &DatasetSchema,
    items: Vec<IndexedItem>,
) -> Result<PreparedItems, DatasetError> {
    let validator = SchemaValidator::new(schema)?;
    let mut prepared = PreparedItems::default();
    for mut indexed in items {
        sanitize_item(dataset, schema, &mut indexed.item);
        indexed.item.compute_data_properties();
        match validate_item(dataset, &validator, &indexed.item) {
            Ok(()) => prepared.good.push(indexed),
            Err(err) => prepared.errors.add_error(Some(indexed.index), &err),
        }
    }
    Ok(prepared)
}

/// Validates a sanitized, measured item.
///
/// # Errors
///
/// Returns the item-level error kind for the first violation.
pub fn validate_item(dataset: &Dataset, validator: &SchemaValidator, item: &Item) -> Result<(), DatasetError> {
    if item.has_no_payload() {
        return Err(DatasetError::EmptyData("item carries no data".to_string()));
    }
    let max_size = dataset.spec.max_item_size;
    if max_size > 0 && item.data_properties.bytes > max_size {
        return Err(DatasetError::ItemDataSizeExceeded(format!(
            "item is {} bytes, limit is {max_size}",
            item.data_properties.bytes
        )));
    }
    let fields = item.data.iter().chain(item.repeated_data.iter().flat_map(|row| row.data.iter()));
    for field in fields {
        if contains_illegal_content(field) {
            return Err(DatasetError::IllegalContent(format!("field {} contains control characters", field.key)));
        }
        validator.validate_field(field)?;
    }
    Ok(())
}

/// Returns true when text content carries NUL characters.
fn contains_illegal_content(field: &FieldData) -> bool {
    field.content.contains('\0') || field.parts.iter().any(contains_illegal_content)
}

// ============================================================================
// SECTION: Output Sanitization
// ============================================================================

/// Drops unavailable fields and backfills denormalized attributes.
pub fn sanitize_output(schema: &DatasetSchema, item: &mut Item) {
    item.data = output_fields(schema, std::mem::take(&mut item.data));
    for row in &mut item.repeated_data {
        row.data = output_fields(schema, std::mem::take(&mut row.data));
    }
}

fn output_fields(schema: &DatasetSchema, fields: Vec<FieldData>) -> Vec<FieldData> {
    fields
        .into_iter()
        .filter_map(|mut field| {
            let definition = schema.available_field(&field.key)?;
            if field.name.is_empty() {
                field.name.clone_from(&definition.name);
            }
            if field.content_type == ContentType::Unknown {
                field.content_type = definition.content_type;
            }
            if field.format.is_none() {
                field.format = Some(definition.default_format);
            }
            Some(field)
        })
        .collect()
}
