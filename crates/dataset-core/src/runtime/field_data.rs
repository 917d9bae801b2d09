// crates/dataset-core/src/runtime/field_data.rs
// ============================================================================
// Module: Field Data Validation
// Description: Validates item field content against field schemas.
// Purpose: Reject payloads that would be silently reinterpreted.
// Dependencies: jsonschema, serde_json
// ============================================================================

//! ## Overview
//! Text content is validated with the field's JSON-Schema. When the schema
//! declares a single `string` type the raw content is wrapped as a JSON
//! string; otherwise the content must itself be valid JSON, so the literal
//! `2024-01-01` never validates as an integer. Declared booleans are matched
//! case-insensitively. Attachment fields only enforce the file count limit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use jsonschema::Validator;
use serde_json::Value;

use crate::core::error::DatasetError;
use crate::core::item::FieldData;
use crate::core::schema::ContentType;
use crate::core::schema::DatasetSchema;
use crate::core::schema::FieldSchema;
use crate::runtime::schema::declared_json_types;

// ============================================================================
// SECTION: Field Validator
// ============================================================================

/// Precompiled validator for one field.
struct FieldValidator {
    /// Field content type.
    content_type: ContentType,
    /// Compiled JSON-Schema for text content.
    validator: Option<Validator>,
    /// Declared JSON types of the schema.
    declared: Option<BTreeSet<String>>,
    /// Attachment count limit (zero means unlimited).
    max_file_count: usize,
}

impl FieldValidator {
    fn compile(field: &FieldSchema) -> Result<Self, DatasetError> {
        let (validator, declared) = match field.effective_json_schema() {
            Some(document) => {
                let validator = jsonschema::validator_for(&document).map_err(|err| {
                    DatasetError::InvalidParam(format!("field {} text schema is invalid: {err}", field.key))
                })?;
                (Some(validator), declared_json_types(&document))
            }
            None => (None, None),
        };
        Ok(Self {
            content_type: field.content_type,
            validator,
            declared,
            max_file_count: field.multi_modal_spec.as_ref().map_or(0, |spec| spec.max_file_count),
        })
    }

    fn declares_only(&self, kind: &str) -> bool {
        self.declared.as_ref().is_some_and(|declared| declared.len() == 1 && declared.contains(kind))
    }

    fn validate(&self, key: &str, data: &FieldData) -> Result<(), DatasetError> {
        match self.content_type {
            ContentType::Text => self.validate_text(key, &data.content),
            ContentType::Image | ContentType::Audio | ContentType::Video => {
                if self.max_file_count > 0 && data.attachments.len() > self.max_file_count {
                    return Err(DatasetError::SchemaMismatch(format!(
                        "field {key} has {} attachments, limit is {}",
                        data.attachments.len(),
                        self.max_file_count
                    )));
                }
                Ok(())
            }
            ContentType::Multipart => Ok(()),
            ContentType::Unknown => {
                Err(DatasetError::SchemaMismatch(format!("field {key} has an unsupported content type")))
            }
        }
    }

    fn validate_text(&self, key: &str, content: &str) -> Result<(), DatasetError> {
        let Some(validator) = &self.validator else {
            return Ok(());
        };
        let instance = if self.declares_only("string") {
            Value::String(content.to_string())
        } else {
            let normalized =
                if self.declares_only("boolean") { content.to_ascii_lowercase() } else { content.to_string() };
            serde_json::from_str::<Value>(&normalized).map_err(|_| {
                DatasetError::SchemaMismatch(format!("field {key} content is not valid json for its schema"))
            })?
        };
        validator
            .validate(&instance)
            .map_err(|err| DatasetError::SchemaMismatch(format!("field {key}: {err}")))
    }
}

// ============================================================================
// SECTION: Schema Validator
// ============================================================================

/// Precompiled validators for every available field of a schema.
pub struct SchemaValidator {
    /// Validators keyed by field key.
    fields: BTreeMap<String, FieldValidator>,
}

impl SchemaValidator {
    /// Compiles validators for the available fields of `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidParam`] when a field schema does not compile.
    pub fn new(schema: &DatasetSchema) -> Result<Self, DatasetError> {
        let mut fields = BTreeMap::new();
        for field in schema.available_fields() {
            fields.insert(field.key.clone(), FieldValidator::compile(field)?);
        }
        Ok(Self {
            fields,
        })
    }

    /// Validates one field.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::SchemaMismatch`] when the field is unknown or
    /// its content does not match.
    pub fn validate_field(&self, data: &FieldData) -> Result<(), DatasetError> {
        let validator = self.fields.get(&data.key).ok_or_else(|| {
            DatasetError::SchemaMismatch(format!("field {:?} is not part of the schema", data.key))
        })?;
        validator.validate(&data.key, data)
    }

    /// Validates a list of fields.
    ///
    /// # Errors
    ///
    /// Returns the first field error.
    pub fn validate_fields(&self, data: &[FieldData]) -> Result<(), DatasetError> {
        data.iter().try_for_each(|field| self.validate_field(field))
    }
}

/// Validates one field against its schema without precompilation.
///
/// # Errors
///
/// Returns [`DatasetError::SchemaMismatch`] when the content does not match.
pub fn validate_field_data(schema: &FieldSchema, data: &FieldData) -> Result<(), DatasetError> {
    FieldValidator::compile(schema)?.validate(&schema.key, data)
}
