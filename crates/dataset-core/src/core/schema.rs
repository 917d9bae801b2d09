// crates/dataset-core/src/core/schema.rs
// ============================================================================
// Module: Dataset Schema Model
// Description: Versioned field schemas with stable keys and tombstones.
// Purpose: Describe item payload shape for validation and sanitization.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`DatasetSchema`] is an ordered collection of [`FieldSchema`] entries.
//! Field keys are stable identities; deleted fields stay in the list as
//! tombstones ([`FieldStatus::Deleted`]) so historical item payloads keep
//! their meaning across versions. Schema rows carry an `update_version`
//! optimistic-lock counter and become immutable once a version freezes them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::identifiers::DatasetId;
use crate::core::identifiers::SchemaId;

// ============================================================================
// SECTION: Field Enumerations
// ============================================================================

/// Field content type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Plain text content.
    #[default]
    Text,
    /// Image attachments.
    Image,
    /// Audio attachments.
    Audio,
    /// Video attachments.
    Video,
    /// Nested parts of mixed content types.
    Multipart,
    /// Content type this build does not understand.
    #[serde(other)]
    Unknown,
}

impl ContentType {
    /// Returns true for image, audio, video, and multipart.
    #[must_use]
    pub const fn is_multi_modal(self) -> bool {
        matches!(self, Self::Image | Self::Audio | Self::Video | Self::Multipart)
    }

    /// Returns true for content types carried as attachments.
    #[must_use]
    pub const fn is_attachment(self) -> bool {
        matches!(self, Self::Image | Self::Audio | Self::Video)
    }
}

/// Default rendering format for text content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldFormat {
    /// Plain text.
    #[default]
    Plain,
    /// Markdown.
    Markdown,
    /// JSON document.
    Json,
    /// YAML document.
    Yaml,
    /// Source code.
    Code,
}

/// Scalar selector for text fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKey {
    /// Any string.
    String,
    /// JSON integer.
    Integer,
    /// JSON number.
    Float,
    /// JSON boolean.
    Bool,
    /// Chat message list.
    Message,
}

impl SchemaKey {
    /// Returns the JSON-Schema document implied by the selector.
    ///
    /// `String` yields no schema because any text is acceptable.
    #[must_use]
    pub fn json_schema(self) -> Option<Value> {
        let type_name = match self {
            Self::String => return None,
            Self::Integer => "integer",
            Self::Float => "number",
            Self::Bool => "boolean",
            Self::Message => "array",
        };
        let mut schema = Map::new();
        schema.insert("type".to_string(), Value::String(type_name.to_string()));
        Some(Value::Object(schema))
    }

    /// Returns true when values accepted by `self` remain accepted by `next`.
    #[must_use]
    pub const fn widens_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::String, Self::String)
                | (Self::Integer, Self::Integer | Self::Float | Self::String)
                | (Self::Float, Self::Float | Self::String)
                | (Self::Bool, Self::Bool | Self::String)
                | (Self::Message, Self::Message | Self::String)
        )
    }
}

/// Field lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStatus {
    /// Field is part of the current schema.
    #[default]
    Available,
    /// Field was removed and is kept as a tombstone.
    Deleted,
}

// ============================================================================
// SECTION: Field Schema
// ============================================================================

/// Limits for attachment-carrying fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiModalSpec {
    /// Maximum number of attachments (zero means unlimited).
    #[serde(default)]
    pub max_file_count: usize,
    /// Maximum bytes per attachment (zero means unlimited).
    #[serde(default)]
    pub max_file_size: u64,
    /// Accepted file extensions or mime types.
    #[serde(default)]
    pub supported_formats: Vec<String>,
}

/// One field of a dataset schema.
///
/// # Invariants
/// - `key` matches `^[A-Za-z][A-Za-z0-9_]{0,63}$`, is unique within the
///   schema, and is never the reserved word `key`.
/// - `name` is unique among available fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Stable field identity; empty until generated.
    #[serde(default)]
    pub key: String,
    /// Display name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Content type.
    #[serde(default)]
    pub content_type: ContentType,
    /// Default text format.
    #[serde(default)]
    pub default_format: FieldFormat,
    /// Scalar selector for text fields.
    #[serde(default)]
    pub schema_key: Option<SchemaKey>,
    /// Inline JSON-Schema document for text fields.
    #[serde(default)]
    pub text_schema: Option<String>,
    /// Attachment limits for multi-modal fields.
    #[serde(default)]
    pub multi_modal_spec: Option<MultiModalSpec>,
    /// Lifecycle status.
    #[serde(default)]
    pub status: FieldStatus,
    /// Hidden from default views.
    #[serde(default)]
    pub hidden: bool,
    /// Unknown keys preserved for round-tripping.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FieldSchema {
    /// Creates an available text field with the given name.
    #[must_use]
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the field key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Sets the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    /// Sets the scalar selector.
    #[must_use]
    pub fn with_schema_key(mut self, schema_key: SchemaKey) -> Self {
        self.schema_key = Some(schema_key);
        self
    }

    /// Returns true when the field is part of the current schema.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status == FieldStatus::Available
    }

    /// Returns the JSON-Schema used to validate text content, if any.
    ///
    /// The inline document wins over the scalar selector. Returns `None` when
    /// the inline document is not valid JSON; schema validation reports that
    /// case separately.
    #[must_use]
    pub fn effective_json_schema(&self) -> Option<Value> {
        if let Some(raw) = self.text_schema.as_deref().filter(|raw| !raw.trim().is_empty()) {
            return serde_json::from_str(raw).ok();
        }
        self.schema_key.and_then(SchemaKey::json_schema)
    }
}

// ============================================================================
// SECTION: Dataset Schema
// ============================================================================

/// Versioned collection of fields for a dataset.
///
/// # Invariants
/// - `update_version` increases by one on every committed change.
/// - Once `immutable` is set the row is never modified again; schema edits
///   insert a new row instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSchema {
    /// Schema identifier.
    pub id: SchemaId,
    /// Owning dataset.
    pub dataset_id: DatasetId,
    /// Ordered fields including tombstones.
    pub fields: Vec<FieldSchema>,
    /// Frozen by a created version.
    #[serde(default)]
    pub immutable: bool,
    /// Optimistic-lock counter.
    #[serde(default)]
    pub update_version: u64,
    /// Creator.
    #[serde(default)]
    pub created_by: String,
    /// Creation time (epoch ms).
    #[serde(default)]
    pub created_at_ms: i64,
    /// Last updater.
    #[serde(default)]
    pub updated_by: String,
    /// Last update time (epoch ms).
    #[serde(default)]
    pub updated_at_ms: i64,
}

impl DatasetSchema {
    /// Creates an unsaved, mutable schema.
    #[must_use]
    pub const fn new(dataset_id: DatasetId, fields: Vec<FieldSchema>) -> Self {
        Self {
            id: SchemaId::new(0),
            dataset_id,
            fields,
            immutable: false,
            update_version: 0,
            created_by: String::new(),
            created_at_ms: 0,
            updated_by: String::new(),
            updated_at_ms: 0,
        }
    }

    /// Returns the available fields in schema order.
    pub fn available_fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields.iter().filter(|field| field.is_available())
    }

    /// Finds an available field by key.
    #[must_use]
    pub fn available_field(&self, key: &str) -> Option<&FieldSchema> {
        self.available_fields().find(|field| field.key == key)
    }
}
