// crates/dataset-core/src/core/item.rs
// ============================================================================
// Module: Item Model
// Description: Item rows, field payloads, storage properties, and snapshots.
// Purpose: Represent versioned data rows with explicit inclusion windows.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! An [`Item`] row is live in version `V` iff `add_vn <= V < del_vn`. The
//! "still live" state is `del_vn == None`; stores translate it to the max-int
//! sentinel at their boundary with [`del_vn_to_storage`] and
//! [`del_vn_from_storage`]. Payloads (`data` / `repeated_data`) may live in
//! the row or in an object-store tier named by [`DataProperties::storage`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::DatasetId;
use crate::core::identifiers::ItemId;
use crate::core::identifiers::ItemRowId;
use crate::core::identifiers::SchemaId;
use crate::core::identifiers::VersionId;
use crate::core::schema::ContentType;
use crate::core::schema::FieldFormat;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Storage sentinel for "not archived".
pub const DEL_VN_LIVE: i64 = i64::MAX;

/// Converts an optional `del_vn` into its storage representation.
#[must_use]
pub fn del_vn_to_storage(del_vn: Option<u64>) -> i64 {
    del_vn.map_or(DEL_VN_LIVE, |value| i64::try_from(value).unwrap_or(DEL_VN_LIVE))
}

/// Converts a stored `del_vn` back into its optional form.
#[must_use]
pub fn del_vn_from_storage(raw: i64) -> Option<u64> {
    if raw == DEL_VN_LIVE { None } else { u64::try_from(raw).ok() }
}

// ============================================================================
// SECTION: Field Data
// ============================================================================

/// Object-storage reference attached to a field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Storage provider label.
    #[serde(default)]
    pub provider: String,
    /// Object URI or key.
    pub uri: String,
    /// Original file name.
    #[serde(default)]
    pub name: String,
    /// Object size in bytes when known.
    #[serde(default)]
    pub size: u64,
}

/// One field of one item.
///
/// # Invariants
/// - After sanitization `parts` nest at most one level deep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldData {
    /// Schema field key.
    #[serde(default)]
    pub key: String,
    /// Display name (denormalized, not persisted).
    #[serde(default, skip_serializing)]
    pub name: String,
    /// Content type.
    #[serde(default)]
    pub content_type: ContentType,
    /// Text format.
    #[serde(default)]
    pub format: Option<FieldFormat>,
    /// Text content.
    #[serde(default)]
    pub content: String,
    /// Attachments for multi-modal content.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<ObjectRef>,
    /// Nested parts for multipart content.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<FieldData>,
}

impl FieldData {
    /// Creates a field addressed by name with text content.
    #[must_use]
    pub fn named(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    /// Creates a field addressed by key with text content.
    #[must_use]
    pub fn keyed(key: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    /// Returns the payload size in bytes.
    #[must_use]
    pub fn byte_len(&self) -> u64 {
        let attachments: usize =
            self.attachments.iter().map(|attachment| attachment.uri.len() + attachment.name.len()).sum();
        let parts: u64 = self.parts.iter().map(Self::byte_len).sum();
        u64::try_from(self.content.len() + attachments).unwrap_or(u64::MAX).saturating_add(parts)
    }

    /// Returns the number of unicode scalar values in text content.
    #[must_use]
    pub fn rune_len(&self) -> u64 {
        let own = u64::try_from(self.content.chars().count()).unwrap_or(u64::MAX);
        self.parts.iter().map(Self::rune_len).fold(own, u64::saturating_add)
    }
}

/// One row of a repeated-data item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatedRow {
    /// Fields of the row.
    #[serde(default)]
    pub data: Vec<FieldData>,
}

// ============================================================================
// SECTION: Storage Properties
// ============================================================================

/// Payload storage tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageProvider {
    /// Payload stays inside the item row.
    #[default]
    InlineRow,
    /// First object-store tier.
    ObjectStoreA,
    /// Second object-store tier.
    ObjectStoreB,
}

impl StorageProvider {
    /// Returns the stable label for the provider.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InlineRow => "inline_row",
            Self::ObjectStoreA => "object_store_a",
            Self::ObjectStoreB => "object_store_b",
        }
    }
}

/// Storage marker and size accounting for an item payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataProperties {
    /// Tier holding the payload.
    #[serde(default)]
    pub storage: StorageProvider,
    /// Object key when the payload lives outside the row.
    #[serde(default)]
    pub storage_key: Option<String>,
    /// Payload size in bytes.
    #[serde(default)]
    pub bytes: u64,
    /// Payload size in unicode scalar values.
    #[serde(default)]
    pub runes: u64,
    /// Compression applied to the stored payload, if any.
    #[serde(default)]
    pub compress_format: Option<String>,
}

/// Payload body written to object-store tiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPayload {
    /// Single-row fields.
    #[serde(default)]
    pub data: Vec<FieldData>,
    /// Repeated rows.
    #[serde(default)]
    pub repeated_data: Vec<RepeatedRow>,
}

// ============================================================================
// SECTION: Item
// ============================================================================

/// One data row.
///
/// # Invariants
/// - `add_vn >= 1` and, when archived, `del_vn > add_vn`.
/// - `item_key` is unique among live rows of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Row identifier.
    pub id: ItemRowId,
    /// Stable item identifier shared across archived rows.
    pub item_id: ItemId,
    /// Idempotency key (defaults to the item id).
    #[serde(default)]
    pub item_key: String,
    /// Owning dataset.
    pub dataset_id: DatasetId,
    /// Schema the payload was validated against.
    pub schema_id: SchemaId,
    /// Single-row payload.
    #[serde(default)]
    pub data: Vec<FieldData>,
    /// Repeated payload.
    #[serde(default)]
    pub repeated_data: Vec<RepeatedRow>,
    /// Storage marker and size accounting.
    #[serde(default)]
    pub data_properties: DataProperties,
    /// First version number the row belongs to.
    pub add_vn: u64,
    /// First version number the row no longer belongs to (`None` = live).
    #[serde(default)]
    pub del_vn: Option<u64>,
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

impl Item {
    /// Creates an unsaved item with single-row data.
    #[must_use]
    pub fn with_data(data: Vec<FieldData>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// Sets the idempotency key.
    #[must_use]
    pub fn with_item_key(mut self, item_key: impl Into<String>) -> Self {
        self.item_key = item_key.into();
        self
    }

    /// Returns true when the row is not archived.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.del_vn.is_none()
    }

    /// Returns true when the row belongs to the version with `version_num`.
    #[must_use]
    pub const fn is_live_at(&self, version_num: u64) -> bool {
        if self.add_vn > version_num {
            return false;
        }
        match self.del_vn {
            None => true,
            Some(del_vn) => version_num < del_vn,
        }
    }

    /// Returns true when the row carries no payload in memory.
    #[must_use]
    pub fn has_no_payload(&self) -> bool {
        self.data.is_empty() && self.repeated_data.is_empty()
    }

    /// Moves the payload out of the row.
    pub fn take_payload(&mut self) -> ItemPayload {
        ItemPayload {
            data: std::mem::take(&mut self.data),
            repeated_data: std::mem::take(&mut self.repeated_data),
        }
    }

    /// Restores a payload into the row.
    pub fn restore_payload(&mut self, payload: ItemPayload) {
        self.data = payload.data;
        self.repeated_data = payload.repeated_data;
    }

    /// Recomputes byte and rune accounting from the in-memory payload.
    pub fn compute_data_properties(&mut self) {
        let fields = self.data.iter().chain(self.repeated_data.iter().flat_map(|row| row.data.iter()));
        let (bytes, runes) = fields.fold((0_u64, 0_u64), |(bytes, runes), field| {
            (bytes.saturating_add(field.byte_len()), runes.saturating_add(field.rune_len()))
        });
        self.data_properties.bytes = bytes;
        self.data_properties.runes = runes;
    }
}

/// Item row pinned to a version by the snapshot builder.
///
/// # Invariants
/// - `(version_id, item.item_id)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    /// Version the snapshot belongs to.
    pub version_id: VersionId,
    /// Copied item row.
    pub item: Item,
    /// Snapshot creation time (epoch ms).
    pub snapshot_created_at_ms: i64,
}

/// Caller-supplied item tagged with its position in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedItem {
    /// Position in the caller's batch (line number for imports).
    pub index: u64,
    /// Item payload.
    pub item: Item,
}
