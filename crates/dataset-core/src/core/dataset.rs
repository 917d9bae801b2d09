// crates/dataset-core/src/core/dataset.rs
// ============================================================================
// Module: Dataset Model
// Description: Top-level dataset container, limits, and feature switches.
// Purpose: Define the persisted dataset record and its write rules.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`Dataset`] owns its schemas, versions, items, snapshots, and jobs. The
//! dataset row carries the monotonic `next_version_num` that every item's
//! inclusion window is expressed against. `spec` and `features` are stored as
//! JSON blobs; unknown keys are preserved through `extra` maps.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::error::DatasetError;
use crate::core::identifiers::AppId;
use crate::core::identifiers::DatasetId;
use crate::core::identifiers::SchemaId;
use crate::core::identifiers::SpaceId;
use crate::core::operation::OperationKind;

// ============================================================================
// SECTION: Enumerations
// ============================================================================

/// Dataset lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetStatus {
    /// Dataset accepts reads and writes.
    #[default]
    Available,
    /// Dataset was soft-deleted.
    Deleted,
    /// Dataset passed its expiry time.
    Expired,
    /// Dataset is being imported into.
    Importing,
    /// Dataset is being exported.
    Exporting,
    /// Dataset is being indexed.
    Indexing,
}

impl DatasetStatus {
    /// Returns the stable storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Deleted => "deleted",
            Self::Expired => "expired",
            Self::Importing => "importing",
            Self::Exporting => "exporting",
            Self::Indexing => "indexing",
        }
    }
}

/// Dataset category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetCategory {
    /// General purpose dataset.
    #[default]
    General,
    /// Training data.
    Training,
    /// Validation data.
    Validation,
    /// Evaluation data.
    Evaluation,
}

/// Dataset visibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Visible to the whole space.
    #[default]
    Space,
    /// Visible to everyone.
    Public,
    /// Internal system dataset.
    System,
}

/// Dataset security level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    /// Public data.
    #[default]
    L1,
    /// Internal data.
    L2,
    /// Confidential data.
    L3,
    /// Restricted data.
    L4,
}

// ============================================================================
// SECTION: Spec and Features
// ============================================================================

/// Dataset limits.
///
/// # Invariants
/// - A zero limit means "unlimited".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetSpec {
    /// Maximum number of live items.
    #[serde(default)]
    pub max_item_count: i64,
    /// Maximum number of available fields in the schema.
    #[serde(default)]
    pub max_field_count: usize,
    /// Maximum payload bytes of a single item.
    #[serde(default)]
    pub max_item_size: u64,
    /// Unknown keys preserved for round-tripping.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Dataset feature switches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetFeatures {
    /// Schema may be edited after creation.
    #[serde(default)]
    pub edit_schema: bool,
    /// Items carry a list of rows instead of a single row.
    #[serde(default)]
    pub repeated_data: bool,
    /// Image, audio, video, and multipart fields are allowed.
    #[serde(default)]
    pub multi_modal: bool,
    /// Unknown keys preserved for round-tripping.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// SECTION: Dataset
// ============================================================================

/// Top-level dataset record.
///
/// # Invariants
/// - Exactly one active `schema_id`.
/// - `next_version_num` starts at 1 and never decreases.
/// - Status `deleted` or `expired` forbids item writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Dataset identifier.
    pub id: DatasetId,
    /// Tenant shard key.
    pub space_id: SpaceId,
    /// Owning application.
    #[serde(default)]
    pub app_id: AppId,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Dataset category.
    #[serde(default)]
    pub category: DatasetCategory,
    /// Business category label.
    #[serde(default)]
    pub biz_category: String,
    /// Lifecycle status.
    #[serde(default)]
    pub status: DatasetStatus,
    /// Security level.
    #[serde(default)]
    pub security_level: SecurityLevel,
    /// Visibility.
    #[serde(default)]
    pub visibility: Visibility,
    /// Limits.
    #[serde(default)]
    pub spec: DatasetSpec,
    /// Feature switches.
    #[serde(default)]
    pub features: DatasetFeatures,
    /// Current schema identifier.
    pub schema_id: SchemaId,
    /// Latest created version string, if any.
    #[serde(default)]
    pub latest_version: Option<String>,
    /// Version number the next created version will capture.
    pub next_version_num: u64,
    /// Last mutating operation kind.
    #[serde(default)]
    pub last_operation: Option<OperationKind>,
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
    /// Expiry time (epoch ms), if any.
    #[serde(default)]
    pub expired_at_ms: Option<i64>,
}

impl Dataset {
    /// Creates an unsaved, available dataset with default limits.
    #[must_use]
    pub fn new(space_id: SpaceId, name: impl Into<String>) -> Self {
        Self {
            id: DatasetId::default(),
            space_id,
            app_id: AppId::default(),
            name: name.into(),
            description: String::new(),
            category: DatasetCategory::default(),
            biz_category: String::new(),
            status: DatasetStatus::Available,
            security_level: SecurityLevel::default(),
            visibility: Visibility::default(),
            spec: DatasetSpec::default(),
            features: DatasetFeatures::default(),
            schema_id: SchemaId::default(),
            latest_version: None,
            next_version_num: 1,
            last_operation: None,
            created_by: String::new(),
            created_at_ms: 0,
            updated_by: String::new(),
            updated_at_ms: 0,
            expired_at_ms: None,
        }
    }

    /// Returns true when items may be written.
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        !matches!(self.status, DatasetStatus::Deleted | DatasetStatus::Expired)
    }

    /// Fails closed when the dataset does not accept item writes.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidParam`] for deleted or expired datasets.
    pub fn ensure_writable(&self) -> Result<(), DatasetError> {
        if self.is_writable() {
            Ok(())
        } else {
            Err(DatasetError::InvalidParam(format!(
                "dataset {} is {} and does not accept writes",
                self.id,
                self.status.as_str()
            )))
        }
    }

    /// Returns the brief embedded into versions created from this dataset.
    #[must_use]
    pub fn brief(&self) -> DatasetBrief {
        DatasetBrief {
            name: self.name.clone(),
            description: self.description.clone(),
            category: self.category,
            biz_category: self.biz_category.clone(),
            spec: self.spec.clone(),
            features: self.features.clone(),
            schema_id: self.schema_id,
            next_version_num: self.next_version_num,
            extra: Map::new(),
        }
    }
}

/// Dataset snapshot embedded into a version at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetBrief {
    /// Dataset name at creation time.
    pub name: String,
    /// Dataset description at creation time.
    #[serde(default)]
    pub description: String,
    /// Dataset category.
    #[serde(default)]
    pub category: DatasetCategory,
    /// Business category label.
    #[serde(default)]
    pub biz_category: String,
    /// Limits at creation time.
    #[serde(default)]
    pub spec: DatasetSpec,
    /// Feature switches at creation time.
    #[serde(default)]
    pub features: DatasetFeatures,
    /// Schema frozen by the version.
    pub schema_id: SchemaId,
    /// Version number captured.
    pub next_version_num: u64,
    /// Unknown keys preserved for round-tripping.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
