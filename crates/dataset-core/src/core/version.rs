// crates/dataset-core/src/core/version.rs
// ============================================================================
// Module: Dataset Version Model
// Description: Immutable named points in dataset history.
// Purpose: Capture the version number, frozen schema, and snapshot progress.
// Dependencies: semver, serde, serde_json
// ============================================================================

//! ## Overview
//! A [`DatasetVersion`] freezes a schema and captures the dataset's
//! `next_version_num` at creation time. The snapshot builder records its
//! cursor in [`SnapshotProgress`] and moves [`SnapshotStatus`] forward with
//! optimistic-lock patches on `update_version`. Version strings follow strict
//! SemVer 2 and must increase per dataset.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::dataset::DatasetBrief;
use crate::core::error::DatasetError;
use crate::core::identifiers::DatasetId;
use crate::core::identifiers::SchemaId;
use crate::core::identifiers::VersionId;

// ============================================================================
// SECTION: Snapshot State
// ============================================================================

/// Snapshot build status of a version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    /// No snapshot page has been committed yet.
    #[default]
    Unstarted,
    /// At least one page has been committed.
    InProgress,
    /// Every live item has been copied.
    Completed,
    /// The builder gave up.
    Failed,
}

impl SnapshotStatus {
    /// Returns true for completed and failed.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Resumable snapshot cursor persisted on the version row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotProgress {
    /// Opaque item cursor of the last committed page.
    #[serde(default)]
    pub cursor: Option<String>,
    /// Number of rows copied so far.
    #[serde(default)]
    pub processed: u64,
    /// Failure reason when the snapshot failed.
    #[serde(default)]
    pub failure: Option<String>,
    /// Unknown keys preserved for round-tripping.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// SECTION: Version
// ============================================================================

/// Immutable named point in a dataset's history.
///
/// # Invariants
/// - `version` is strict SemVer 2 and strictly greater than every earlier
///   version of the same dataset.
/// - `version_num` equals the dataset's `next_version_num` at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetVersion {
    /// Version identifier.
    pub id: VersionId,
    /// Owning dataset.
    pub dataset_id: DatasetId,
    /// Frozen schema.
    pub schema_id: SchemaId,
    /// SemVer string.
    pub version: String,
    /// Captured version number.
    pub version_num: u64,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Number of items in the version once the snapshot completes.
    #[serde(default)]
    pub item_count: u64,
    /// Snapshot build status.
    #[serde(default)]
    pub snapshot_status: SnapshotStatus,
    /// Snapshot cursor.
    #[serde(default)]
    pub snapshot_progress: SnapshotProgress,
    /// Optimistic-lock counter.
    #[serde(default)]
    pub update_version: u64,
    /// Dataset state at creation time.
    pub dataset_brief: DatasetBrief,
    /// Creator.
    #[serde(default)]
    pub created_by: String,
    /// Creation time (epoch ms).
    #[serde(default)]
    pub created_at_ms: i64,
    /// Last update time (epoch ms).
    #[serde(default)]
    pub updated_at_ms: i64,
    /// Time the version was disabled (epoch ms), if any.
    #[serde(default)]
    pub disabled_at_ms: Option<i64>,
}

// ============================================================================
// SECTION: SemVer
// ============================================================================

/// Parses a strict SemVer 2 version string.
///
/// # Errors
///
/// Returns [`DatasetError::InvalidParam`] when the string is not strict SemVer 2.
pub fn parse_semver(raw: &str) -> Result<semver::Version, DatasetError> {
    semver::Version::parse(raw)
        .map_err(|err| DatasetError::InvalidParam(format!("invalid semver {raw:?}: {err}")))
}

/// Compares two versions by SemVer 2 precedence (build metadata ignored).
#[must_use]
pub fn semver_precedence(left: &semver::Version, right: &semver::Version) -> Ordering {
    (left.major, left.minor, left.patch)
        .cmp(&(right.major, right.minor, right.patch))
        .then_with(|| left.pre.cmp(&right.pre))
}

/// Ensures `next` is strictly greater than `latest` (when present).
///
/// # Errors
///
/// Returns [`DatasetError::InvalidParam`] when either string is invalid or
/// `next` does not advance past `latest`.
pub fn ensure_version_advances(latest: Option<&str>, next: &str) -> Result<(), DatasetError> {
    let next_version = parse_semver(next)?;
    let Some(latest) = latest else {
        return Ok(());
    };
    let latest_version = parse_semver(latest)?;
    if semver_precedence(&next_version, &latest_version) == Ordering::Greater {
        Ok(())
    } else {
        Err(DatasetError::InvalidParam(format!(
            "version {next} must be greater than latest version {latest}"
        )))
    }
}
