// crates/dataset-core/src/core/operation.rs
// ============================================================================
// Module: Dataset Operations
// Description: Barrier records and the exclusion table between op kinds.
// Purpose: Describe which mutating operations may overlap on one dataset.
// Dependencies: rand, serde
// ============================================================================

//! ## Overview
//! A [`DatasetOperation`] is an ephemeral barrier record stored per
//! (dataset, kind) in the operation store. Records expire after their TTL so
//! a crashed mutator releases its barrier on its own. The exclusion rules
//! live in [`OperationKind::conflicting_kinds`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::time::is_expired;

// ============================================================================
// SECTION: Operation Kinds
// ============================================================================

/// Mutating operation kinds guarded by barriers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Dataset creation.
    CreateDataset,
    /// File import.
    Import,
    /// Version creation.
    CreateVersion,
    /// Schema update.
    UpdateSchema,
    /// Item create/update/delete.
    WriteItem,
    /// Dataset clear.
    ClearDataset,
}

impl OperationKind {
    /// Every operation kind.
    pub const ALL: [Self; 6] = [
        Self::CreateDataset,
        Self::Import,
        Self::CreateVersion,
        Self::UpdateSchema,
        Self::WriteItem,
        Self::ClearDataset,
    ];

    /// Returns the stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateDataset => "create_dataset",
            Self::Import => "import",
            Self::CreateVersion => "create_version",
            Self::UpdateSchema => "update_schema",
            Self::WriteItem => "write_item",
            Self::ClearDataset => "clear_dataset",
        }
    }

    /// Returns the kinds that must be absent before `self` may proceed.
    ///
    /// Clear archives every live row, so it is treated like an item write.
    #[must_use]
    pub const fn conflicting_kinds(self) -> &'static [Self] {
        match self {
            Self::WriteItem | Self::ClearDataset => &[Self::CreateVersion, Self::UpdateSchema],
            Self::UpdateSchema => &[Self::WriteItem, Self::ClearDataset, Self::CreateVersion],
            Self::CreateVersion => {
                &[Self::WriteItem, Self::ClearDataset, Self::UpdateSchema, Self::CreateVersion]
            }
            Self::CreateDataset | Self::Import => &[],
        }
    }
}

// ============================================================================
// SECTION: Operation Record
// ============================================================================

/// Barrier record for one in-flight mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetOperation {
    /// Random record identifier.
    pub id: String,
    /// Operation kind.
    pub kind: OperationKind,
    /// Creation time (epoch ms).
    pub ts_ms: i64,
    /// Time-to-live in milliseconds.
    pub ttl_ms: i64,
}

impl DatasetOperation {
    /// Creates a record with a fresh random identifier.
    #[must_use]
    pub fn new(kind: OperationKind, now_ms: i64, ttl_ms: i64) -> Self {
        Self {
            id: format!("{:016x}", rand::random::<u64>()),
            kind,
            ts_ms: now_ms,
            ttl_ms,
        }
    }

    /// Returns true when the record has outlived its TTL.
    #[must_use]
    pub const fn is_expired_at(&self, now_ms: i64) -> bool {
        is_expired(self.ts_ms, self.ttl_ms, now_ms)
    }
}
