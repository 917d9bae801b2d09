// crates/dataset-core/src/core/identifiers.rs
// ============================================================================
// Module: Dataset Identifiers
// Description: Strongly typed numeric identifiers for datasets and children.
// Purpose: Prevent accidental mixing of dataset, schema, version, item, and job ids.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! All persisted identifiers are 64-bit signed integers on the wire (they are
//! produced by the id generator collaborator or by an auto-increment column).
//! Each entity gets its own newtype so a `VersionId` can never be passed where
//! a `DatasetId` is expected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identifier Macro
// ============================================================================

/// Declares an `i64` identifier newtype with the shared helper surface.
macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates an identifier from a raw value.
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw identifier value.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }

            /// Returns true when the identifier has not been assigned yet.
            #[must_use]
            pub const fn is_unset(self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                value.trim().parse::<i64>().map(Self)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

numeric_id!(
    /// Tenant shard key owning a set of datasets.
    SpaceId
);

numeric_id!(
    /// Application identifier a dataset belongs to.
    AppId
);

numeric_id!(
    /// Dataset identifier.
    DatasetId
);

numeric_id!(
    /// Dataset schema row identifier.
    SchemaId
);

numeric_id!(
    /// Dataset version identifier.
    VersionId
);

numeric_id!(
    /// Item row identifier (primary key of a single row version).
    ItemRowId
);

numeric_id!(
    /// Stable item identifier shared by every archived row of the same item.
    ItemId
);

numeric_id!(
    /// Background IO job identifier.
    JobId
);
