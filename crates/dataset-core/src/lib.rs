// crates/dataset-core/src/lib.rs
// ============================================================================
// Module: Dataset Core
// Description: Backend-agnostic data model and rules of the dataset engine.
// Purpose: Provide entities, schema rules, sanitization, and collaborator seams.
// Dependencies: serde, serde_json, jsonschema, semver, thiserror, tokio
// ============================================================================

//! ## Overview
//! Dataset core defines the versioned item model (inclusion windows
//! `add_vn <= V < del_vn`), the schema engine, field sanitization, and the
//! collaborator interfaces consumed by the engine: repository, counters,
//! operation barriers, distributed locks, payload drivers, message bus, id
//! generation, and source readers. In-memory collaborators under
//! [`runtime::memory`] back tests and single-node deployments.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

#[cfg(test)]
mod tests {
    //! Test-only lint relaxations for panic-based assertions and debug output.
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
        reason = "Test-only output and panic-based assertions are permitted."
    )]
}

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::context::CancelToken;
pub use crate::core::context::OpContext;
pub use crate::core::dataset::Dataset;
pub use crate::core::dataset::DatasetBrief;
pub use crate::core::dataset::DatasetCategory;
pub use crate::core::dataset::DatasetFeatures;
pub use crate::core::dataset::DatasetSpec;
pub use crate::core::dataset::DatasetStatus;
pub use crate::core::dataset::SecurityLevel;
pub use crate::core::dataset::Visibility;
pub use crate::core::error::DatasetError;
pub use crate::core::error::ErrorKind;
pub use crate::core::identifiers::AppId;
pub use crate::core::identifiers::DatasetId;
pub use crate::core::identifiers::ItemId;
pub use crate::core::identifiers::ItemRowId;
pub use crate::core::identifiers::JobId;
pub use crate::core::identifiers::SchemaId;
pub use crate::core::identifiers::SpaceId;
pub use crate::core::identifiers::VersionId;
pub use crate::core::item::DataProperties;
pub use crate::core::item::FieldData;
pub use crate::core::item::IndexedItem;
pub use crate::core::item::Item;
pub use crate::core::item::ItemPayload;
pub use crate::core::item::ItemSnapshot;
pub use crate::core::item::ObjectRef;
pub use crate::core::item::RepeatedRow;
pub use crate::core::item::StorageProvider;
pub use crate::core::item_error::ItemErrorCollector;
pub use crate::core::item_error::ItemErrorDetail;
pub use crate::core::item_error::ItemErrorGroup;
pub use crate::core::job::DatasetEndpoint;
pub use crate::core::job::Endpoint;
pub use crate::core::job::FieldMapping;
pub use crate::core::job::FileEndpoint;
pub use crate::core::job::FileFormat;
pub use crate::core::job::IoJob;
pub use crate::core::job::JobDelta;
pub use crate::core::job::JobOption;
pub use crate::core::job::JobProgress;
pub use crate::core::job::JobStatus;
pub use crate::core::job::JobType;
pub use crate::core::job::SubProgress;
pub use crate::core::message::JobRunMessage;
pub use crate::core::operation::DatasetOperation;
pub use crate::core::operation::OperationKind;
pub use crate::core::schema::ContentType;
pub use crate::core::schema::DatasetSchema;
pub use crate::core::schema::FieldFormat;
pub use crate::core::schema::FieldSchema;
pub use crate::core::schema::FieldStatus;
pub use crate::core::schema::MultiModalSpec;
pub use crate::core::schema::SchemaKey;
pub use crate::core::value::Record;
pub use crate::core::value::RecordValue;
pub use crate::core::version::DatasetVersion;
pub use crate::core::version::SnapshotProgress;
pub use crate::core::version::SnapshotStatus;
pub use crate::interfaces::*;
