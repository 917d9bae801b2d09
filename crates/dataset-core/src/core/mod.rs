// crates/dataset-core/src/core/mod.rs
// ============================================================================
// Module: Dataset Core Model
// Description: Persisted entities, identifiers, errors, and call context.
// Purpose: Group the backend-agnostic data model used by every service.
// Dependencies: serde, thiserror, semver, tokio
// ============================================================================

//! ## Overview
//! Core model types for datasets, schemas, versions, items, snapshots, jobs,
//! and barrier records, plus the shared error and cancellation types.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod context;
pub mod dataset;
pub mod error;
pub mod identifiers;
pub mod item;
pub mod item_error;
pub mod job;
pub mod message;
pub mod operation;
pub mod schema;
pub mod time;
pub mod value;
pub mod version;
