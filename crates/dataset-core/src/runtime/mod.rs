// crates/dataset-core/src/runtime/mod.rs
// ============================================================================
// Module: Dataset Runtime Rules
// Description: Schema engine, field validation, sanitization, and memory backends.
// Purpose: Hold the pure rules shared by every service and the reference collaborators.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! Pure, deterministic rules applied by the engine services, plus in-memory
//! collaborator implementations used by tests and single-node deployments.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod field_data;
pub mod memory;
pub mod sanitize;
pub mod schema;
