// crates/dataset-store-sqlite/src/lib.rs
// ============================================================================
// Module: Dataset SQLite Store
// Description: Durable repository for datasets, items, versions, and jobs.
// Purpose: Persist engine state in one SQLite file with transactional writes.
// Dependencies: dataset-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`SqliteRepository`] implements the `dataset-core` repository contract on
//! a single `SQLite` database. Entity bodies are stored as JSON next to the
//! columns queries filter on; guarded updates compare the optimistic
//! counter in the `WHERE` clause and report a conflict when no row matched.
//! Security posture: database contents are untrusted and decode failures
//! surface as corruption errors.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod rows;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::store::SqliteRepository;
pub use crate::store::SqliteStoreConfig;
pub use crate::store::SqliteStoreError;
pub use crate::store::SqliteStoreMode;
pub use crate::store::SqliteSyncMode;
