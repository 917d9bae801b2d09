// crates/dataset-config/src/lib.rs
// ============================================================================
// Module: Dataset Config
// Description: Canonical configuration model for the dataset engine.
// Purpose: Load one TOML file into validated engine, store, and tier settings.
// Dependencies: dataset-engine, dataset-object-store, dataset-store-sqlite,
//               serde, toml
// ============================================================================

//! ## Overview
//! [`DatasetEngineConfig`] is the single source of truth for deployment
//! settings. Loading is size-capped and fails closed; every section is
//! validated before the typed engine values are handed out.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::config::BarrierSection;
pub use crate::config::ConfigError;
pub use crate::config::DatasetEngineConfig;
pub use crate::config::EventSinkKind;
pub use crate::config::EventsSection;
pub use crate::config::ImportSection;
pub use crate::config::LocalPayloadConfig;
pub use crate::config::ObjectStoreSection;
pub use crate::config::PayloadBackendConfig;
pub use crate::config::SnapshotSection;
pub use crate::config::TierSection;
