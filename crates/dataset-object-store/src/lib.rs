// crates/dataset-object-store/src/lib.rs
// ============================================================================
// Module: Dataset Object Store
// Description: Payload drivers for the object-store tiers.
// Purpose: Persist offloaded item payloads in S3-compatible or local storage.
// Dependencies: dataset-core, aws-sdk-s3, cap-std, tokio
// ============================================================================

//! ## Overview
//! Two [`dataset_core::PayloadDriver`] implementations back the object-store
//! tiers of the tiered payload store:
//!
//! - [`S3PayloadDriver`] writes each payload as one object in an
//!   S3-compatible bucket under an optional prefix.
//! - [`LocalPayloadDriver`] writes each payload as one file below a root
//!   directory, opened as a capability so keys cannot escape it.
//!
//! Storage keys are validated before they reach either backend; reads of a
//! missing key return `None` and deletes of a missing key succeed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod error;
pub mod key;
pub mod local;
pub mod s3;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::error::ObjectStoreError;
pub use crate::local::LocalPayloadDriver;
pub use crate::s3::S3PayloadConfig;
pub use crate::s3::S3PayloadDriver;
