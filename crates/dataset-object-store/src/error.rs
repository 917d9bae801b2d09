// crates/dataset-object-store/src/error.rs
// ============================================================================
// Module: Object Store Errors
// Description: Error type shared by the payload drivers.
// Purpose: Classify backend failures before they reach the engine.
// Dependencies: dataset-core, thiserror
// ============================================================================

use dataset_core::PayloadError;
use thiserror::Error;

/// Object-store driver errors.
///
/// # Invariants
/// - Messages name keys and paths, never payload bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectStoreError {
    /// Invalid configuration or key.
    #[error("object store invalid: {0}")]
    Invalid(String),
    /// Local or network I/O failure.
    #[error("object store io error: {0}")]
    Io(String),
    /// Backend rejected the request.
    #[error("object store backend error: {0}")]
    Backend(String),
    /// Stored object exceeds the read limit.
    #[error("object too large: {key} ({actual_bytes} > {max_bytes})")]
    TooLarge {
        /// Object key.
        key: String,
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Observed size in bytes.
        actual_bytes: usize,
    },
}

impl From<ObjectStoreError> for PayloadError {
    fn from(error: ObjectStoreError) -> Self {
        match error {
            ObjectStoreError::Invalid(_) | ObjectStoreError::TooLarge { .. } => Self::Invalid(error.to_string()),
            ObjectStoreError::Io(_) | ObjectStoreError::Backend(_) => Self::Io(error.to_string()),
        }
    }
}
