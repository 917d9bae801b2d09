// crates/dataset-core/src/core/error.rs
// ============================================================================
// Module: Dataset Errors
// Description: Classified error kinds shared by every dataset service.
// Purpose: Map engine failures onto stable, user-visible kinds.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! [`DatasetError`] is the single error type returned by dataset services.
//! Every variant maps to a stable [`ErrorKind`] label used for user-visible
//! codes and for grouping item-level ingestion errors. Background workers use
//! [`DatasetError::is_retryable`] to decide between re-enqueueing a message
//! and terminating the run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Error Kinds
// ============================================================================

/// Stable error classification labels.
///
/// # Invariants
/// - Variants are stable for programmatic handling and persisted job errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Client supplied an invalid parameter.
    InvalidParam,
    /// Dataset, version, item, or job is missing.
    NotFound,
    /// Optimistic-lock mismatch or barrier wait elapsed.
    ConcurrentDatasetOperations,
    /// Item payload exceeds the dataset size limit.
    ItemDataSizeExceeded,
    /// Item payload does not match the dataset schema.
    SchemaMismatch,
    /// Dataset item capacity is exhausted.
    ExceedDatasetCapacity,
    /// Item content was rejected.
    IllegalContent,
    /// Source file could not be parsed.
    MalformedFile,
    /// Item carries no data.
    EmptyData,
    /// Schema change is incompatible with existing items.
    IncompatibleDatasetSchema,
    /// Unclassified internal failure.
    InternalError,
    /// Operation was cancelled or timed out.
    Cancelled,
}

impl ErrorKind {
    /// Returns the stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidParam => "invalid_param",
            Self::NotFound => "not_found",
            Self::ConcurrentDatasetOperations => "concurrent_dataset_operations",
            Self::ItemDataSizeExceeded => "item_data_size_exceeded",
            Self::SchemaMismatch => "schema_mismatch",
            Self::ExceedDatasetCapacity => "exceed_dataset_capacity",
            Self::IllegalContent => "illegal_content",
            Self::MalformedFile => "malformed_file",
            Self::EmptyData => "empty_data",
            Self::IncompatibleDatasetSchema => "incompatible_dataset_schema",
            Self::InternalError => "internal_error",
            Self::Cancelled => "cancelled",
        }
    }
}

// ============================================================================
// SECTION: Dataset Error
// ============================================================================

/// Errors returned by dataset services and background workers.
///
/// # Invariants
/// - Messages never embed raw item payloads.
/// - `Retryable` wraps exactly one inner error and is never nested twice.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatasetError {
    /// Invalid client parameter.
    #[error("invalid param: {0}")]
    InvalidParam(String),
    /// Missing entity.
    #[error("not found: {0}")]
    NotFound(String),
    /// Optimistic-lock mismatch or barrier timeout.
    #[error("concurrent dataset operations: {0}")]
    ConcurrentDatasetOperations(String),
    /// Item payload too large.
    #[error("item data size exceeded: {0}")]
    ItemDataSizeExceeded(String),
    /// Item payload does not match the schema.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    /// Dataset capacity exhausted.
    #[error("dataset capacity full: {0}")]
    DatasetCapacityFull(String),
    /// Rejected item content.
    #[error("illegal content: {0}")]
    IllegalContent(String),
    /// Unparseable source file.
    #[error("malformed file: {0}")]
    MalformedFile(String),
    /// Item carries no data.
    #[error("empty data: {0}")]
    EmptyData(String),
    /// Schema change rejected for a non-empty dataset.
    #[error("incompatible dataset schema: {0}")]
    IncompatibleDatasetSchema(String),
    /// Unrecoverable internal failure.
    #[error("internal error: {0}")]
    Internal(String),
    /// Transient backend failure (storage, KV, bus, object store).
    #[error("storage unavailable: {0}")]
    Storage(String),
    /// The operation context was cancelled.
    #[error("operation cancelled")]
    Cancelled,
    /// The operation context deadline elapsed.
    #[error("operation deadline exceeded")]
    DeadlineExceeded,
    /// Marker asking background workers to redeliver the message.
    #[error("retryable: {0}")]
    Retryable(Box<DatasetError>),
}

impl DatasetError {
    /// Wraps an error as retryable, flattening existing wrappers.
    #[must_use]
    pub fn retryable(self) -> Self {
        match self {
            Self::Retryable(_) => self,
            other => Self::Retryable(Box::new(other)),
        }
    }

    /// Returns the innermost error, unwrapping a retryable marker.
    #[must_use]
    pub fn inner(&self) -> &Self {
        match self {
            Self::Retryable(inner) => inner.inner(),
            other => other,
        }
    }

    /// Returns true when a background worker should redeliver the message.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Retryable(_) | Self::Storage(_) | Self::Cancelled | Self::DeadlineExceeded
        )
    }

    /// Returns true for optimistic-lock or barrier conflicts.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self.inner(), Self::ConcurrentDatasetOperations(_))
    }

    /// Returns the stable classification for the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self.inner() {
            Self::InvalidParam(_) => ErrorKind::InvalidParam,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::ConcurrentDatasetOperations(_) => ErrorKind::ConcurrentDatasetOperations,
            Self::ItemDataSizeExceeded(_) => ErrorKind::ItemDataSizeExceeded,
            Self::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            Self::DatasetCapacityFull(_) => ErrorKind::ExceedDatasetCapacity,
            Self::IllegalContent(_) => ErrorKind::IllegalContent,
            Self::MalformedFile(_) => ErrorKind::MalformedFile,
            Self::EmptyData(_) => ErrorKind::EmptyData,
            Self::IncompatibleDatasetSchema(_) => ErrorKind::IncompatibleDatasetSchema,
            Self::Cancelled | Self::DeadlineExceeded => ErrorKind::Cancelled,
            Self::Internal(_) | Self::Storage(_) | Self::Retryable(_) => ErrorKind::InternalError,
        }
    }

    /// Builds an internal error for a JSON (de)serialization failure with context.
    #[must_use]
    pub fn json(context: &str, err: &serde_json::Error) -> Self {
        Self::Internal(format!("{context}: {err}"))
    }
}
