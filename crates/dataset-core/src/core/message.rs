// crates/dataset-core/src/core/message.rs
// ============================================================================
// Module: Job Run Messages
// Description: Message-bus envelopes consumed by background workers.
// Purpose: Carry job identity and retry state between enqueue and run.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`JobRunMessage`] is delivered at least once. Snapshot messages carry the
//! version id and retry count in `extra`; IO job messages carry the job id.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::error::DatasetError;
use crate::core::identifiers::JobId;
use crate::core::identifiers::SpaceId;
use crate::core::identifiers::VersionId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Message type for snapshot builds.
pub const SNAPSHOT_JOB_TYPE: &str = "dataset_snapshot_job";
/// Message type for IO jobs.
pub const IO_JOB_TYPE: &str = "dataset_io_job";
/// Extra key holding the version id of a snapshot message.
pub const EXTRA_VERSION_ID: &str = "version_id";
/// Extra key holding the retry count of a snapshot message.
pub const EXTRA_RETRY_TIMES: &str = "retry_times";

// ============================================================================
// SECTION: Message
// ============================================================================

/// Job-run message envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRunMessage {
    /// Message type.
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Tenant shard key.
    pub space_id: SpaceId,
    /// Job identifier for IO jobs.
    #[serde(default)]
    pub job_id: Option<JobId>,
    /// Run identifier, if any.
    #[serde(default)]
    pub run_id: Option<i64>,
    /// String attributes.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
    /// Operator that triggered the message.
    #[serde(default)]
    pub operator: String,
}

impl JobRunMessage {
    /// Builds a snapshot message for a version.
    #[must_use]
    pub fn snapshot(space_id: SpaceId, version_id: VersionId, retry_times: u32, operator: &str) -> Self {
        let mut extra = BTreeMap::new();
        extra.insert(EXTRA_VERSION_ID.to_string(), version_id.to_string());
        extra.insert(EXTRA_RETRY_TIMES.to_string(), retry_times.to_string());
        Self {
            msg_type: SNAPSHOT_JOB_TYPE.to_string(),
            space_id,
            job_id: None,
            run_id: None,
            extra,
            operator: operator.to_string(),
        }
    }

    /// Builds an IO job message.
    #[must_use]
    pub fn io_job(space_id: SpaceId, job_id: JobId, operator: &str) -> Self {
        Self {
            msg_type: IO_JOB_TYPE.to_string(),
            space_id,
            job_id: Some(job_id),
            run_id: None,
            extra: BTreeMap::new(),
            operator: operator.to_string(),
        }
    }

    /// Returns the version id carried by a snapshot message.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidParam`] when the key is missing or malformed.
    pub fn version_id(&self) -> Result<VersionId, DatasetError> {
        let raw = self
            .extra
            .get(EXTRA_VERSION_ID)
            .ok_or_else(|| DatasetError::InvalidParam("snapshot message missing version_id".to_string()))?;
        raw.parse::<VersionId>()
            .map_err(|err| DatasetError::InvalidParam(format!("invalid version_id {raw:?}: {err}")))
    }

    /// Returns the retry count carried by a snapshot message (zero when absent).
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidParam`] when the value is malformed.
    pub fn retry_times(&self) -> Result<u32, DatasetError> {
        self.extra.get(EXTRA_RETRY_TIMES).map_or(Ok(0), |raw| {
            raw.trim()
                .parse::<u32>()
                .map_err(|err| DatasetError::InvalidParam(format!("invalid retry_times {raw:?}: {err}")))
        })
    }

    /// Returns a copy with the retry count set to `retry_times`.
    #[must_use]
    pub fn with_retry_times(&self, retry_times: u32) -> Self {
        let mut next = self.clone();
        next.extra.insert(EXTRA_RETRY_TIMES.to_string(), retry_times.to_string());
        next
    }

    /// Returns the job id carried by an IO job message.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidParam`] when the job id is missing.
    pub fn require_job_id(&self) -> Result<JobId, DatasetError> {
        self.job_id.ok_or_else(|| DatasetError::InvalidParam("io job message missing job_id".to_string()))
    }
}
