// crates/dataset-core/src/core/job.rs
// ============================================================================
// Module: IO Job Model
// Description: Background import/export jobs with resumable progress.
// Purpose: Persist job state as a sequence of guarded delta commits.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! An [`IoJob`] is a state machine whose transitions are commits of a
//! [`JobDelta`] to the job row. A delta carries only what changed since the
//! last commit; the repository translates it into absolute totals and refuses
//! it when `expected_processed` no longer matches the stored pre-image.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::identifiers::DatasetId;
use crate::core::identifiers::JobId;
use crate::core::identifiers::SpaceId;
use crate::core::identifiers::VersionId;
use crate::core::item_error::ItemErrorGroup;
use crate::core::item_error::merge_error_groups;

// ============================================================================
// SECTION: Enumerations
// ============================================================================

/// IO job type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Import items from source files.
    ImportFromFile,
    /// Export items to files.
    ExportToFile,
    /// Export items into another dataset.
    ExportToDataset,
}

impl JobType {
    /// Returns the stable label for the job type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ImportFromFile => "import_from_file",
            Self::ExportToFile => "export_to_file",
            Self::ExportToDataset => "export_to_dataset",
        }
    }
}

/// IO job status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, not yet picked up.
    #[default]
    Pending,
    /// A runner has started the job.
    Running,
    /// Finished, possibly with item errors.
    Completed,
    /// Terminated by an unrecoverable error.
    Failed,
    /// Cancelled by a caller.
    Cancelled,
}

impl JobStatus {
    /// Returns true for completed, failed, and cancelled.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns the stable label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Source file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    /// Comma-separated values with a header row.
    Csv,
    /// One JSON object per line.
    Jsonl,
    /// Apache Parquet.
    Parquet,
}

impl FileFormat {
    /// Infers the format from a file extension.
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        let extension = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "csv" => Some(Self::Csv),
            "jsonl" | "ndjson" => Some(Self::Jsonl),
            "parquet" => Some(Self::Parquet),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Endpoints
// ============================================================================

/// File location for import sources or export targets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileEndpoint {
    /// Filesystem provider name.
    #[serde(default)]
    pub provider: String,
    /// Directory or file path under the provider.
    #[serde(default)]
    pub path: String,
    /// Explicit file names under `path`; empty means "every file in `path`".
    #[serde(default)]
    pub files: Vec<String>,
    /// Explicit format; inferred from the extension when absent.
    #[serde(default)]
    pub format: Option<FileFormat>,
    /// Unknown keys preserved for round-tripping.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Dataset location for imports and exports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetEndpoint {
    /// Dataset identifier.
    pub dataset_id: DatasetId,
    /// Version identifier for version-scoped exports.
    #[serde(default)]
    pub version_id: Option<VersionId>,
    /// Unknown keys preserved for round-tripping.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Job source or target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// File endpoint.
    #[serde(default)]
    pub file: Option<FileEndpoint>,
    /// Dataset endpoint.
    #[serde(default)]
    pub dataset: Option<DatasetEndpoint>,
}

/// Source column to target field mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Source column name.
    pub source: String,
    /// Target field name.
    pub target: String,
}

/// Job options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOption {
    /// Clear the dataset before importing.
    #[serde(default)]
    pub overwrite_dataset: bool,
    /// Unknown keys preserved for round-tripping.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// SECTION: Progress
// ============================================================================

/// Progress of one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubProgress {
    /// File name.
    pub name: String,
    /// Total records once the file was scanned to the end.
    #[serde(default)]
    pub total: Option<u64>,
    /// Records processed.
    #[serde(default)]
    pub processed: u64,
    /// Items added.
    #[serde(default)]
    pub added: u64,
    /// Reader cursor of the last committed record.
    #[serde(default)]
    pub cursor: u64,
    /// File fully consumed.
    #[serde(default)]
    pub completed: bool,
}

/// Absolute job progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    /// Total records once every file was scanned.
    #[serde(default)]
    pub total: Option<u64>,
    /// Records processed.
    #[serde(default)]
    pub processed: u64,
    /// Items added.
    #[serde(default)]
    pub added: u64,
    /// Per-file progress.
    #[serde(default)]
    pub sub_progresses: Vec<SubProgress>,
}

impl JobProgress {
    /// Returns the sub-progress for `name`, if recorded.
    #[must_use]
    pub fn sub_progress(&self, name: &str) -> Option<&SubProgress> {
        self.sub_progresses.iter().find(|sub| sub.name == name)
    }
}

// ============================================================================
// SECTION: IO Job
// ============================================================================

/// Background import/export job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IoJob {
    /// Job identifier.
    pub id: JobId,
    /// Tenant shard key.
    pub space_id: SpaceId,
    /// Dataset the job reads from or writes to.
    pub dataset_id: DatasetId,
    /// Job type.
    pub job_type: JobType,
    /// Source endpoint.
    #[serde(default)]
    pub source: Endpoint,
    /// Target endpoint.
    #[serde(default)]
    pub target: Endpoint,
    /// Field mappings (many-to-many).
    #[serde(default)]
    pub field_mappings: Vec<FieldMapping>,
    /// Job options.
    #[serde(default)]
    pub option: JobOption,
    /// Status.
    #[serde(default)]
    pub status: JobStatus,
    /// Progress.
    #[serde(default)]
    pub progress: JobProgress,
    /// Grouped item errors.
    #[serde(default)]
    pub errors: Vec<ItemErrorGroup>,
    /// Creator.
    #[serde(default)]
    pub created_by: String,
    /// Creation time (epoch ms).
    #[serde(default)]
    pub created_at_ms: i64,
    /// Start time (epoch ms).
    #[serde(default)]
    pub started_at_ms: Option<i64>,
    /// End time (epoch ms).
    #[serde(default)]
    pub ended_at_ms: Option<i64>,
    /// Last update time (epoch ms).
    #[serde(default)]
    pub updated_at_ms: i64,
}

impl IoJob {
    /// Creates a pending job.
    #[must_use]
    pub fn new(space_id: SpaceId, dataset_id: DatasetId, job_type: JobType) -> Self {
        Self {
            id: JobId::default(),
            space_id,
            dataset_id,
            job_type,
            source: Endpoint::default(),
            target: Endpoint::default(),
            field_mappings: Vec::new(),
            option: JobOption::default(),
            status: JobStatus::Pending,
            progress: JobProgress::default(),
            errors: Vec::new(),
            created_by: String::new(),
            created_at_ms: 0,
            started_at_ms: None,
            ended_at_ms: None,
            updated_at_ms: 0,
        }
    }
}

// ============================================================================
// SECTION: Delta
// ============================================================================

/// Incremental job update committed by a runner.
///
/// # Invariants
/// - Applied only when the stored `progress.processed` equals
///   `expected_processed`.
/// - Never applied to a job that is already terminal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobDelta {
    /// Pre-image guard on `progress.processed`.
    pub expected_processed: u64,
    /// Records processed since the last commit.
    pub delta_processed: u64,
    /// Items added since the last commit.
    pub delta_added: u64,
    /// Replacement sub-progress entries, merged by name.
    pub sub_progresses: Vec<SubProgress>,
    /// Item errors since the last commit.
    pub errors: Vec<ItemErrorGroup>,
    /// Detail cap per error kind.
    pub max_error_details: usize,
    /// New start time.
    pub started_at_ms: Option<i64>,
    /// New end time.
    pub ended_at_ms: Option<i64>,
    /// New status.
    pub status: Option<JobStatus>,
    /// New grand total.
    pub total: Option<u64>,
}

impl IoJob {
    /// Applies a runner delta to the absolute job state.
    ///
    /// # Errors
    ///
    /// Returns a conflict description when the job is terminal or the
    /// `expected_processed` guard does not match.
    pub fn apply_delta(&mut self, delta: &JobDelta, now_ms: i64) -> Result<(), String> {
        if self.status.is_terminal() {
            return Err(format!("job {} is already {}", self.id, self.status.as_str()));
        }
        if self.progress.processed != delta.expected_processed {
            return Err(format!(
                "job {} progress moved: expected processed {}, found {}",
                self.id, delta.expected_processed, self.progress.processed
            ));
        }
        self.progress.processed += delta.delta_processed;
        self.progress.added += delta.delta_added;
        for incoming in &delta.sub_progresses {
            match self.progress.sub_progresses.iter_mut().find(|sub| sub.name == incoming.name) {
                Some(existing) => *existing = incoming.clone(),
                None => self.progress.sub_progresses.push(incoming.clone()),
            }
        }
        if !delta.errors.is_empty() {
            self.errors = merge_error_groups(
                std::mem::take(&mut self.errors),
                delta.errors.clone(),
                delta.max_error_details,
            );
        }
        if delta.started_at_ms.is_some() && self.started_at_ms.is_none() {
            self.started_at_ms = delta.started_at_ms;
        }
        if delta.ended_at_ms.is_some() {
            self.ended_at_ms = delta.ended_at_ms;
        }
        if let Some(status) = delta.status {
            self.status = status;
        }
        if delta.total.is_some() {
            self.progress.total = delta.total;
        }
        self.updated_at_ms = now_ms;
        Ok(())
    }

    /// Moves the job to `status` at `at_ms`.
    ///
    /// # Errors
    ///
    /// Returns a conflict description when the job is already terminal.
    pub fn transition(&mut self, status: JobStatus, at_ms: i64) -> Result<(), String> {
        if self.status.is_terminal() {
            return Err(format!("job {} is already {}", self.id, self.status.as_str()));
        }
        self.status = status;
        if status == JobStatus::Running && self.started_at_ms.is_none() {
            self.started_at_ms = Some(at_ms);
        }
        if status.is_terminal() {
            self.ended_at_ms = Some(at_ms);
        }
        self.updated_at_ms = at_ms;
        Ok(())
    }
}
