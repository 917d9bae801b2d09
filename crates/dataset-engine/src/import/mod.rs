// crates/dataset-engine/src/import/mod.rs
// ============================================================================
// Module: Import Pipeline
// Description: Resumable file import into a dataset.
// Purpose: Read source records, insert items in batches, and commit progress.
// Dependencies: dataset-core
// ============================================================================

//! ## Overview
//! The pipeline imports the files of one job's workspace in name order. For
//! each file it seeks to the committed cursor, reads records, maps them to
//! items, and every `flush_every` records inserts the batch with
//! `partial_add` and commits a [`JobDelta`] guarded on the job's committed
//! `processed` count. The job row is the only state that survives a crash:
//! a redelivered message resumes at the committed cursor, and replayed
//! records carry the same item keys, so they resolve to the rows already
//! stored instead of duplicating them.
//!
//! Once the dataset is full, the remaining records are only counted so the
//! job still reports the grand total of source records.
//!
//! Security posture: source files are untrusted; every record goes through
//! item sanitization and validation, and read failures become item errors.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod unit;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use dataset_core::DatasetError;
use dataset_core::FileFormat;
use dataset_core::IoJob;
use dataset_core::JobDelta;
use dataset_core::JobStatus;
use dataset_core::OpContext;
use dataset_core::SubProgress;
use dataset_core::core::item_error::DEFAULT_MAX_ERROR_DETAILS;
use dataset_core::core::time::now_millis;

use crate::collaborators::Collaborators;
use crate::events::EngineEvent;
use crate::events::IMPORT_COMPLETED;
use crate::events::IMPORT_FLUSH;
use crate::import::unit::ImportUnit;
use crate::import::unit::item_from_record;
use crate::item_service::BatchCreateOptions;
use crate::item_service::ItemService;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Import pipeline settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportConfig {
    /// Records per commit.
    pub flush_every: u64,
    /// Error details kept per kind on the job row.
    pub max_error_details: usize,
    /// Job lock lease.
    pub lock_lease: Duration,
    /// Upper bound on job lock renewal.
    pub lock_max_renew: Duration,
    /// Delay before a retried job message is redelivered.
    pub retry_delay: Duration,
    /// Redeliveries allowed before the job is failed.
    pub max_retry_times: u32,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            flush_every: 100,
            max_error_details: DEFAULT_MAX_ERROR_DETAILS,
            lock_lease: Duration::from_secs(60),
            lock_max_renew: Duration::from_secs(30 * 60),
            retry_delay: Duration::from_secs(5),
            max_retry_times: 10,
        }
    }
}

/// Final state of an import run.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportOutcome {
    /// Job row after the last commit.
    pub job: IoJob,
    /// Capacity ran out during this run.
    pub dataset_full: bool,
}

// ============================================================================
// SECTION: Workspace
// ============================================================================

/// One source file of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Name used for sub-progress.
    pub name: String,
    /// Path under the provider.
    pub path: String,
    /// Record format.
    pub format: FileFormat,
}

/// Provider and ordered files of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// Filesystem provider.
    pub provider: String,
    /// Files in import order.
    pub files: Vec<SourceFile>,
}

/// Joins a file name onto a directory path.
fn join_path(directory: &str, name: &str) -> String {
    let directory = directory.trim_end_matches('/');
    if directory.is_empty() { name.to_string() } else { format!("{directory}/{name}") }
}

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// Mutable state of one run.
struct RunState {
    /// Job row after the last commit.
    job: IoJob,
    /// Remaining records are counted only.
    dataset_full: bool,
    /// Audit operator for inserted items.
    operator: String,
}

/// Imports source files into a dataset.
#[derive(Clone)]
pub struct ImportPipeline {
    /// Shared backends.
    collaborators: Collaborators,
    /// Item writes.
    items: ItemService,
    /// Settings.
    config: ImportConfig,
}

impl ImportPipeline {
    /// Creates a pipeline.
    #[must_use]
    pub const fn new(collaborators: Collaborators, items: ItemService, config: ImportConfig) -> Self {
        Self {
            collaborators,
            items,
            config,
        }
    }

    /// Returns the pipeline settings.
    #[must_use]
    pub const fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Resolves the files of an import job.
    ///
    /// Explicit file names are taken in the given order; otherwise the
    /// source path is a single file or a directory whose files are imported
    /// in name order.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidParam`] when the job has no source file
    /// or a format cannot be determined, and source errors from the provider.
    pub fn resolve_workspace(&self, job: &IoJob) -> Result<Workspace, DatasetError> {
        let endpoint = job
            .source
            .file
            .as_ref()
            .ok_or_else(|| DatasetError::InvalidParam(format!("job {} has no source file", job.id)))?;
        let file_system = self.collaborators.readers.file_system(&endpoint.provider)?;
        let entries: Vec<(String, String)> = if endpoint.files.is_empty() {
            let stat = file_system.stat(&endpoint.path)?;
            if stat.is_dir {
                let mut listed: Vec<String> =
                    file_system.read_dir(&endpoint.path)?.into_iter().filter(|entry| !entry.is_dir).map(|entry| entry.name).collect();
                listed.sort();
                listed.into_iter().map(|name| (join_path(&endpoint.path, &name), name)).collect()
            } else {
                vec![(endpoint.path.clone(), stat.name)]
            }
        } else {
            endpoint.files.iter().map(|name| (join_path(&endpoint.path, name), name.clone())).collect()
        };
        if entries.is_empty() {
            return Err(DatasetError::InvalidParam(format!("job {} source {} holds no files", job.id, endpoint.path)));
        }
        let files = entries
            .into_iter()
            .map(|(path, name)| {
                let format = endpoint
                    .format
                    .or_else(|| FileFormat::from_path(&path))
                    .ok_or_else(|| DatasetError::InvalidParam(format!("cannot tell the format of {path}")))?;
                Ok(SourceFile {
                    name,
                    path,
                    format,
                })
            })
            .collect::<Result<Vec<SourceFile>, DatasetError>>()?;
        Ok(Workspace {
            provider: endpoint.provider.clone(),
            files,
        })
    }

    /// Runs an import job from its committed progress to completion.
    ///
    /// `ctx` should be the context of the job lock so a lost lock stops the
    /// run. A pending job with `overwrite_dataset` clears the dataset once
    /// before anything is read.
    ///
    /// # Errors
    ///
    /// Returns a retryable error when cancelled or on transient storage
    /// failures, [`DatasetError::ConcurrentDatasetOperations`] when another
    /// runner committed first, and a non-retryable error when the overwrite
    /// clear fails or the workspace is invalid.
    pub async fn run(&self, ctx: &OpContext, job: IoJob, operator: &str) -> Result<ImportOutcome, DatasetError> {
        let workspace = self.resolve_workspace(&job)?;
        let mut state = RunState {
            job,
            dataset_full: false,
            operator: operator.to_string(),
        };
        if state.job.status == JobStatus::Pending {
            self.start(ctx, &mut state).await?;
        }
        for file in &workspace.files {
            self.import_file(ctx, &mut state, &workspace.provider, file).await?;
        }

        let total = workspace
            .files
            .iter()
            .filter_map(|file| state.job.progress.sub_progress(&file.name))
            .map(|sub| sub.total.unwrap_or(sub.processed))
            .sum();
        let finished_at = now_millis();
        let delta = JobDelta {
            expected_processed: state.job.progress.processed,
            status: Some(JobStatus::Completed),
            total: Some(total),
            ended_at_ms: Some(finished_at),
            max_error_details: self.config.max_error_details,
            ..JobDelta::default()
        };
        state.job = self.collaborators.repository.apply_job_delta(state.job.id, &delta)?;
        self.collaborators.emit(
            &EngineEvent::info(
                IMPORT_COMPLETED,
                format!(
                    "total {total}, processed {}, added {}",
                    state.job.progress.processed, state.job.progress.added
                ),
            )
            .dataset(state.job.dataset_id)
            .job(state.job.id),
        );
        Ok(ImportOutcome {
            job: state.job,
            dataset_full: state.dataset_full,
        })
    }

    /// Clears the dataset when requested and commits the running status.
    async fn start(&self, ctx: &OpContext, state: &mut RunState) -> Result<(), DatasetError> {
        if state.job.option.overwrite_dataset {
            self.items.clear(ctx, state.job.dataset_id, &state.operator).await.map_err(|err| {
                DatasetError::Internal(format!("overwrite clear of dataset {} failed: {err}", state.job.dataset_id))
            })?;
        }
        let delta = JobDelta {
            expected_processed: state.job.progress.processed,
            status: Some(JobStatus::Running),
            started_at_ms: Some(now_millis()),
            max_error_details: self.config.max_error_details,
            ..JobDelta::default()
        };
        state.job = self.collaborators.repository.apply_job_delta(state.job.id, &delta)?;
        Ok(())
    }

    /// Imports one file from its committed cursor.
    async fn import_file(
        &self,
        ctx: &OpContext,
        state: &mut RunState,
        provider: &str,
        file: &SourceFile,
    ) -> Result<(), DatasetError> {
        let sub = state.job.progress.sub_progress(&file.name).cloned().unwrap_or_else(|| SubProgress {
            name: file.name.clone(),
            ..SubProgress::default()
        });
        if sub.completed {
            return Ok(());
        }
        let mut reader = self.collaborators.readers.open_reader(provider, &file.path, file.format)?;
        if sub.cursor > 0 {
            reader.seek_to_offset(sub.cursor)?;
        }
        let mut unit = ImportUnit::new(sub);
        loop {
            ctx.check().map_err(DatasetError::retryable)?;
            let index = reader.cursor();
            match reader.next_record() {
                Ok(Some(record)) => {
                    if state.dataset_full {
                        unit.skip(reader.cursor());
                    } else {
                        let item = item_from_record(&record, &state.job.field_mappings, state.job.id, &file.name, index);
                        unit.push(index, item, reader.cursor());
                    }
                    if unit.pending() >= self.config.flush_every {
                        self.flush(ctx, state, &mut unit).await?;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    unit.record_read_error(index, &file.name, &err.to_string());
                    break;
                }
            }
        }
        unit.finish(reader.cursor());
        self.flush(ctx, state, &mut unit).await
    }

    /// Inserts the queued items and commits the unit.
    async fn flush(&self, ctx: &OpContext, state: &mut RunState, unit: &mut ImportUnit) -> Result<(), DatasetError> {
        let items = unit.take_items();
        let mut added = 0;
        if !items.is_empty() {
            let options = BatchCreateOptions {
                partial_add: true,
                operator: state.operator.clone(),
            };
            let outcome = self
                .items
                .batch_create(ctx, state.job.dataset_id, items, &options)
                .await
                .map_err(|err| if err.is_conflict() { err.retryable() } else { err })?;
            added = outcome.added();
            state.dataset_full |= outcome.dataset_full;
            unit.add_errors(outcome.errors.into_groups(self.config.max_error_details));
        }
        ctx.check().map_err(DatasetError::retryable)?;
        let delta = unit.commit_delta(state.job.progress.processed, added, self.config.max_error_details);
        state.job = self.collaborators.repository.apply_job_delta(state.job.id, &delta)?;
        self.collaborators.emit(
            &EngineEvent::info(
                IMPORT_FLUSH,
                format!(
                    "{} at cursor {}: processed {}, added {}",
                    unit.sub_progress().name,
                    unit.sub_progress().cursor,
                    state.job.progress.processed,
                    state.job.progress.added
                ),
            )
            .dataset(state.job.dataset_id)
            .job(state.job.id),
        );
        Ok(())
    }
}
