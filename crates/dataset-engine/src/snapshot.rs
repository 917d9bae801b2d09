// crates/dataset-engine/src/snapshot.rs
// ============================================================================
// Module: Snapshot Builder
// Description: Resumable copy of a version's item window into snapshots.
// Purpose: Materialize versions without blocking foreground writes.
// Dependencies: dataset-core, async-trait, tokio
// ============================================================================

//! ## Overview
//! A snapshot message names a version and a retry count. The builder takes
//! a renewable lock per version, pages through the rows with
//! `add_vn <= version_num < del_vn`, upserts them as snapshots keyed by
//! `(version_id, item_id)`, and commits the page cursor to the version row
//! under its `update_version` guard. A redelivered message resumes from the
//! committed cursor; upserts make replayed pages harmless.
//!
//! Outcome rules:
//! - Optimistic-lock conflicts mean another worker progressed; the run ends
//!   without error.
//! - Retryable errors re-enqueue the message with `retry_times + 1` until
//!   the cap, then the version is marked failed.
//! - Other errors mark the version failed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use dataset_core::DatasetError;
use dataset_core::DatasetVersion;
use dataset_core::ItemSnapshot;
use dataset_core::JobRunMessage;
use dataset_core::OpContext;
use dataset_core::PageRequest;
use dataset_core::SnapshotStatus;
use dataset_core::VersionId;
use dataset_core::core::time::now_millis;

use crate::collaborators::Collaborators;
use crate::events::EngineEvent;
use crate::events::JOB_REQUEUED;
use crate::events::LOCK_CONTENDED;
use crate::events::SNAPSHOT_COMPLETED;
use crate::events::SNAPSHOT_FAILED;
use crate::events::SNAPSHOT_PROGRESS;
use crate::events::SNAPSHOT_SUPERSEDED;
use crate::lock::DistributedLocker;
use crate::queue::JobQueue;
use crate::worker::JobRunner;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Snapshot builder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotConfig {
    /// Rows copied per page.
    pub page_size: usize,
    /// Deliveries allowed before the version is marked failed.
    pub max_retry_times: u32,
    /// Delay before a retried message is redelivered.
    pub retry_delay: Duration,
    /// Lock lease per version.
    pub max_processing: Duration,
    /// Upper bound on lease renewal.
    pub max_renew: Duration,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            max_retry_times: 5,
            retry_delay: Duration::from_secs(10),
            max_processing: Duration::from_secs(60),
            max_renew: Duration::from_secs(20 * 60),
        }
    }
}

/// Result of one snapshot delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// Every row was copied.
    Completed {
        /// Snapshot rows of the version.
        item_count: u64,
    },
    /// The version was already completed or failed.
    AlreadyTerminal,
    /// Another worker holds the version lock.
    Contended,
    /// The version was marked failed.
    Failed,
    /// Another worker advanced the version first.
    Superseded,
    /// The message was re-enqueued.
    Requeued {
        /// Retry count carried by the new message.
        retry_times: u32,
    },
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builds version snapshots from job-run messages.
#[derive(Clone)]
pub struct SnapshotBuilder {
    /// Shared backends.
    collaborators: Collaborators,
    /// Settings.
    config: SnapshotConfig,
    /// Per-version locks.
    locker: DistributedLocker,
    /// Requeue publisher.
    queue: JobQueue,
}

impl SnapshotBuilder {
    /// Creates a builder.
    #[must_use]
    pub fn new(collaborators: Collaborators, config: SnapshotConfig, queue: JobQueue) -> Self {
        let locker = DistributedLocker::new(&collaborators);
        Self {
            collaborators,
            config,
            locker,
            queue,
        }
    }

    /// Returns the lock key of a version's snapshot build.
    #[must_use]
    pub fn lock_key(version_id: VersionId) -> String {
        format!("version:{version_id}:snapshotting")
    }

    /// Handles one snapshot message.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidParam`] for a malformed message,
    /// [`DatasetError::NotFound`] for a missing version, and storage errors
    /// when neither failing the version nor requeueing succeeds.
    pub async fn build(&self, ctx: &OpContext, message: &JobRunMessage) -> Result<SnapshotOutcome, DatasetError> {
        let version_id = message.version_id()?;
        let retry_times = message.retry_times()?;
        let version = self.load_version(version_id)?;
        if version.snapshot_status.is_terminal() {
            return Ok(SnapshotOutcome::AlreadyTerminal);
        }
        if retry_times > self.config.max_retry_times {
            return self.fail(version_id, &format!("gave up after {retry_times} retries"));
        }

        match self.run_locked(ctx, version_id).await {
            Ok(outcome) => Ok(outcome),
            Err(err) if err.is_conflict() => {
                self.collaborators.emit(
                    &EngineEvent::info(SNAPSHOT_SUPERSEDED, "version advanced by another worker").version(version_id),
                );
                Ok(SnapshotOutcome::Superseded)
            }
            Err(err) if err.is_retryable() => {
                let next = retry_times.saturating_add(1);
                if next > self.config.max_retry_times {
                    return self.fail(version_id, &format!("gave up after {next} retries: {err}"));
                }
                self.queue.requeue(&message.with_retry_times(next), self.config.retry_delay).await?;
                self.collaborators.emit(
                    &EngineEvent::warn(JOB_REQUEUED, format!("snapshot retry {next} scheduled: {err}"))
                        .version(version_id)
                        .caused_by(&err),
                );
                Ok(SnapshotOutcome::Requeued {
                    retry_times: next,
                })
            }
            Err(err) => self.fail(version_id, &err.to_string()),
        }
    }

    /// Copies pages while holding the version lock.
    async fn run_locked(&self, ctx: &OpContext, version_id: VersionId) -> Result<SnapshotOutcome, DatasetError> {
        let key = Self::lock_key(version_id);
        let Some(lease) =
            self.locker.try_lock(ctx, &key, self.config.max_processing, self.config.max_renew).await?
        else {
            self.collaborators.emit(&EngineEvent::info(LOCK_CONTENDED, format!("{key} held elsewhere")).version(version_id));
            return Ok(SnapshotOutcome::Contended);
        };
        let outcome = self.copy_pages(lease.context(), version_id).await;
        // A failed release leaves the lease to expire.
        let _ = lease.release().await;
        outcome
    }

    /// Copies the version window page by page from the committed cursor.
    async fn copy_pages(&self, ctx: &OpContext, version_id: VersionId) -> Result<SnapshotOutcome, DatasetError> {
        let mut current = self.load_version(version_id)?;
        if current.snapshot_status.is_terminal() {
            return Ok(SnapshotOutcome::AlreadyTerminal);
        }
        let repository = &self.collaborators.repository;
        loop {
            ctx.check()?;
            let request = PageRequest::after(current.snapshot_progress.cursor.clone(), self.config.page_size);
            let page = repository.list_items_at_version(current.dataset_id, current.version_num, &request)?;
            let copied = u64::try_from(page.items.len()).unwrap_or(u64::MAX);
            if !page.items.is_empty() {
                let now = now_millis();
                let snapshots: Vec<ItemSnapshot> = page
                    .items
                    .into_iter()
                    .map(|item| ItemSnapshot {
                        version_id,
                        item,
                        snapshot_created_at_ms: now,
                    })
                    .collect();
                repository.upsert_snapshots(&snapshots)?;
            }
            let Some(cursor) = page.next_cursor else {
                break;
            };
            ctx.check()?;
            let mut next = current.clone();
            next.snapshot_progress.cursor = Some(cursor);
            next.snapshot_progress.processed = current.snapshot_progress.processed.saturating_add(copied);
            next.snapshot_status = SnapshotStatus::InProgress;
            next.update_version = current.update_version + 1;
            next.updated_at_ms = now_millis();
            repository.update_version(&next, current.update_version)?;
            self.collaborators.emit(
                &EngineEvent::info(
                    SNAPSHOT_PROGRESS,
                    format!("{} rows copied", next.snapshot_progress.processed),
                )
                .dataset(next.dataset_id)
                .version(version_id),
            );
            current = next;
        }

        let item_count = repository.count_snapshots(version_id)?;
        let mut done = current.clone();
        done.snapshot_status = SnapshotStatus::Completed;
        done.item_count = item_count;
        done.snapshot_progress.processed = item_count;
        done.snapshot_progress.cursor = None;
        done.update_version = current.update_version + 1;
        done.updated_at_ms = now_millis();
        repository.update_version(&done, current.update_version)?;
        self.collaborators.emit(
            &EngineEvent::info(SNAPSHOT_COMPLETED, format!("{item_count} items captured"))
                .dataset(done.dataset_id)
                .version(version_id),
        );
        Ok(SnapshotOutcome::Completed {
            item_count,
        })
    }

    /// Marks the version failed unless it is already terminal.
    fn fail(&self, version_id: VersionId, reason: &str) -> Result<SnapshotOutcome, DatasetError> {
        let version = self.load_version(version_id)?;
        if version.snapshot_status.is_terminal() {
            return Ok(SnapshotOutcome::AlreadyTerminal);
        }
        let mut failed = version.clone();
        failed.snapshot_status = SnapshotStatus::Failed;
        failed.snapshot_progress.failure = Some(reason.to_string());
        failed.update_version = version.update_version + 1;
        failed.updated_at_ms = now_millis();
        match self.collaborators.repository.update_version(&failed, version.update_version) {
            Ok(()) => {}
            Err(err) => {
                let err = DatasetError::from(err);
                if err.is_conflict() {
                    return Ok(SnapshotOutcome::Superseded);
                }
                return Err(err);
            }
        }
        self.collaborators.emit(
            &EngineEvent::error(SNAPSHOT_FAILED, reason.to_string()).dataset(version.dataset_id).version(version_id),
        );
        Ok(SnapshotOutcome::Failed)
    }

    /// Loads a version.
    fn load_version(&self, version_id: VersionId) -> Result<DatasetVersion, DatasetError> {
        self.collaborators
            .repository
            .get_version(version_id)?
            .ok_or_else(|| DatasetError::NotFound(format!("version {version_id}")))
    }
}

#[async_trait]
impl JobRunner for SnapshotBuilder {
    async fn run(&self, ctx: &OpContext, message: &JobRunMessage) -> Result<(), DatasetError> {
        self.build(ctx, message).await.map(|_| ())
    }
}
