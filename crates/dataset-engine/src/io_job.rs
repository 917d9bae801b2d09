// crates/dataset-engine/src/io_job.rs
// ============================================================================
// Module: IO Job Service
// Description: IO job creation, administration, and guarded execution.
// Purpose: Persist jobs before publishing them and run each under one owner.
// Dependencies: dataset-core, async-trait
// ============================================================================

//! ## Overview
//! A job is stored as pending before its run message is published; a failed
//! publish fails the job so it never sits pending without a message. A run
//! takes the job lock `dataset_io_jobs:{id}:run` and dispatches on the job
//! type under the lock's context.
//!
//! Failure handling after a run:
//! - Retryable errors requeue the message until the retry cap.
//! - Guard conflicts on the job row mean another runner progressed; the
//!   delivery is dropped.
//! - Anything else fails the job.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use dataset_core::DatasetError;
use dataset_core::DatasetId;
use dataset_core::IoJob;
use dataset_core::JobId;
use dataset_core::JobProgress;
use dataset_core::JobRunMessage;
use dataset_core::JobStatus;
use dataset_core::JobType;
use dataset_core::OpContext;
use dataset_core::Page;
use dataset_core::PageRequest;
use dataset_core::ReadOptions;
use dataset_core::core::time::now_millis;

use crate::collaborators::Collaborators;
use crate::events::EngineEvent;
use crate::events::JOB_FAILED;
use crate::events::JOB_REQUEUED;
use crate::events::JOB_SKIPPED;
use crate::events::LOCK_CONTENDED;
use crate::import::ImportPipeline;
use crate::lock::DistributedLocker;
use crate::queue::JobQueue;
use crate::worker::JobRunner;

// ============================================================================
// SECTION: Service
// ============================================================================

/// IO job operations.
#[derive(Clone)]
pub struct IoJobService {
    /// Shared backends.
    collaborators: Collaborators,
    /// Run message publisher.
    queue: JobQueue,
    /// Per-job locks.
    locker: DistributedLocker,
    /// Import runner.
    import: ImportPipeline,
}

impl IoJobService {
    /// Creates the service.
    #[must_use]
    pub fn new(collaborators: Collaborators, queue: JobQueue, import: ImportPipeline) -> Self {
        let locker = DistributedLocker::new(&collaborators);
        Self {
            collaborators,
            queue,
            locker,
            import,
        }
    }

    /// Returns the lock key of a job run.
    #[must_use]
    pub fn lock_key(job_id: JobId) -> String {
        format!("dataset_io_jobs:{job_id}:run")
    }

    /// Stores a pending job and publishes its run message.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::NotFound`] for a missing dataset,
    /// [`DatasetError::InvalidParam`] for a read-only dataset or an import
    /// without a usable source, and the publish error after the job was
    /// marked failed.
    pub async fn create_job(&self, ctx: &OpContext, job: IoJob, operator: &str) -> Result<IoJob, DatasetError> {
        ctx.check()?;
        let dataset = self
            .collaborators
            .repository
            .get_dataset(job.dataset_id, ReadOptions::master())?
            .ok_or_else(|| DatasetError::NotFound(format!("dataset {}", job.dataset_id)))?;
        if job.job_type == JobType::ImportFromFile {
            dataset.ensure_writable()?;
            self.import.resolve_workspace(&job)?;
        }
        let now = now_millis();
        let mut row = job;
        row.space_id = dataset.space_id;
        row.status = JobStatus::Pending;
        row.progress = JobProgress::default();
        row.errors = Vec::new();
        row.created_by = operator.to_string();
        row.created_at_ms = now;
        row.started_at_ms = None;
        row.ended_at_ms = None;
        row.updated_at_ms = now;
        row.id = match self.collaborators.ids.gen_multi_ids(1) {
            Ok(ids) => ids.first().map_or_else(JobId::default, |id| JobId::new(*id)),
            Err(_) => JobId::default(),
        };
        let stored = self.collaborators.repository.insert_job(&row)?;

        if let Err(err) = self.queue.enqueue_io_job(stored.space_id, stored.id, operator).await {
            self.collaborators.emit(
                &EngineEvent::error(JOB_FAILED, format!("run message not published: {err}"))
                    .dataset(stored.dataset_id)
                    .job(stored.id)
                    .caused_by(&err),
            );
            // The publish error is the one reported; a failed transition
            // leaves a pending job without a message.
            let _ = self.collaborators.repository.transition_job(stored.id, JobStatus::Failed, now_millis());
            return Err(err);
        }
        Ok(stored)
    }

    /// Loads a job.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::NotFound`] when the job is missing.
    pub fn get_job(&self, job_id: JobId) -> Result<IoJob, DatasetError> {
        self.collaborators
            .repository
            .get_job(job_id)?
            .ok_or_else(|| DatasetError::NotFound(format!("job {job_id}")))
    }

    /// Lists jobs of a dataset.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn list_jobs(&self, dataset_id: DatasetId, page: &PageRequest) -> Result<Page<IoJob>, DatasetError> {
        Ok(self.collaborators.repository.list_jobs(dataset_id, page)?)
    }

    /// Cancels a pending or running job.
    ///
    /// A running import stops at its next commit, whose guard refuses the
    /// terminal job.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::NotFound`] for a missing job and
    /// [`DatasetError::InvalidParam`] when the job already finished.
    pub fn cancel_job(&self, job_id: JobId) -> Result<IoJob, DatasetError> {
        let job = self.get_job(job_id)?;
        if job.status.is_terminal() {
            return Err(DatasetError::InvalidParam(format!("job {job_id} is already {}", job.status.as_str())));
        }
        Ok(self.collaborators.repository.transition_job(job_id, JobStatus::Cancelled, now_millis())?)
    }

    /// Handles one job run message.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidParam`] for a malformed message,
    /// [`DatasetError::NotFound`] for a missing job, and storage errors when
    /// neither requeueing nor failing the job succeeds.
    pub async fn run_job(&self, ctx: &OpContext, message: &JobRunMessage) -> Result<(), DatasetError> {
        let job_id = message.require_job_id()?;
        let job = self.get_job(job_id)?;
        if job.status.is_terminal() {
            self.collaborators.emit(
                &EngineEvent::info(JOB_SKIPPED, format!("job is {}", job.status.as_str())).dataset(job.dataset_id).job(job_id),
            );
            return Ok(());
        }
        let key = Self::lock_key(job_id);
        let config = self.import.config();
        let Some(lease) = self.locker.try_lock(ctx, &key, config.lock_lease, config.lock_max_renew).await? else {
            self.collaborators.emit(&EngineEvent::info(LOCK_CONTENDED, format!("{key} held elsewhere")).job(job_id));
            return Ok(());
        };
        let dataset_id = job.dataset_id;
        let result = self.execute(lease.context(), job, &message.operator).await;
        // A failed release leaves the lease to expire.
        let _ = lease.release().await;

        match result {
            Ok(()) => Ok(()),
            Err(err) if err.is_retryable() => {
                let next = message.retry_times()?.saturating_add(1);
                if next > config.max_retry_times {
                    return self.fail(dataset_id, job_id, &err);
                }
                self.queue.requeue(&message.with_retry_times(next), config.retry_delay).await?;
                self.collaborators.emit(
                    &EngineEvent::warn(JOB_REQUEUED, format!("job retry {next} scheduled: {err}"))
                        .dataset(dataset_id)
                        .job(job_id)
                        .caused_by(&err),
                );
                Ok(())
            }
            Err(err) if err.is_conflict() => {
                self.collaborators.emit(
                    &EngineEvent::info(JOB_SKIPPED, format!("job advanced elsewhere: {err}")).dataset(dataset_id).job(job_id),
                );
                Ok(())
            }
            Err(err) => self.fail(dataset_id, job_id, &err),
        }
    }

    /// Dispatches on the job type.
    async fn execute(&self, ctx: &OpContext, job: IoJob, operator: &str) -> Result<(), DatasetError> {
        match job.job_type {
            JobType::ImportFromFile => self.import.run(ctx, job, operator).await.map(|_| ()),
            JobType::ExportToFile | JobType::ExportToDataset => {
                Err(DatasetError::InvalidParam(format!("unsupported job type {}", job.job_type.as_str())))
            }
        }
    }

    /// Marks the job failed and records the cause.
    fn fail(&self, dataset_id: DatasetId, job_id: JobId, err: &DatasetError) -> Result<(), DatasetError> {
        self.collaborators.emit(
            &EngineEvent::error(JOB_FAILED, err.to_string()).dataset(dataset_id).job(job_id).caused_by(err),
        );
        match self.collaborators.repository.transition_job(job_id, JobStatus::Failed, now_millis()) {
            Ok(_) => Ok(()),
            Err(store_err) => {
                let store_err = DatasetError::from(store_err);
                if store_err.is_conflict() { Ok(()) } else { Err(store_err) }
            }
        }
    }
}

#[async_trait]
impl JobRunner for IoJobService {
    async fn run(&self, ctx: &OpContext, message: &JobRunMessage) -> Result<(), DatasetError> {
        self.run_job(ctx, message).await
    }
}
