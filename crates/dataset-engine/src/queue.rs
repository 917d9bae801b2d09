// crates/dataset-engine/src/queue.rs
// ============================================================================
// Module: Job Queue
// Description: Typed publishing of job-run messages onto the message bus.
// Purpose: Keep message keys and redelivery delays consistent across services.
// Dependencies: dataset-core
// ============================================================================

//! ## Overview
//! Snapshot messages are keyed by version id and IO job messages by job id,
//! so redeliveries of one job land on the same partition. Requeues carry a
//! delay and an updated retry count.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use dataset_core::DatasetError;
use dataset_core::JobId;
use dataset_core::JobRunMessage;
use dataset_core::MessageBus;
use dataset_core::SendOptions;
use dataset_core::SpaceId;
use dataset_core::VersionId;
use dataset_core::core::message::SNAPSHOT_JOB_TYPE;

// ============================================================================
// SECTION: Queue
// ============================================================================

/// Publishes job-run messages.
#[derive(Clone)]
pub struct JobQueue {
    /// Underlying bus.
    bus: Arc<dyn MessageBus>,
}

impl JobQueue {
    /// Creates a queue over `bus`.
    #[must_use]
    pub const fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self {
            bus,
        }
    }

    /// Publishes the first snapshot message for a version.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the bus rejects the message.
    pub async fn enqueue_snapshot(
        &self,
        space_id: SpaceId,
        version_id: VersionId,
        operator: &str,
    ) -> Result<(), DatasetError> {
        let message = JobRunMessage::snapshot(space_id, version_id, 0, operator);
        self.bus.send(&message, Self::options(&message, None)).await?;
        Ok(())
    }

    /// Publishes the run message of an IO job.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the bus rejects the message.
    pub async fn enqueue_io_job(&self, space_id: SpaceId, job_id: JobId, operator: &str) -> Result<(), DatasetError> {
        let message = JobRunMessage::io_job(space_id, job_id, operator);
        self.bus.send(&message, Self::options(&message, None)).await?;
        Ok(())
    }

    /// Re-publishes `message` after `delay`.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the bus rejects the message.
    pub async fn requeue(&self, message: &JobRunMessage, delay: Duration) -> Result<(), DatasetError> {
        self.bus.send(message, Self::options(message, Some(delay))).await?;
        Ok(())
    }

    /// Returns the partition key and delay for a message.
    fn options(message: &JobRunMessage, delay: Option<Duration>) -> SendOptions {
        let key = if message.msg_type == SNAPSHOT_JOB_TYPE {
            message.version_id().ok().map(|id| id.to_string())
        } else {
            message.job_id.map(|id| id.to_string())
        };
        SendOptions {
            key,
            delay,
        }
    }
}
