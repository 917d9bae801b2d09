// crates/dataset-engine/src/barrier.rs
// ============================================================================
// Module: Operation Barrier
// Description: Per-dataset TTL records excluding conflicting mutations.
// Purpose: Serialize write, schema, and version operations on one dataset.
// Dependencies: dataset-core, tokio
// ============================================================================

//! ## Overview
//! A barrier is a short-lived [`DatasetOperation`] record in the operation
//! store. Before inserting its own record, an operation waits until no
//! record of a conflicting kind remains, polling with exponential backoff.
//! Records carry a TTL so a crashed mutator releases its barrier once the
//! TTL elapses; [`BarrierGuard`] deletes the record on release or drop.
//!
//! | Pending op | Waits until there is none of |
//! |---|---|
//! | write-item, clear-dataset | create-version, update-schema |
//! | update-schema | write-item, clear-dataset, create-version |
//! | create-version | write-item, clear-dataset, update-schema, create-version |

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use dataset_core::DatasetError;
use dataset_core::DatasetId;
use dataset_core::DatasetOperation;
use dataset_core::OpContext;
use dataset_core::OperationKind;
use dataset_core::OperationStore;
use dataset_core::core::time::now_millis;
use tokio::time::Instant;

use crate::collaborators::Collaborators;
use crate::events::BARRIER_WAIT_TIMEOUT;
use crate::events::EngineEvent;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Backoff and TTL settings for barrier waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierConfig {
    /// First poll delay.
    pub initial_backoff: Duration,
    /// Upper bound on one poll delay.
    pub max_backoff: Duration,
    /// Total wait per conflicting kind before failing.
    pub max_wait: Duration,
    /// Lifetime of an inserted barrier record.
    pub ttl: Duration,
}

impl Default for BarrierConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(10),
            max_wait: Duration::from_secs(60),
            ttl: Duration::from_secs(60),
        }
    }
}

// ============================================================================
// SECTION: Barrier
// ============================================================================

/// Acquires operation barriers for datasets.
#[derive(Clone)]
pub struct OperationBarrier {
    /// Shared backends.
    collaborators: Collaborators,
    /// Wait settings.
    config: BarrierConfig,
}

impl OperationBarrier {
    /// Creates a barrier over the collaborators' operation store.
    #[must_use]
    pub const fn new(collaborators: Collaborators, config: BarrierConfig) -> Self {
        Self {
            collaborators,
            config,
        }
    }

    /// Waits for conflicting operations to clear and inserts a `kind` record.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::ConcurrentDatasetOperations`] when a
    /// conflicting kind is still present after `max_wait`, the context error
    /// when cancelled, or a storage error from the operation store.
    pub async fn acquire(
        &self,
        ctx: &OpContext,
        dataset_id: DatasetId,
        kind: OperationKind,
    ) -> Result<BarrierGuard, DatasetError> {
        for conflicting in kind.conflicting_kinds() {
            self.wait_clear(ctx, dataset_id, kind, *conflicting).await?;
        }
        let ttl_ms = i64::try_from(self.config.ttl.as_millis()).unwrap_or(i64::MAX);
        let operation = DatasetOperation::new(kind, now_millis(), ttl_ms);
        self.collaborators.operations.add_operation(dataset_id, &operation)?;
        Ok(BarrierGuard {
            store: Arc::clone(&self.collaborators.operations),
            dataset_id,
            operation: Some(operation),
        })
    }

    /// Polls until no unexpired `conflicting` record remains.
    async fn wait_clear(
        &self,
        ctx: &OpContext,
        dataset_id: DatasetId,
        kind: OperationKind,
        conflicting: OperationKind,
    ) -> Result<(), DatasetError> {
        let started = Instant::now();
        let mut backoff = self.config.initial_backoff;
        loop {
            ctx.check()?;
            let outstanding = self.collaborators.operations.mget_operations(dataset_id, &[conflicting])?;
            if outstanding.get(&conflicting).is_none_or(Vec::is_empty) {
                return Ok(());
            }
            let elapsed = started.elapsed();
            if elapsed >= self.config.max_wait {
                let message = format!(
                    "{} on dataset {dataset_id} waited {}ms for {} to finish",
                    kind.as_str(),
                    elapsed.as_millis(),
                    conflicting.as_str()
                );
                self.collaborators.emit(&EngineEvent::warn(BARRIER_WAIT_TIMEOUT, message.clone()).dataset(dataset_id));
                return Err(DatasetError::ConcurrentDatasetOperations(message));
            }
            let remaining = self.config.max_wait.saturating_sub(elapsed);
            ctx.sleep(backoff.min(remaining)).await?;
            backoff = backoff.saturating_mul(2).min(self.config.max_backoff);
        }
    }
}

// ============================================================================
// SECTION: Guard
// ============================================================================

/// Held barrier record; deleted on [`BarrierGuard::release`] or drop.
pub struct BarrierGuard {
    /// Store holding the record.
    store: Arc<dyn OperationStore>,
    /// Dataset the record belongs to.
    dataset_id: DatasetId,
    /// Record still to delete.
    operation: Option<DatasetOperation>,
}

impl BarrierGuard {
    /// Returns the held operation kind.
    #[must_use]
    pub fn kind(&self) -> Option<OperationKind> {
        self.operation.as_ref().map(|operation| operation.kind)
    }

    /// Deletes the barrier record.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the record cannot be deleted; the record
    /// then expires after its TTL.
    pub fn release(mut self) -> Result<(), DatasetError> {
        self.delete()
    }

    /// Deletes the record once.
    fn delete(&mut self) -> Result<(), DatasetError> {
        if let Some(operation) = self.operation.take() {
            self.store.del_operation(self.dataset_id, operation.kind, &operation.id)?;
        }
        Ok(())
    }
}

impl Drop for BarrierGuard {
    fn drop(&mut self) {
        let _ = self.delete();
    }
}
