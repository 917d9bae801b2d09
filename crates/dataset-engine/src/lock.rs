// crates/dataset-engine/src/lock.rs
// ============================================================================
// Module: Renewable Locks
// Description: Lease locks renewed in the background with a bounded lifetime.
// Purpose: Give background workers a context cancelled when ownership ends.
// Dependencies: dataset-core, rand, tokio
// ============================================================================

//! ## Overview
//! [`DistributedLocker::try_lock`] acquires a lease on the lock backend and
//! spawns a renewal task that extends it every third of the lease. The
//! returned [`LockLease`] exposes a child [`OpContext`] that expires after
//! the maximum renewal window and is cancelled as soon as a renewal fails.
//! Work done under the lock must run under that context.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use dataset_core::DatasetError;
use dataset_core::LockBackend;
use dataset_core::OpContext;
use tokio::task::JoinHandle;

use crate::collaborators::Collaborators;
use crate::events::EngineEvent;
use crate::events::EngineEventSink;
use crate::events::LOCK_LOST;

// ============================================================================
// SECTION: Locker
// ============================================================================

/// Acquires renewable leases on the lock backend.
#[derive(Clone)]
pub struct DistributedLocker {
    /// Lease backend.
    locks: Arc<dyn LockBackend>,
    /// Event sink for lost leases.
    events: Arc<dyn EngineEventSink>,
}

impl DistributedLocker {
    /// Creates a locker over the collaborators' lock backend.
    #[must_use]
    pub fn new(collaborators: &Collaborators) -> Self {
        Self {
            locks: Arc::clone(&collaborators.locks),
            events: Arc::clone(&collaborators.events),
        }
    }

    /// Acquires `key` once; returns `None` when another holder owns it.
    ///
    /// The lease is renewed every `lease / 3` until `max_renew` elapses.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the backend fails.
    pub async fn try_lock(
        &self,
        ctx: &OpContext,
        key: &str,
        lease: Duration,
        max_renew: Duration,
    ) -> Result<Option<LockLease>, DatasetError> {
        ctx.check()?;
        let holder = format!("{:016x}", rand::random::<u64>());
        if !self.locks.try_acquire(key, &holder, lease).await? {
            return Ok(None);
        }
        let context = ctx.with_timeout(max_renew);
        let renewal = tokio::spawn(renew_until_lost(RenewTask {
            locks: Arc::clone(&self.locks),
            events: Arc::clone(&self.events),
            key: key.to_string(),
            holder: holder.clone(),
            lease,
            context: context.clone(),
        }));
        Ok(Some(LockLease {
            locks: Arc::clone(&self.locks),
            key: key.to_string(),
            holder,
            context,
            renewal: Some(renewal),
        }))
    }
}

/// State moved into the renewal task.
struct RenewTask {
    /// Lease backend.
    locks: Arc<dyn LockBackend>,
    /// Event sink.
    events: Arc<dyn EngineEventSink>,
    /// Lock key.
    key: String,
    /// Holder token.
    holder: String,
    /// Lease length.
    lease: Duration,
    /// Context cancelled when renewal fails.
    context: OpContext,
}

/// Renews the lease until the context ends or a renewal is refused.
async fn renew_until_lost(task: RenewTask) {
    let period = (task.lease / 3).max(Duration::from_millis(1));
    loop {
        if task.context.sleep(period).await.is_err() {
            return;
        }
        let renewed = task.locks.renew(&task.key, &task.holder, task.lease).await;
        if !matches!(renewed, Ok(true)) {
            task.events.record(&EngineEvent::warn(LOCK_LOST, format!("lease on {} was not renewed", task.key)));
            task.context.cancel();
            return;
        }
    }
}

// ============================================================================
// SECTION: Lease
// ============================================================================

/// Held lease with its bounded-lifetime context.
pub struct LockLease {
    /// Lease backend.
    locks: Arc<dyn LockBackend>,
    /// Lock key.
    key: String,
    /// Holder token.
    holder: String,
    /// Context valid while the lease is owned.
    context: OpContext,
    /// Background renewal task.
    renewal: Option<JoinHandle<()>>,
}

impl LockLease {
    /// Returns the context that ends when ownership ends.
    #[must_use]
    pub const fn context(&self) -> &OpContext {
        &self.context
    }

    /// Returns the lock key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Stops renewal and releases the lease.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the backend release fails; the lease then
    /// expires on its own.
    pub async fn release(mut self) -> Result<(), DatasetError> {
        self.stop();
        self.locks.release(&self.key, &self.holder).await?;
        Ok(())
    }

    /// Aborts renewal and cancels the context.
    fn stop(&mut self) {
        if let Some(renewal) = self.renewal.take() {
            renewal.abort();
        }
        self.context.cancel();
    }
}

impl Drop for LockLease {
    fn drop(&mut self) {
        self.stop();
    }
}
