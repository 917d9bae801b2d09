// crates/dataset-core/src/runtime/memory/lock.rs
// ============================================================================
// Module: In-Memory Lock Backend
// Description: Lease table keyed by lock name.
// Purpose: Provide renewable single-holder leases without an external lock service.
// Dependencies: async-trait, tokio
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::interfaces::LockBackend;
use crate::interfaces::LockError;

// ============================================================================
// SECTION: Lock Backend
// ============================================================================

/// Current holder of one lease.
#[derive(Debug, Clone)]
struct Lease {
    holder: String,
    expires_at: Instant,
}

/// In-memory lease table. Expiry follows the tokio clock so paused-time
/// tests can advance it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLockBackend {
    leases: Arc<Mutex<BTreeMap<String, Lease>>>,
}

impl InMemoryLockBackend {
    /// Creates an empty lease table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current holder of `key`, if the lease is unexpired.
    ///
    /// # Errors
    ///
    /// Returns [`LockError`] when the lease table lock is poisoned.
    pub fn holder(&self, key: &str) -> Result<Option<String>, LockError> {
        let leases = self.leases.lock().map_err(|_| LockError::Backend("lease table poisoned".to_string()))?;
        let now = Instant::now();
        Ok(leases.get(key).filter(|lease| lease.expires_at > now).map(|lease| lease.holder.clone()))
    }
}

#[async_trait]
impl LockBackend for InMemoryLockBackend {
    async fn try_acquire(&self, key: &str, holder: &str, lease: Duration) -> Result<bool, LockError> {
        let mut leases = self.leases.lock().map_err(|_| LockError::Backend("lease table poisoned".to_string()))?;
        let now = Instant::now();
        if let Some(current) = leases.get(key)
            && current.expires_at > now
            && current.holder != holder
        {
            return Ok(false);
        }
        leases.insert(key.to_string(), Lease {
            holder: holder.to_string(),
            expires_at: now + lease,
        });
        Ok(true)
    }

    async fn renew(&self, key: &str, holder: &str, lease: Duration) -> Result<bool, LockError> {
        let mut leases = self.leases.lock().map_err(|_| LockError::Backend("lease table poisoned".to_string()))?;
        let now = Instant::now();
        match leases.get_mut(key) {
            Some(current) if current.holder == holder && current.expires_at > now => {
                current.expires_at = now + lease;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, key: &str, holder: &str) -> Result<bool, LockError> {
        let mut leases = self.leases.lock().map_err(|_| LockError::Backend("lease table poisoned".to_string()))?;
        if leases.get(key).is_some_and(|current| current.holder == holder) {
            leases.remove(key);
            return Ok(true);
        }
        Ok(false)
    }
}
