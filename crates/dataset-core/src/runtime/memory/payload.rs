// crates/dataset-core/src/runtime/memory/payload.rs
// ============================================================================
// Module: In-Memory Payload Driver
// Description: Object map standing in for an object-store tier.
// Purpose: Exercise tiered payload routing without network storage.
// Dependencies: async-trait
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::interfaces::PayloadDriver;
use crate::interfaces::PayloadEntry;
use crate::interfaces::PayloadError;

// ============================================================================
// SECTION: Driver
// ============================================================================

/// In-memory object map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPayloadDriver {
    objects: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryPayloadDriver {
    /// Creates an empty driver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored keys.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError`] when the object map lock is poisoned.
    pub fn keys(&self) -> Result<Vec<String>, PayloadError> {
        let objects = self.objects.lock().map_err(|_| PayloadError::Io("object map poisoned".to_string()))?;
        Ok(objects.keys().cloned().collect())
    }
}

#[async_trait]
impl PayloadDriver for InMemoryPayloadDriver {
    async fn mset_item_data(&self, entries: &[PayloadEntry]) -> Result<(), PayloadError> {
        let mut objects = self.objects.lock().map_err(|_| PayloadError::Io("object map poisoned".to_string()))?;
        for entry in entries {
            objects.insert(entry.key.clone(), entry.bytes.clone());
        }
        Ok(())
    }

    async fn mget_item_data(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, PayloadError> {
        let objects = self.objects.lock().map_err(|_| PayloadError::Io("object map poisoned".to_string()))?;
        Ok(keys.iter().map(|key| objects.get(key).cloned()).collect())
    }

    async fn delete_item_data(&self, keys: &[String]) -> Result<(), PayloadError> {
        let mut objects = self.objects.lock().map_err(|_| PayloadError::Io("object map poisoned".to_string()))?;
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }
}
