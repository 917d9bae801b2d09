// crates/dataset-core/src/runtime/memory/kv.rs
// ============================================================================
// Module: In-Memory Key-Value Collaborators
// Description: Item counters, barrier records, and id generation.
// Purpose: Provide atomic counters and TTL records without an external KV.
// Dependencies: crate::interfaces
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use crate::core::identifiers::DatasetId;
use crate::core::identifiers::VersionId;
use crate::core::operation::DatasetOperation;
use crate::core::operation::OperationKind;
use crate::core::time::now_millis;
use crate::interfaces::IdError;
use crate::interfaces::IdGenerator;
use crate::interfaces::ItemCounter;
use crate::interfaces::KvError;
use crate::interfaces::OperationStore;

fn poisoned(name: &str) -> KvError {
    KvError::Backend(format!("{name} lock poisoned"))
}

// ============================================================================
// SECTION: Item Counter
// ============================================================================

#[derive(Debug, Default)]
struct CounterState {
    datasets: BTreeMap<DatasetId, i64>,
    versions: BTreeMap<VersionId, u64>,
}

/// In-memory atomic item counters.
#[derive(Debug, Clone, Default)]
pub struct InMemoryItemCounter {
    state: Arc<Mutex<CounterState>>,
}

impl InMemoryItemCounter {
    /// Creates empty counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ItemCounter for InMemoryItemCounter {
    fn get_item_count(&self, dataset_id: DatasetId) -> Result<Option<i64>, KvError> {
        let state = self.state.lock().map_err(|_| poisoned("item counter"))?;
        Ok(state.datasets.get(&dataset_id).copied())
    }

    fn set_item_count(&self, dataset_id: DatasetId, count: i64) -> Result<(), KvError> {
        let mut state = self.state.lock().map_err(|_| poisoned("item counter"))?;
        state.datasets.insert(dataset_id, count);
        Ok(())
    }

    fn incr_item_count(&self, dataset_id: DatasetId, delta: i64) -> Result<i64, KvError> {
        let mut state = self.state.lock().map_err(|_| poisoned("item counter"))?;
        let counter = state.datasets.entry(dataset_id).or_insert(0);
        *counter = counter.saturating_add(delta);
        Ok(*counter)
    }

    fn mget_item_count(&self, dataset_ids: &[DatasetId]) -> Result<Vec<Option<i64>>, KvError> {
        let state = self.state.lock().map_err(|_| poisoned("item counter"))?;
        Ok(dataset_ids.iter().map(|id| state.datasets.get(id).copied()).collect())
    }

    fn get_item_count_of_version(&self, version_id: VersionId) -> Result<Option<u64>, KvError> {
        let state = self.state.lock().map_err(|_| poisoned("item counter"))?;
        Ok(state.versions.get(&version_id).copied())
    }

    fn set_item_count_of_version(&self, version_id: VersionId, count: u64) -> Result<(), KvError> {
        let mut state = self.state.lock().map_err(|_| poisoned("item counter"))?;
        state.versions.insert(version_id, count);
        Ok(())
    }
}

// ============================================================================
// SECTION: Operation Store
// ============================================================================

/// In-memory barrier record store; expired records are filtered on read.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOperationStore {
    records: Arc<Mutex<BTreeMap<(DatasetId, OperationKind), Vec<DatasetOperation>>>>,
}

impl InMemoryOperationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl OperationStore for InMemoryOperationStore {
    fn add_operation(&self, dataset_id: DatasetId, operation: &DatasetOperation) -> Result<(), KvError> {
        let mut records = self.records.lock().map_err(|_| poisoned("operation store"))?;
        records.entry((dataset_id, operation.kind)).or_default().push(operation.clone());
        Ok(())
    }

    fn del_operation(&self, dataset_id: DatasetId, kind: OperationKind, operation_id: &str) -> Result<(), KvError> {
        let mut records = self.records.lock().map_err(|_| poisoned("operation store"))?;
        if let Some(entries) = records.get_mut(&(dataset_id, kind)) {
            entries.retain(|entry| entry.id != operation_id);
        }
        Ok(())
    }

    fn mget_operations(
        &self,
        dataset_id: DatasetId,
        kinds: &[OperationKind],
    ) -> Result<BTreeMap<OperationKind, Vec<DatasetOperation>>, KvError> {
        let now = now_millis();
        let mut records = self.records.lock().map_err(|_| poisoned("operation store"))?;
        let mut outstanding = BTreeMap::new();
        for kind in kinds {
            let live: Vec<DatasetOperation> = records
                .get_mut(&(dataset_id, *kind))
                .map(|entries| {
                    entries.retain(|entry| !entry.is_expired_at(now));
                    entries.clone()
                })
                .unwrap_or_default();
            outstanding.insert(*kind, live);
        }
        Ok(outstanding)
    }
}

// ============================================================================
// SECTION: Id Generator
// ============================================================================

/// Monotonic id generator; can be switched off to exercise store fallback.
#[derive(Debug, Clone)]
pub struct SequentialIdGenerator {
    next: Arc<AtomicI64>,
    unavailable: Arc<AtomicBool>,
}

impl SequentialIdGenerator {
    /// Creates a generator handing out ids from `start`.
    #[must_use]
    pub fn starting_at(start: i64) -> Self {
        Self {
            next: Arc::new(AtomicI64::new(start)),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes subsequent calls fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

impl Default for SequentialIdGenerator {
    fn default() -> Self {
        Self::starting_at(1_000_000)
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn gen_multi_ids(&self, count: usize) -> Result<Vec<i64>, IdError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(IdError::Unavailable("sequential generator disabled".to_string()));
        }
        let count = i64::try_from(count).map_err(|_| IdError::Unavailable("id batch too large".to_string()))?;
        let first = self.next.fetch_add(count, Ordering::SeqCst);
        Ok((first .. first + count).collect())
    }
}
