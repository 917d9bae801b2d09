// crates/dataset-engine/src/collaborators.rs
// ============================================================================
// Module: Engine Collaborators
// Description: Shared handles to the backends the engine consumes.
// Purpose: Pass one cloneable bundle of trait objects to every service.
// Dependencies: dataset-core
// ============================================================================

//! ## Overview
//! [`Collaborators`] bundles the repository, counters, barrier store, lock
//! backend, message bus, id generator, source readers, and event sink. Every
//! service holds a clone; the handles are reference counted so cloning is
//! cheap. [`Collaborators::in_memory`] wires the in-memory implementations
//! shipped by `dataset-core` for tests and single-node use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use dataset_core::IdGenerator;
use dataset_core::ItemCounter;
use dataset_core::LockBackend;
use dataset_core::MessageBus;
use dataset_core::OperationStore;
use dataset_core::RecordReaderFactory;
use dataset_core::Repository;
use dataset_core::runtime::memory::InMemoryItemCounter;
use dataset_core::runtime::memory::InMemoryLockBackend;
use dataset_core::runtime::memory::InMemoryMessageBus;
use dataset_core::runtime::memory::InMemoryOperationStore;
use dataset_core::runtime::memory::InMemoryRepository;
use dataset_core::runtime::memory::MessageReceiver;
use dataset_core::runtime::memory::SequentialIdGenerator;

use crate::events::EngineEvent;
use crate::events::EngineEventSink;

// ============================================================================
// SECTION: Collaborators
// ============================================================================

/// Backend handles shared by every engine service.
#[derive(Clone)]
pub struct Collaborators {
    /// Transactional repository.
    pub repository: Arc<dyn Repository>,
    /// Atomic item counters.
    pub counter: Arc<dyn ItemCounter>,
    /// Barrier record store.
    pub operations: Arc<dyn OperationStore>,
    /// Lease-based lock backend.
    pub locks: Arc<dyn LockBackend>,
    /// Job-run message bus.
    pub bus: Arc<dyn MessageBus>,
    /// Distributed id generator.
    pub ids: Arc<dyn IdGenerator>,
    /// Source filesystems and record readers.
    pub readers: Arc<dyn RecordReaderFactory>,
    /// Event sink.
    pub events: Arc<dyn EngineEventSink>,
}

impl Collaborators {
    /// Records an engine event.
    pub fn emit(&self, event: &EngineEvent) {
        self.events.record(event);
    }
}

/// In-memory collaborators with typed handles kept for inspection.
pub struct InMemoryCollaborators {
    /// Shared bundle handed to the engine.
    pub collaborators: Collaborators,
    /// Repository handle (fault injection, direct reads).
    pub repository: InMemoryRepository,
    /// Counter handle.
    pub counter: InMemoryItemCounter,
    /// Barrier store handle.
    pub operations: InMemoryOperationStore,
    /// Lock backend handle.
    pub locks: InMemoryLockBackend,
    /// Bus handle (sent log, injected failures).
    pub bus: InMemoryMessageBus,
    /// Receiving half of the bus.
    pub receiver: MessageReceiver,
    /// Id generator handle.
    pub ids: SequentialIdGenerator,
}

impl Collaborators {
    /// Wires the in-memory backends around `readers` and `events`.
    #[must_use]
    pub fn in_memory(
        readers: Arc<dyn RecordReaderFactory>,
        events: Arc<dyn EngineEventSink>,
    ) -> InMemoryCollaborators {
        let repository = InMemoryRepository::new();
        let counter = InMemoryItemCounter::new();
        let operations = InMemoryOperationStore::new();
        let locks = InMemoryLockBackend::new();
        let (bus, receiver) = InMemoryMessageBus::new();
        let ids = SequentialIdGenerator::default();
        let collaborators = Self {
            repository: Arc::new(repository.clone()),
            counter: Arc::new(counter.clone()),
            operations: Arc::new(operations.clone()),
            locks: Arc::new(locks.clone()),
            bus: Arc::new(bus.clone()),
            ids: Arc::new(ids.clone()),
            readers,
            events,
        };
        InMemoryCollaborators {
            collaborators,
            repository,
            counter,
            operations,
            locks,
            bus,
            receiver,
            ids,
        }
    }
}
