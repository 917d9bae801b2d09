// crates/dataset-engine/src/engine.rs
// ============================================================================
// Module: Dataset Engine
// Description: Service wiring from collaborators and configuration.
// Purpose: Build every service over one shared collaborator bundle.
// Dependencies: dataset-core
// ============================================================================

//! ## Overview
//! [`DatasetEngine`] owns one instance of each service. All services share
//! the same collaborators, barrier settings, and payload tiers, so a write
//! through any of them observes the same coordination records.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use dataset_core::DatasetError;
use dataset_core::PayloadDriver;
use dataset_core::StorageProvider;
use dataset_core::core::message::IO_JOB_TYPE;
use dataset_core::core::message::SNAPSHOT_JOB_TYPE;

use crate::barrier::BarrierConfig;
use crate::barrier::OperationBarrier;
use crate::collaborators::Collaborators;
use crate::dataset_service::DatasetService;
use crate::import::ImportConfig;
use crate::import::ImportPipeline;
use crate::io_job::IoJobService;
use crate::item_service::ItemService;
use crate::payload::TierConfig;
use crate::payload::TieredPayloadStore;
use crate::queue::JobQueue;
use crate::schema_service::SchemaService;
use crate::snapshot::SnapshotBuilder;
use crate::snapshot::SnapshotConfig;
use crate::version_service::VersionService;
use crate::worker::JobWorker;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Settings of every engine component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Operation barrier waits.
    pub barrier: BarrierConfig,
    /// Snapshot builds.
    pub snapshot: SnapshotConfig,
    /// File imports.
    pub import: ImportConfig,
    /// Payload tiers.
    pub tiers: TierConfig,
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Wired dataset services.
#[derive(Clone)]
pub struct DatasetEngine {
    /// Shared backends.
    collaborators: Collaborators,
    /// Dataset lifecycle.
    datasets: DatasetService,
    /// Item writes and reads.
    items: ItemService,
    /// Schema edits.
    schemas: SchemaService,
    /// Versions.
    versions: VersionService,
    /// Snapshot builds.
    snapshots: SnapshotBuilder,
    /// IO jobs.
    jobs: IoJobService,
}

impl DatasetEngine {
    /// Builds the engine.
    ///
    /// `drivers` must hold a driver for every object-store tier in
    /// `config.tiers`.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidParam`] when the tier table is invalid
    /// or a tier has no driver.
    pub fn new(
        collaborators: Collaborators,
        drivers: BTreeMap<StorageProvider, Arc<dyn PayloadDriver>>,
        config: EngineConfig,
    ) -> Result<Self, DatasetError> {
        let payloads = TieredPayloadStore::new(config.tiers, drivers)?;
        let barrier = OperationBarrier::new(collaborators.clone(), config.barrier);
        let queue = JobQueue::new(Arc::clone(&collaborators.bus));
        let items = ItemService::new(collaborators.clone(), barrier.clone(), payloads);
        let import = ImportPipeline::new(collaborators.clone(), items.clone(), config.import);
        Ok(Self {
            datasets: DatasetService::new(collaborators.clone(), barrier.clone()),
            schemas: SchemaService::new(collaborators.clone(), barrier.clone()),
            versions: VersionService::new(collaborators.clone(), barrier, queue.clone(), items.clone()),
            snapshots: SnapshotBuilder::new(collaborators.clone(), config.snapshot, queue.clone()),
            jobs: IoJobService::new(collaborators.clone(), queue, import),
            items,
            collaborators,
        })
    }

    /// Returns the shared collaborators.
    #[must_use]
    pub const fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Returns the dataset service.
    #[must_use]
    pub const fn datasets(&self) -> &DatasetService {
        &self.datasets
    }

    /// Returns the item service.
    #[must_use]
    pub const fn items(&self) -> &ItemService {
        &self.items
    }

    /// Returns the schema service.
    #[must_use]
    pub const fn schemas(&self) -> &SchemaService {
        &self.schemas
    }

    /// Returns the version service.
    #[must_use]
    pub const fn versions(&self) -> &VersionService {
        &self.versions
    }

    /// Returns the snapshot builder.
    #[must_use]
    pub const fn snapshots(&self) -> &SnapshotBuilder {
        &self.snapshots
    }

    /// Returns the IO job service.
    #[must_use]
    pub const fn jobs(&self) -> &IoJobService {
        &self.jobs
    }

    /// Returns a worker routing snapshot and IO job messages to this engine.
    #[must_use]
    pub fn worker(&self) -> JobWorker {
        JobWorker::new(Arc::clone(&self.collaborators.events))
            .register(SNAPSHOT_JOB_TYPE, Arc::new(self.snapshots.clone()))
            .register(IO_JOB_TYPE, Arc::new(self.jobs.clone()))
    }
}
