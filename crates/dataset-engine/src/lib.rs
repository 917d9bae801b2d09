// crates/dataset-engine/src/lib.rs
// ============================================================================
// Module: Dataset Engine
// Description: Services and background pipelines of the dataset data engine.
// Purpose: Coordinate item, schema, and version mutations plus async jobs.
// Dependencies: dataset-core, async-trait, rand, serde, serde_json, tokio
// ============================================================================

//! ## Overview
//! The engine composes the collaborator seams of `dataset-core` into
//! services. Foreground mutations coordinate through per-dataset operation
//! barriers and optimistic row guards; background pipelines (snapshot
//! builds and file imports) run under renewable locks and persist every
//! state transition before acting on it, so redelivered messages resume
//! from the last committed cursor.
//!
//! [`DatasetEngine`] wires the services from a [`Collaborators`] bundle and
//! an [`EngineConfig`]; [`JobWorker`] drains the message bus.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod barrier;
pub mod collaborators;
pub mod dataset_service;
pub mod engine;
pub mod events;
pub mod import;
pub mod io_job;
pub mod item_service;
pub mod lock;
pub mod payload;
pub mod queue;
pub mod schema_service;
pub mod snapshot;
pub mod version_service;
pub mod worker;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::barrier::BarrierConfig;
pub use crate::barrier::BarrierGuard;
pub use crate::barrier::OperationBarrier;
pub use crate::collaborators::Collaborators;
pub use crate::collaborators::InMemoryCollaborators;
pub use crate::dataset_service::DatasetService;
pub use crate::engine::DatasetEngine;
pub use crate::engine::EngineConfig;
pub use crate::events::EngineEvent;
pub use crate::events::EngineEventSink;
pub use crate::events::EventLevel;
pub use crate::events::FileEventSink;
pub use crate::events::MemoryEventSink;
pub use crate::events::NoopEventSink;
pub use crate::events::StderrEventSink;
pub use crate::import::ImportConfig;
pub use crate::import::ImportOutcome;
pub use crate::import::ImportPipeline;
pub use crate::io_job::IoJobService;
pub use crate::item_service::BatchCreateOptions;
pub use crate::item_service::BatchCreateOutcome;
pub use crate::item_service::ItemService;
pub use crate::lock::DistributedLocker;
pub use crate::lock::LockLease;
pub use crate::payload::OffloadReceipt;
pub use crate::payload::Tier;
pub use crate::payload::TierConfig;
pub use crate::payload::TieredPayloadStore;
pub use crate::queue::JobQueue;
pub use crate::schema_service::SchemaService;
pub use crate::snapshot::SnapshotBuilder;
pub use crate::snapshot::SnapshotConfig;
pub use crate::snapshot::SnapshotOutcome;
pub use crate::version_service::VersionService;
pub use crate::worker::JobRunner;
pub use crate::worker::JobWorker;
