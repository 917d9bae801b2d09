// crates/dataset-core/src/runtime/memory/mod.rs
// ============================================================================
// Module: In-Memory Collaborators
// Description: Process-local implementations of every collaborator contract.
// Purpose: Back tests and single-node deployments without external services.
// Dependencies: crate::interfaces, tokio
// ============================================================================

//! ## Overview
//! Each collaborator keeps its state behind a mutex and reports poisoning as
//! a backend error. Clones share state, so a test can hand one clone to the
//! engine and inspect another.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod bus;
mod kv;
mod lock;
mod payload;
mod repository;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use bus::InMemoryMessageBus;
pub use bus::MessageReceiver;
pub use kv::InMemoryItemCounter;
pub use kv::InMemoryOperationStore;
pub use kv::SequentialIdGenerator;
pub use lock::InMemoryLockBackend;
pub use payload::InMemoryPayloadDriver;
pub use repository::InMemoryRepository;
pub use repository::MemoryTables;
