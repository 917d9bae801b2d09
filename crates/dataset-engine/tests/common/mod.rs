// crates/dataset-engine/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Shared engine harness for dataset-engine integration tests.
// Purpose: Wire the engine over in-memory backends with inspectable handles.
// Dependencies: dataset-core, dataset-engine, dataset-io
// ============================================================================

//! ## Overview
//! Builds a [`DatasetEngine`] over the in-memory collaborators and a
//! `memory` file provider, and offers small builders for datasets and items.

#![allow(dead_code, reason = "Common module may have unused helpers.")]
#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::sync::Arc;

use dataset_core::Dataset;
use dataset_core::DatasetFeatures;
use dataset_core::DatasetSchema;
use dataset_core::DatasetSpec;
use dataset_core::FieldData;
use dataset_core::FieldSchema;
use dataset_core::IndexedItem;
use dataset_core::Item;
use dataset_core::ItemCounter;
use dataset_core::JobRunMessage;
use dataset_core::OpContext;
use dataset_core::PayloadDriver;
use dataset_core::SpaceId;
use dataset_core::StorageProvider;
use dataset_core::runtime::memory::InMemoryPayloadDriver;
use dataset_engine::Collaborators;
use dataset_engine::DatasetEngine;
use dataset_engine::EngineConfig;
use dataset_engine::InMemoryCollaborators;
use dataset_engine::MemoryEventSink;
use dataset_engine::Tier;
use dataset_engine::TierConfig;
use dataset_io::FormatReaderFactory;
use dataset_io::MemoryFileSystem;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Space used by every test dataset.
pub const SPACE: SpaceId = SpaceId::new(42);

/// Provider name of the in-memory source filesystem.
pub const MEMORY_PROVIDER: &str = "memory";

/// Audit operator used by tests.
pub const OPERATOR: &str = "tester";

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Engine plus the typed handles behind it.
pub struct Harness {
    /// Engine under test.
    pub engine: DatasetEngine,
    /// In-memory backends (fault injection, bus log, lock holders).
    pub memory: InMemoryCollaborators,
    /// Source files served under [`MEMORY_PROVIDER`].
    pub files: MemoryFileSystem,
    /// Recorded events.
    pub events: Arc<MemoryEventSink>,
}

impl Harness {
    /// Returns the names of every recorded event.
    pub fn event_names(&self) -> Vec<&'static str> {
        self.events.names()
    }

    /// Returns true when an event named `name` was recorded.
    pub fn saw(&self, name: &str) -> bool {
        self.event_names().contains(&name)
    }

    /// Returns every message published on the bus.
    pub fn sent(&self) -> Vec<JobRunMessage> {
        self.memory.bus.sent().unwrap().into_iter().map(|(message, _)| message).collect()
    }

    /// Returns the last message published on the bus.
    pub fn last_sent(&self) -> JobRunMessage {
        self.sent().pop().expect("a message was published")
    }

    /// Returns the item counter of a dataset.
    pub fn counter(&self, dataset: &Dataset) -> i64 {
        self.memory.counter.get_item_count(dataset.id).unwrap().unwrap_or_default()
    }

    /// Reloads a dataset.
    pub fn reload(&self, dataset: &Dataset) -> Dataset {
        self.engine.datasets().get_dataset(dataset.id).unwrap()
    }

    /// Creates a dataset with a single text field `q`.
    pub async fn dataset(&self, spec: DatasetSpec, features: DatasetFeatures) -> (Dataset, DatasetSchema) {
        self.dataset_with_fields(spec, features, vec![FieldSchema::text("q")]).await
    }

    /// Creates a dataset with the given fields.
    pub async fn dataset_with_fields(
        &self,
        spec: DatasetSpec,
        features: DatasetFeatures,
        fields: Vec<FieldSchema>,
    ) -> (Dataset, DatasetSchema) {
        let mut dataset = Dataset::new(SPACE, "eval-set");
        dataset.spec = spec;
        dataset.features = features;
        self.engine.datasets().create_dataset(&ctx(), dataset, fields, OPERATOR).await.unwrap()
    }
}

/// Builds a harness with default settings and no object tiers.
pub fn harness() -> Harness {
    harness_with(EngineConfig::default(), BTreeMap::new())
}

/// Builds a harness with explicit settings and payload drivers.
pub fn harness_with(config: EngineConfig, drivers: BTreeMap<StorageProvider, Arc<dyn PayloadDriver>>) -> Harness {
    let files = MemoryFileSystem::new();
    let readers = FormatReaderFactory::new().with_provider(MEMORY_PROVIDER, Arc::new(files.clone()));
    let events = Arc::new(MemoryEventSink::new());
    let memory = Collaborators::in_memory(Arc::new(readers), events.clone());
    let engine = DatasetEngine::new(memory.collaborators.clone(), drivers, config).unwrap();
    Harness {
        engine,
        memory,
        files,
        events,
    }
}

/// Builds a harness whose payloads past eight bytes go to an in-memory
/// object store, returned alongside it.
pub fn object_tier_harness() -> (Harness, Arc<InMemoryPayloadDriver>) {
    let driver = Arc::new(InMemoryPayloadDriver::new());
    let mut drivers: BTreeMap<StorageProvider, Arc<dyn PayloadDriver>> = BTreeMap::new();
    drivers.insert(StorageProvider::ObjectStoreA, driver.clone());
    let config = EngineConfig {
        tiers: TierConfig {
            tiers: vec![
                Tier {
                    provider: StorageProvider::InlineRow,
                    max_size: 8,
                },
                Tier {
                    provider: StorageProvider::ObjectStoreA,
                    max_size: u64::MAX,
                },
            ],
        },
        ..EngineConfig::default()
    };
    (harness_with(config, drivers), driver)
}

// ============================================================================
// SECTION: Builders
// ============================================================================

/// Returns a fresh root context.
pub fn ctx() -> OpContext {
    OpContext::new()
}

/// Returns a spec capping the dataset at `max_item_count` items.
pub fn capped(max_item_count: i64) -> DatasetSpec {
    DatasetSpec {
        max_item_count,
        ..DatasetSpec::default()
    }
}

/// Returns features with schema editing enabled.
pub fn editable() -> DatasetFeatures {
    DatasetFeatures {
        edit_schema: true,
        ..DatasetFeatures::default()
    }
}

/// Builds an unsaved item with `q = content`.
pub fn text_item(content: &str) -> Item {
    Item::with_data(vec![FieldData::named("q", content)])
}

/// Builds `count` indexed items `q = "row n"`.
pub fn text_items(count: u64) -> Vec<IndexedItem> {
    (0 .. count)
        .map(|index| IndexedItem {
            index,
            item: text_item(&format!("row {index}")),
        })
        .collect()
}

/// Builds a JSONL file of `count` rows `{"q":"row n"}`.
pub fn jsonl_rows(count: u64) -> Vec<u8> {
    (0 .. count).map(|index| format!("{{\"q\":\"row {index}\"}}\n")).collect::<String>().into_bytes()
}
