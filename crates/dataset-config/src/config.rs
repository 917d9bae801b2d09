// crates/dataset-config/src/config.rs
// ============================================================================
// Module: Dataset Engine Configuration
// Description: Configuration loading and validation for the dataset engine.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: dataset-core, dataset-engine, dataset-object-store,
//               dataset-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a UTF-8 TOML file capped at
//! [`MAX_CONFIG_FILE_SIZE`]. Every section has defaults, so an empty file
//! yields a single-node engine with inline payloads, in-memory storage, and
//! events on stderr. Durations are written in milliseconds.
//!
//! ```toml
//! [barrier]
//! max_wait_ms = 30000
//!
//! [[tiers]]
//! provider = "inline_row"
//! max_size = 65536
//!
//! [[tiers]]
//! provider = "object_store_a"
//!
//! [object_store.object_store_a]
//! backend = "s3"
//! bucket = "dataset-payloads"
//!
//! [store]
//! path = "/var/lib/dataset/engine.db"
//!
//! [events]
//! sink = "file"
//! path = "/var/log/dataset/events.jsonl"
//! ```

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dataset_core::PayloadDriver;
use dataset_core::StorageProvider;
use dataset_core::core::item_error::DEFAULT_MAX_ERROR_DETAILS;
use dataset_engine::BarrierConfig;
use dataset_engine::EngineConfig;
use dataset_engine::EngineEventSink;
use dataset_engine::FileEventSink;
use dataset_engine::ImportConfig;
use dataset_engine::NoopEventSink;
use dataset_engine::SnapshotConfig;
use dataset_engine::StderrEventSink;
use dataset_engine::Tier;
use dataset_engine::TierConfig;
use dataset_object_store::LocalPayloadDriver;
use dataset_object_store::S3PayloadConfig;
use dataset_object_store::S3PayloadDriver;
use dataset_store_sqlite::SqliteRepository;
use dataset_store_sqlite::SqliteStoreConfig;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Largest snapshot page the repository serves.
const MAX_SNAPSHOT_PAGE_SIZE: usize = 1000;

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Dataset engine deployment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetEngineConfig {
    /// Operation barrier waits.
    #[serde(default)]
    pub barrier: BarrierSection,
    /// Snapshot builds.
    #[serde(default)]
    pub snapshot: SnapshotSection,
    /// File imports.
    #[serde(default)]
    pub import: ImportSection,
    /// Payload tiers in ascending size order.
    #[serde(default = "default_tiers")]
    pub tiers: Vec<TierSection>,
    /// Durable repository; absent means in-memory storage.
    #[serde(default)]
    pub store: Option<SqliteStoreConfig>,
    /// Object-store backends per tier provider.
    #[serde(default)]
    pub object_store: ObjectStoreSection,
    /// Engine event sink.
    #[serde(default)]
    pub events: EventsSection,
}

impl Default for DatasetEngineConfig {
    fn default() -> Self {
        Self {
            barrier: BarrierSection::default(),
            snapshot: SnapshotSection::default(),
            import: ImportSection::default(),
            tiers: default_tiers(),
            store: None,
            object_store: ObjectStoreSection::default(),
            events: EventsSection::default(),
        }
    }
}

impl DatasetEngineConfig {
    /// Loads and validates configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, exceeds the
    /// size limit, is not UTF-8, fails to parse, or fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        validate_path(path)?;
        let bytes = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content =
            std::str::from_utf8(&bytes).map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.barrier.validate()?;
        self.snapshot.validate()?;
        self.import.validate()?;
        self.validate_tiers()?;
        if let Some(store) = &self.store {
            store.validate().map_err(|err| ConfigError::Invalid(format!("store: {err}")))?;
        }
        self.object_store.validate()?;
        self.events.validate()
    }

    /// Validates the tier table against the configured backends.
    fn validate_tiers(&self) -> Result<(), ConfigError> {
        let last = self.tiers.len().saturating_sub(1);
        for (index, tier) in self.tiers.iter().enumerate() {
            if tier.max_size.is_none() && index != last {
                return Err(ConfigError::Invalid(format!("tiers[{index}].max_size may only be omitted on the last tier")));
            }
            if tier.provider != StorageProvider::InlineRow && self.object_store.backend(tier.provider).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "tiers[{index}] uses {} without an object_store backend",
                    tier.provider.as_str()
                )));
            }
        }
        self.tier_config().validate().map_err(|err| ConfigError::Invalid(format!("tiers: {err}")))
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            barrier: self.barrier.to_config(),
            snapshot: self.snapshot.to_config(),
            import: self.import.to_config(),
            tiers: self.tier_config(),
        }
    }

    /// Returns the tier table.
    #[must_use]
    pub fn tier_config(&self) -> TierConfig {
        TierConfig {
            tiers: self
                .tiers
                .iter()
                .map(|tier| Tier {
                    provider: tier.provider,
                    max_size: tier.max_size.unwrap_or(u64::MAX),
                })
                .collect(),
        }
    }

    /// Opens the durable repository when `[store]` is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the store cannot be opened.
    pub fn open_repository(&self) -> Result<Option<SqliteRepository>, ConfigError> {
        self.store
            .as_ref()
            .map(|store| SqliteRepository::open(store).map_err(|err| ConfigError::Io(format!("store: {err}"))))
            .transpose()
    }

    /// Builds the configured event sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the event file cannot be opened.
    pub fn event_sink(&self) -> Result<Arc<dyn EngineEventSink>, ConfigError> {
        match self.events.sink {
            EventSinkKind::Stderr => Ok(Arc::new(StderrEventSink)),
            EventSinkKind::None => Ok(Arc::new(NoopEventSink)),
            EventSinkKind::File => {
                let path = self
                    .events
                    .path
                    .as_deref()
                    .ok_or_else(|| ConfigError::Invalid("events.path is required for the file sink".to_string()))?;
                let sink = FileEventSink::new(path).map_err(|err| ConfigError::Io(format!("events: {err}")))?;
                Ok(Arc::new(sink))
            }
        }
    }

    /// Connects every configured payload backend.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a backend fails to open.
    pub async fn payload_drivers(&self) -> Result<BTreeMap<StorageProvider, Arc<dyn PayloadDriver>>, ConfigError> {
        let mut drivers: BTreeMap<StorageProvider, Arc<dyn PayloadDriver>> = BTreeMap::new();
        for (provider, backend) in self.object_store.backends() {
            let driver: Arc<dyn PayloadDriver> = match backend {
                PayloadBackendConfig::S3(config) => Arc::new(
                    S3PayloadDriver::connect(config)
                        .await
                        .map_err(|err| ConfigError::Io(format!("object_store.{}: {err}", provider.as_str())))?,
                ),
                PayloadBackendConfig::Local(config) => Arc::new(
                    LocalPayloadDriver::open(&config.root)
                        .map_err(|err| ConfigError::Io(format!("object_store.{}: {err}", provider.as_str())))?,
                ),
            };
            drivers.insert(provider, driver);
        }
        Ok(drivers)
    }
}

/// Returns the default tier table (everything inline).
fn default_tiers() -> Vec<TierSection> {
    vec![TierSection {
        provider: StorageProvider::InlineRow,
        max_size: None,
    }]
}

// ============================================================================
// SECTION: Engine Sections
// ============================================================================

/// Operation barrier settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BarrierSection {
    /// First retry delay while waiting for a conflicting operation.
    pub initial_backoff_ms: u64,
    /// Retry delay ceiling.
    pub max_backoff_ms: u64,
    /// Total wait budget before giving up.
    pub max_wait_ms: u64,
    /// Lifetime of an inserted barrier record.
    pub ttl_ms: u64,
}

impl Default for BarrierSection {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 50,
            max_backoff_ms: 10_000,
            max_wait_ms: 60_000,
            ttl_ms: 60_000,
        }
    }
}

impl BarrierSection {
    /// Validates the barrier settings.
    fn validate(&self) -> Result<(), ConfigError> {
        require_positive("barrier.initial_backoff_ms", self.initial_backoff_ms)?;
        require_positive("barrier.max_wait_ms", self.max_wait_ms)?;
        require_positive("barrier.ttl_ms", self.ttl_ms)?;
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(ConfigError::Invalid("barrier.max_backoff_ms must be >= initial_backoff_ms".to_string()));
        }
        Ok(())
    }

    /// Converts to the engine value.
    #[must_use]
    pub const fn to_config(&self) -> BarrierConfig {
        BarrierConfig {
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            max_wait: Duration::from_millis(self.max_wait_ms),
            ttl: Duration::from_millis(self.ttl_ms),
        }
    }
}

/// Snapshot builder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SnapshotSection {
    /// Rows copied per page.
    pub page_size: usize,
    /// Deliveries before a build is failed.
    pub max_retry_times: u32,
    /// Delay before a retried delivery.
    pub retry_delay_ms: u64,
    /// Lock lease per build.
    pub max_processing_ms: u64,
    /// Total time a build may keep renewing its lock.
    pub max_renew_ms: u64,
}

impl Default for SnapshotSection {
    fn default() -> Self {
        Self {
            page_size: 50,
            max_retry_times: 5,
            retry_delay_ms: 10_000,
            max_processing_ms: 60_000,
            max_renew_ms: 1_200_000,
        }
    }
}

impl SnapshotSection {
    /// Validates the snapshot settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || self.page_size > MAX_SNAPSHOT_PAGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "snapshot.page_size must be between 1 and {MAX_SNAPSHOT_PAGE_SIZE}"
            )));
        }
        require_positive("snapshot.max_processing_ms", self.max_processing_ms)?;
        if self.max_renew_ms < self.max_processing_ms {
            return Err(ConfigError::Invalid("snapshot.max_renew_ms must be >= max_processing_ms".to_string()));
        }
        Ok(())
    }

    /// Converts to the engine value.
    #[must_use]
    pub const fn to_config(&self) -> SnapshotConfig {
        SnapshotConfig {
            page_size: self.page_size,
            max_retry_times: self.max_retry_times,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            max_processing: Duration::from_millis(self.max_processing_ms),
            max_renew: Duration::from_millis(self.max_renew_ms),
        }
    }
}

/// Import pipeline settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportSection {
    /// Records per committed flush.
    pub flush_every: u64,
    /// Sample details kept per error kind.
    pub max_error_details: usize,
    /// Lock lease per delivery.
    pub lock_lease_ms: u64,
    /// Total time a delivery may keep renewing its lock.
    pub lock_max_renew_ms: u64,
    /// Delay before a retried delivery.
    pub retry_delay_ms: u64,
    /// Deliveries before a job is failed.
    pub max_retry_times: u32,
}

impl Default for ImportSection {
    fn default() -> Self {
        Self {
            flush_every: 100,
            max_error_details: DEFAULT_MAX_ERROR_DETAILS,
            lock_lease_ms: 60_000,
            lock_max_renew_ms: 1_800_000,
            retry_delay_ms: 5_000,
            max_retry_times: 10,
        }
    }
}

impl ImportSection {
    /// Validates the import settings.
    fn validate(&self) -> Result<(), ConfigError> {
        require_positive("import.flush_every", self.flush_every)?;
        require_positive("import.lock_lease_ms", self.lock_lease_ms)?;
        if self.lock_max_renew_ms < self.lock_lease_ms {
            return Err(ConfigError::Invalid("import.lock_max_renew_ms must be >= lock_lease_ms".to_string()));
        }
        Ok(())
    }

    /// Converts to the engine value.
    #[must_use]
    pub const fn to_config(&self) -> ImportConfig {
        ImportConfig {
            flush_every: self.flush_every,
            max_error_details: self.max_error_details,
            lock_lease: Duration::from_millis(self.lock_lease_ms),
            lock_max_renew: Duration::from_millis(self.lock_max_renew_ms),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            max_retry_times: self.max_retry_times,
        }
    }
}

/// One payload tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierSection {
    /// Provider receiving payloads of this tier.
    pub provider: StorageProvider,
    /// Largest payload in bytes; omitted on the last tier for no limit.
    #[serde(default)]
    pub max_size: Option<u64>,
}

// ============================================================================
// SECTION: Object Store
// ============================================================================

/// Backends of the object-store tiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectStoreSection {
    /// Backend of the first object tier.
    #[serde(default)]
    pub object_store_a: Option<PayloadBackendConfig>,
    /// Backend of the second object tier.
    #[serde(default)]
    pub object_store_b: Option<PayloadBackendConfig>,
}

impl ObjectStoreSection {
    /// Returns the backend configured for `provider`.
    #[must_use]
    pub const fn backend(&self, provider: StorageProvider) -> Option<&PayloadBackendConfig> {
        match provider {
            StorageProvider::InlineRow => None,
            StorageProvider::ObjectStoreA => self.object_store_a.as_ref(),
            StorageProvider::ObjectStoreB => self.object_store_b.as_ref(),
        }
    }

    /// Returns every configured backend with its provider.
    fn backends(&self) -> impl Iterator<Item = (StorageProvider, &PayloadBackendConfig)> {
        [StorageProvider::ObjectStoreA, StorageProvider::ObjectStoreB]
            .into_iter()
            .filter_map(|provider| self.backend(provider).map(|backend| (provider, backend)))
    }

    /// Validates every configured backend.
    fn validate(&self) -> Result<(), ConfigError> {
        for (provider, backend) in self.backends() {
            let field = format!("object_store.{}", provider.as_str());
            match backend {
                PayloadBackendConfig::S3(config) => {
                    config.validate().map_err(|err| ConfigError::Invalid(format!("{field}: {err}")))?;
                }
                PayloadBackendConfig::Local(config) => {
                    validate_path_string(&format!("{field}.root"), &config.root.to_string_lossy())?;
                }
            }
        }
        Ok(())
    }
}

/// Backend of one object-store tier.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum PayloadBackendConfig {
    /// S3-compatible bucket.
    S3(S3PayloadConfig),
    /// Local directory tree.
    Local(LocalPayloadConfig),
}

/// Local directory backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalPayloadConfig {
    /// Root directory for payload files.
    pub root: PathBuf,
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// Event sink selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to `path`.
    File,
    /// Discard events.
    None,
}

/// Engine event settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventsSection {
    /// Sink kind.
    #[serde(default)]
    pub sink: EventSinkKind,
    /// Log file for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl EventsSection {
    /// Validates sink and path pairing.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (EventSinkKind::File, None) => {
                Err(ConfigError::Invalid("events.path is required for the file sink".to_string()))
            }
            (EventSinkKind::File, Some(path)) => validate_path_string("events.path", &path.to_string_lossy()),
            (_, Some(_)) => Err(ConfigError::Invalid("events.path is only valid for the file sink".to_string())),
            (_, None) => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration or opening a backend.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Rejects zero for settings that must be positive.
fn require_positive(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid(format!("{field} must be greater than zero")));
    }
    Ok(())
}

/// Validates the config file path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a configured path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}
