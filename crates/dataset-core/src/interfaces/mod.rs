// crates/dataset-core/src/interfaces/mod.rs
// ============================================================================
// Module: Dataset Interfaces
// Description: Collaborator contracts consumed by the dataset engine.
// Purpose: Keep persistence, coordination, and IO backends swappable.
// Dependencies: crate::core, async-trait, thiserror
// ============================================================================

//! ## Overview
//! The engine consumes its environment through these traits: a transactional
//! [`Repository`], an atomic [`ItemCounter`], an [`OperationStore`] for
//! barrier records, a renewable [`LockBackend`], [`PayloadDriver`]s for
//! object-store tiers, a [`MessageBus`], an [`IdGenerator`], and read-only
//! [`FileSystem`] plus [`RecordReader`] sources. Implementations must fail
//! closed: optimistic-lock mismatches are reported as conflicts, never
//! silently applied.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::io::Read;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::dataset::Dataset;
use crate::core::error::DatasetError;
use crate::core::identifiers::DatasetId;
use crate::core::identifiers::ItemId;
use crate::core::identifiers::ItemRowId;
use crate::core::identifiers::JobId;
use crate::core::identifiers::SchemaId;
use crate::core::identifiers::SpaceId;
use crate::core::identifiers::VersionId;
use crate::core::item::Item;
use crate::core::item::ItemSnapshot;
use crate::core::job::FileFormat;
use crate::core::job::IoJob;
use crate::core::job::JobDelta;
use crate::core::job::JobStatus;
use crate::core::message::JobRunMessage;
use crate::core::operation::DatasetOperation;
use crate::core::operation::OperationKind;
use crate::core::schema::DatasetSchema;
use crate::core::value::Record;
use crate::core::version::DatasetVersion;

// ============================================================================
// SECTION: Repository Options
// ============================================================================

/// Read modifiers for repository lookups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Read from the primary replica.
    pub with_master: bool,
    /// Include soft-deleted rows.
    pub with_deleted: bool,
}

impl ReadOptions {
    /// Reads from the primary replica.
    #[must_use]
    pub const fn master() -> Self {
        Self {
            with_master: true,
            with_deleted: false,
        }
    }
}

/// Cursor page request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// Opaque cursor returned by the previous page.
    pub cursor: Option<String>,
    /// Maximum number of rows (zero means the store default).
    pub limit: usize,
}

impl PageRequest {
    /// Creates a first-page request.
    #[must_use]
    pub const fn first(limit: usize) -> Self {
        Self {
            cursor: None,
            limit,
        }
    }

    /// Creates a request continuing after `cursor`.
    #[must_use]
    pub const fn after(cursor: Option<String>, limit: usize) -> Self {
        Self {
            cursor,
            limit,
        }
    }
}

/// One page of results.
///
/// # Invariants
/// - `next_cursor` is `None` on the last page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Rows in store order.
    pub items: Vec<T>,
    /// Cursor for the next page.
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// Creates an empty final page.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }
}

/// Default page size used when a request leaves the limit at zero.
pub const DEFAULT_PAGE_LIMIT: usize = 50;

/// Upper bound on rows returned by one page.
pub const MAX_PAGE_LIMIT: usize = 1000;

/// Normalizes a requested page limit.
#[must_use]
pub fn effective_limit(limit: usize) -> usize {
    if limit == 0 { DEFAULT_PAGE_LIMIT } else { limit.min(MAX_PAGE_LIMIT) }
}

/// Parses a numeric row cursor.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] when the cursor is not a row id.
pub fn parse_row_cursor(cursor: Option<&str>) -> Result<i64, StoreError> {
    cursor.map_or(Ok(0), |raw| {
        raw.parse::<i64>().map_err(|_| StoreError::Invalid(format!("invalid page cursor {raw:?}")))
    })
}

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Repository errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("dataset store io error: {0}")]
    Io(String),
    /// Stored data failed to decode.
    #[error("dataset store corruption: {0}")]
    Corrupt(String),
    /// Invalid request or data.
    #[error("dataset store invalid data: {0}")]
    Invalid(String),
    /// Optimistic-lock pre-image mismatch.
    #[error("dataset store conflict: {0}")]
    Conflict(String),
    /// Row is missing.
    #[error("dataset store not found: {0}")]
    NotFound(String),
    /// Backend reported an error.
    #[error("dataset store error: {0}")]
    Store(String),
}

impl From<StoreError> for DatasetError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(message) => Self::ConcurrentDatasetOperations(message),
            StoreError::NotFound(message) => Self::NotFound(message),
            StoreError::Invalid(message) => Self::InvalidParam(message),
            StoreError::Io(message) | StoreError::Store(message) => Self::Storage(message),
            StoreError::Corrupt(message) => Self::Internal(message),
        }
    }
}

// ============================================================================
// SECTION: Repository
// ============================================================================

/// Row-level persistence operations shared by the repository and its
/// transaction handles.
///
/// Guarded updates take the expected pre-image of the optimistic counter and
/// return [`StoreError::Conflict`] when it does not match.
pub trait RepositoryOps {
    /// Loads a dataset.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn get_dataset(&self, id: DatasetId, options: ReadOptions) -> Result<Option<Dataset>, StoreError>;

    /// Lists datasets of a space ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn list_datasets(&self, space_id: SpaceId, page: &PageRequest) -> Result<Page<Dataset>, StoreError>;

    /// Inserts a dataset, assigning an id when unset.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn insert_dataset(&self, dataset: &Dataset) -> Result<Dataset, StoreError>;

    /// Replaces a dataset when the stored `next_version_num` matches.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] on pre-image mismatch.
    fn update_dataset(&self, dataset: &Dataset, expected_next_version_num: u64) -> Result<(), StoreError>;

    /// Loads a schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn get_schema(&self, id: SchemaId) -> Result<Option<DatasetSchema>, StoreError>;

    /// Inserts a schema, assigning an id when unset.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn insert_schema(&self, schema: &DatasetSchema) -> Result<DatasetSchema, StoreError>;

    /// Replaces a schema when the stored `update_version` matches.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] on pre-image mismatch.
    fn update_schema(&self, schema: &DatasetSchema, expected_update_version: u64) -> Result<(), StoreError>;

    /// Loads a version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn get_version(&self, id: VersionId) -> Result<Option<DatasetVersion>, StoreError>;

    /// Lists versions of a dataset by `version_num` descending.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn list_versions(&self, dataset_id: DatasetId, page: &PageRequest) -> Result<Page<DatasetVersion>, StoreError>;

    /// Inserts a version, assigning an id when unset.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn insert_version(&self, version: &DatasetVersion) -> Result<DatasetVersion, StoreError>;

    /// Replaces a version when the stored `update_version` matches.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] on pre-image mismatch.
    fn update_version(&self, version: &DatasetVersion, expected_update_version: u64) -> Result<(), StoreError>;

    /// Physically deletes a version row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    fn delete_version(&self, id: VersionId) -> Result<(), StoreError>;

    /// Loads item rows by row id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn get_items(&self, dataset_id: DatasetId, ids: &[ItemRowId]) -> Result<Vec<Item>, StoreError>;

    /// Loads live item rows by stable item id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn get_live_items_by_item_ids(&self, dataset_id: DatasetId, item_ids: &[ItemId]) -> Result<Vec<Item>, StoreError>;

    /// Loads live item rows by idempotency key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn get_live_items_by_keys(&self, dataset_id: DatasetId, keys: &[String]) -> Result<Vec<Item>, StoreError>;

    /// Lists live rows (`del_vn` unset) ordered by row id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn list_live_items(&self, dataset_id: DatasetId, page: &PageRequest) -> Result<Page<Item>, StoreError>;

    /// Lists rows with `add_vn <= version_num < del_vn` ordered by row id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn list_items_at_version(
        &self,
        dataset_id: DatasetId,
        version_num: u64,
        page: &PageRequest,
    ) -> Result<Page<Item>, StoreError>;

    /// Counts rows with `add_vn <= version_num < del_vn`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the count fails.
    fn count_items_at_version(&self, dataset_id: DatasetId, version_num: u64) -> Result<u64, StoreError>;

    /// Counts live rows.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the count fails.
    fn count_live_items(&self, dataset_id: DatasetId) -> Result<u64, StoreError>;

    /// Inserts rows, skipping rows whose `item_key` collides with a live row.
    ///
    /// Unset row ids are assigned by the store; an unset `item_id` defaults to
    /// the row id and an empty `item_key` defaults to the item id. Returns
    /// the rows actually inserted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn insert_items(&self, items: &[Item]) -> Result<Vec<Item>, StoreError>;

    /// Replaces a live row in place.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the row is missing or archived.
    fn update_item(&self, item: &Item) -> Result<(), StoreError>;

    /// Sets `del_vn` on live rows. Returns the number of rows archived.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn archive_items(&self, dataset_id: DatasetId, ids: &[ItemRowId], del_vn: u64) -> Result<u64, StoreError>;

    /// Physically deletes rows. Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    fn delete_items(&self, dataset_id: DatasetId, ids: &[ItemRowId]) -> Result<u64, StoreError>;

    /// Ends every live row at `del_vn`: rows added at `del_vn` are removed,
    /// the rest are archived. Returns the number of rows affected.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn archive_all_live(&self, dataset_id: DatasetId, del_vn: u64) -> Result<u64, StoreError>;

    /// Inserts or replaces snapshots keyed by `(version_id, item_id)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the upsert fails.
    fn upsert_snapshots(&self, snapshots: &[ItemSnapshot]) -> Result<(), StoreError>;

    /// Counts snapshots of a version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the count fails.
    fn count_snapshots(&self, version_id: VersionId) -> Result<u64, StoreError>;

    /// Lists snapshots of a version ordered by item id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn list_snapshots(&self, version_id: VersionId, page: &PageRequest) -> Result<Page<ItemSnapshot>, StoreError>;

    /// Physically deletes snapshots of a version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    fn delete_snapshots(&self, version_id: VersionId) -> Result<u64, StoreError>;

    /// Inserts a job, assigning an id when unset.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn insert_job(&self, job: &IoJob) -> Result<IoJob, StoreError>;

    /// Loads a job.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn get_job(&self, id: JobId) -> Result<Option<IoJob>, StoreError>;

    /// Lists jobs of a dataset by id descending.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn list_jobs(&self, dataset_id: DatasetId, page: &PageRequest) -> Result<Page<IoJob>, StoreError>;

    /// Applies a guarded delta and returns the resulting job.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when `expected_processed` mismatches
    /// or the job is already terminal.
    fn apply_job_delta(&self, id: JobId, delta: &JobDelta) -> Result<IoJob, StoreError>;

    /// Moves a non-terminal job to `status` and returns the resulting job.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the job is already terminal.
    fn transition_job(&self, id: JobId, status: JobStatus, at_ms: i64) -> Result<IoJob, StoreError>;
}

/// Transaction body run against a transaction-scoped handle.
pub type TransactionFn<'a> = dyn FnMut(&dyn RepositoryOps) -> Result<(), DatasetError> + 'a;

/// Transactional repository.
///
/// # Invariants
/// - Every write performed through the handle passed to `transaction` commits
///   atomically or not at all.
pub trait Repository: RepositoryOps + Send + Sync {
    /// Runs `body` inside one transaction, committing when it returns `Ok`.
    ///
    /// The body must only use the handle it receives.
    ///
    /// # Errors
    ///
    /// Returns the body's error (after rollback) or a store failure.
    fn transaction(&self, body: &mut TransactionFn<'_>) -> Result<(), DatasetError>;
}

// ============================================================================
// SECTION: Key-Value Collaborators
// ============================================================================

/// Key-value collaborator errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KvError {
    /// Backend reported an error.
    #[error("kv backend error: {0}")]
    Backend(String),
}

impl From<KvError> for DatasetError {
    fn from(err: KvError) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Atomic item counters.
pub trait ItemCounter: Send + Sync {
    /// Reads a dataset counter.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend fails.
    fn get_item_count(&self, dataset_id: DatasetId) -> Result<Option<i64>, KvError>;

    /// Overwrites a dataset counter.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend fails.
    fn set_item_count(&self, dataset_id: DatasetId, count: i64) -> Result<(), KvError>;

    /// Adds `delta` (absent counters start at zero) and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend fails.
    fn incr_item_count(&self, dataset_id: DatasetId, delta: i64) -> Result<i64, KvError>;

    /// Reads several dataset counters.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend fails.
    fn mget_item_count(&self, dataset_ids: &[DatasetId]) -> Result<Vec<Option<i64>>, KvError>;

    /// Reads a cached version item count.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend fails.
    fn get_item_count_of_version(&self, version_id: VersionId) -> Result<Option<u64>, KvError>;

    /// Caches a version item count.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend fails.
    fn set_item_count_of_version(&self, version_id: VersionId, count: u64) -> Result<(), KvError>;
}

/// Barrier record store with TTL support.
pub trait OperationStore: Send + Sync {
    /// Adds a barrier record.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend fails.
    fn add_operation(&self, dataset_id: DatasetId, operation: &DatasetOperation) -> Result<(), KvError>;

    /// Removes a barrier record.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend fails.
    fn del_operation(&self, dataset_id: DatasetId, kind: OperationKind, operation_id: &str) -> Result<(), KvError>;

    /// Returns outstanding (unexpired) records for each requested kind.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] when the backend fails.
    fn mget_operations(
        &self,
        dataset_id: DatasetId,
        kinds: &[OperationKind],
    ) -> Result<BTreeMap<OperationKind, Vec<DatasetOperation>>, KvError>;
}

// ============================================================================
// SECTION: Distributed Lock
// ============================================================================

/// Distributed lock errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// Backend reported an error.
    #[error("lock backend error: {0}")]
    Backend(String),
}

impl From<LockError> for DatasetError {
    fn from(err: LockError) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Lease-based lock primitive.
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Acquires `key` for `holder` unless another holder owns an unexpired lease.
    ///
    /// # Errors
    ///
    /// Returns [`LockError`] when the backend fails.
    async fn try_acquire(&self, key: &str, holder: &str, lease: Duration) -> Result<bool, LockError>;

    /// Extends the lease when `holder` still owns `key`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError`] when the backend fails.
    async fn renew(&self, key: &str, holder: &str, lease: Duration) -> Result<bool, LockError>;

    /// Releases `key` when `holder` owns it.
    ///
    /// # Errors
    ///
    /// Returns [`LockError`] when the backend fails.
    async fn release(&self, key: &str, holder: &str) -> Result<bool, LockError>;
}

// ============================================================================
// SECTION: Payload Drivers
// ============================================================================

/// Payload driver errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    /// Driver I/O error.
    #[error("payload io error: {0}")]
    Io(String),
    /// Invalid key or configuration.
    #[error("payload invalid: {0}")]
    Invalid(String),
}

impl From<PayloadError> for DatasetError {
    fn from(err: PayloadError) -> Self {
        match err {
            PayloadError::Io(message) => Self::Storage(message),
            PayloadError::Invalid(message) => Self::Internal(message),
        }
    }
}

/// One payload to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEntry {
    /// Storage key.
    pub key: String,
    /// Serialized payload.
    pub bytes: Vec<u8>,
}

/// Object-store backend for item payloads.
#[async_trait]
pub trait PayloadDriver: Send + Sync {
    /// Writes payloads.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError`] when any write fails.
    async fn mset_item_data(&self, entries: &[PayloadEntry]) -> Result<(), PayloadError>;

    /// Reads payloads in key order; missing keys yield `None`.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError`] when a read fails.
    async fn mget_item_data(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, PayloadError>;

    /// Deletes payloads; missing keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError`] when a delete fails.
    async fn delete_item_data(&self, keys: &[String]) -> Result<(), PayloadError>;
}

// ============================================================================
// SECTION: Message Bus
// ============================================================================

/// Message bus errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Send failed.
    #[error("message bus send failed: {0}")]
    Send(String),
}

impl From<BusError> for DatasetError {
    fn from(err: BusError) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Send modifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Partitioning key.
    pub key: Option<String>,
    /// Delay before delivery.
    pub delay: Option<Duration>,
}

/// At-least-once message bus.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes a job-run message.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the message cannot be accepted.
    async fn send(&self, message: &JobRunMessage, options: SendOptions) -> Result<(), BusError>;
}

// ============================================================================
// SECTION: Id Generator
// ============================================================================

/// Id generator errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// Generator unavailable.
    #[error("id generator unavailable: {0}")]
    Unavailable(String),
}

/// Distributed id generator.
pub trait IdGenerator: Send + Sync {
    /// Returns `count` unique positive ids.
    ///
    /// # Errors
    ///
    /// Returns [`IdError`] when ids cannot be generated; callers fall back to
    /// store-assigned ids.
    fn gen_multi_ids(&self, count: usize) -> Result<Vec<i64>, IdError>;
}

// ============================================================================
// SECTION: Sources
// ============================================================================

/// Source filesystem and reader errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// File or directory is missing.
    #[error("source not found: {0}")]
    NotFound(String),
    /// Read failed.
    #[error("source io error: {0}")]
    Io(String),
    /// File content could not be parsed.
    #[error("malformed source: {0}")]
    Malformed(String),
    /// Provider, path, or format is not supported.
    #[error("unsupported source: {0}")]
    Unsupported(String),
}

impl From<SourceError> for DatasetError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NotFound(message) => Self::NotFound(message),
            SourceError::Io(message) => Self::Storage(message),
            SourceError::Malformed(message) => Self::MalformedFile(message),
            SourceError::Unsupported(message) => Self::InvalidParam(message),
        }
    }
}

/// File metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    /// File name relative to its directory.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Entry is a directory.
    pub is_dir: bool,
}

/// Read-only filesystem provider.
pub trait FileSystem: Send + Sync {
    /// Returns metadata for `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the path cannot be inspected.
    fn stat(&self, path: &str) -> Result<FileStat, SourceError>;

    /// Lists entries of a directory sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the directory cannot be read.
    fn read_dir(&self, path: &str) -> Result<Vec<FileStat>, SourceError>;

    /// Opens a file for streaming reads.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the file cannot be opened.
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>, SourceError>;

    /// Reads a whole file.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the file cannot be read.
    fn read_file(&self, path: &str) -> Result<Vec<u8>, SourceError> {
        let mut reader = self.open(path)?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(|err| SourceError::Io(format!("{path}: {err}")))?;
        Ok(bytes)
    }
}

/// Sequential record reader over one source file.
///
/// # Invariants
/// - `cursor` counts source positions consumed so far; seeking to a cursor
///   returned earlier resumes at the next unread record.
pub trait RecordReader: Send {
    /// Returns the next record, or `None` at end of file.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the record cannot be read.
    fn next_record(&mut self) -> Result<Option<Record>, SourceError>;

    /// Skips forward until `cursor() == offset`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when skipping fails.
    fn seek_to_offset(&mut self, offset: u64) -> Result<(), SourceError>;

    /// Returns the current cursor.
    fn cursor(&self) -> u64;
}

/// Opens format-aware readers by provider name.
pub trait RecordReaderFactory: Send + Sync {
    /// Opens a reader for `path` under `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the provider or file is unavailable.
    fn open_reader(&self, provider: &str, path: &str, format: FileFormat) -> Result<Box<dyn RecordReader>, SourceError>;

    /// Returns the filesystem registered for `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Unsupported`] for unknown providers.
    fn file_system(&self, provider: &str) -> Result<&dyn FileSystem, SourceError>;
}
