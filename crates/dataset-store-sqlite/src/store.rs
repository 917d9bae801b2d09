// crates/dataset-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Repository
// Description: Repository contract implemented over a SQLite database file.
// Purpose: Provide durable, transactional storage for the dataset engine.
// Dependencies: dataset-core, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! This module owns the connection, the schema bootstrap, and the
//! transaction boundary. Row encoding and the per-table statements live in
//! the private `rows` module and run against either the shared connection
//! or an open transaction.
//!
//! | Table | Key | Filter columns |
//! |---|---|---|
//! | `datasets` | `id` | `space_id`, `deleted`, `next_version_num` |
//! | `schemas` | `id` | `dataset_id`, `update_version` |
//! | `versions` | `id` | `dataset_id`, `version`, `version_num`, `update_version` |
//! | `items` | `id` | `dataset_id`, `item_id`, `item_key`, `add_vn`, `del_vn` |
//! | `snapshots` | `(version_id, item_id)` | |
//! | `jobs` | `id` | `dataset_id` |

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use dataset_core::Dataset;
use dataset_core::DatasetError;
use dataset_core::DatasetId;
use dataset_core::DatasetSchema;
use dataset_core::DatasetVersion;
use dataset_core::IoJob;
use dataset_core::Item;
use dataset_core::ItemId;
use dataset_core::ItemRowId;
use dataset_core::ItemSnapshot;
use dataset_core::JobDelta;
use dataset_core::JobId;
use dataset_core::JobStatus;
use dataset_core::Page;
use dataset_core::PageRequest;
use dataset_core::ReadOptions;
use dataset_core::Repository;
use dataset_core::RepositoryOps;
use dataset_core::SchemaId;
use dataset_core::SpaceId;
use dataset_core::StoreError;
use dataset_core::TransactionFn;
use dataset_core::VersionId;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;

use crate::rows;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Current schema version of the store file.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode.
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode.
    #[default]
    Full,
    /// Normal synchronous mode.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` repository.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a config for `path` with default pragmas.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }

    /// Validates the store path.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] for empty, overlong, or
    /// directory paths.
    pub fn validate(&self) -> Result<(), SqliteStoreError> {
        validate_store_path(&self.path)
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw item payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored row failed to decode.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid request or configuration.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Guarded update matched no row, or a unique key collided.
    #[error("sqlite store conflict: {0}")]
    Conflict(String),
    /// Row is missing.
    #[error("sqlite store not found: {0}")]
    NotFound(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) | SqliteStoreError::VersionMismatch(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::Conflict(message) => Self::Conflict(message),
            SqliteStoreError::NotFound(message) => Self::NotFound(message),
        }
    }
}

/// Maps a `rusqlite` error to a store error.
pub(crate) fn db_error(err: rusqlite::Error) -> SqliteStoreError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        match failure.code {
            rusqlite::ErrorCode::ConstraintViolation => return SqliteStoreError::Conflict(err.to_string()),
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                return SqliteStoreError::Io(err.to_string());
            }
            _ => {}
        }
    }
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Connection Access
// ============================================================================

/// Access to a connection for one repository operation.
trait ConnectionAccess {
    /// Runs `body` against the connection.
    fn with_connection<T>(
        &self,
        body: impl FnOnce(&Connection) -> Result<T, SqliteStoreError>,
    ) -> Result<T, StoreError>;
}

/// Implements [`RepositoryOps`] for a [`ConnectionAccess`] type.
macro_rules! sqlite_repository_ops {
    ($target:ty) => {
        impl RepositoryOps for $target {
            fn get_dataset(&self, id: DatasetId, options: ReadOptions) -> Result<Option<Dataset>, StoreError> {
                self.with_connection(|conn| rows::get_dataset(conn, id, options))
            }

            fn list_datasets(&self, space_id: SpaceId, page: &PageRequest) -> Result<Page<Dataset>, StoreError> {
                self.with_connection(|conn| rows::list_datasets(conn, space_id, page))
            }

            fn insert_dataset(&self, dataset: &Dataset) -> Result<Dataset, StoreError> {
                self.with_connection(|conn| rows::insert_dataset(conn, dataset))
            }

            fn update_dataset(&self, dataset: &Dataset, expected_next_version_num: u64) -> Result<(), StoreError> {
                self.with_connection(|conn| rows::update_dataset(conn, dataset, expected_next_version_num))
            }

            fn get_schema(&self, id: SchemaId) -> Result<Option<DatasetSchema>, StoreError> {
                self.with_connection(|conn| rows::get_schema(conn, id))
            }

            fn insert_schema(&self, schema: &DatasetSchema) -> Result<DatasetSchema, StoreError> {
                self.with_connection(|conn| rows::insert_schema(conn, schema))
            }

            fn update_schema(&self, schema: &DatasetSchema, expected_update_version: u64) -> Result<(), StoreError> {
                self.with_connection(|conn| rows::update_schema(conn, schema, expected_update_version))
            }

            fn get_version(&self, id: VersionId) -> Result<Option<DatasetVersion>, StoreError> {
                self.with_connection(|conn| rows::get_version(conn, id))
            }

            fn list_versions(&self, dataset_id: DatasetId, page: &PageRequest) -> Result<Page<DatasetVersion>, StoreError> {
                self.with_connection(|conn| rows::list_versions(conn, dataset_id, page))
            }

            fn insert_version(&self, version: &DatasetVersion) -> Result<DatasetVersion, StoreError> {
                self.with_connection(|conn| rows::insert_version(conn, version))
            }

            fn update_version(&self, version: &DatasetVersion, expected_update_version: u64) -> Result<(), StoreError> {
                self.with_connection(|conn| rows::update_version(conn, version, expected_update_version))
            }

            fn delete_version(&self, id: VersionId) -> Result<(), StoreError> {
                self.with_connection(|conn| rows::delete_version(conn, id))
            }

            fn get_items(&self, dataset_id: DatasetId, ids: &[ItemRowId]) -> Result<Vec<Item>, StoreError> {
                self.with_connection(|conn| rows::get_items(conn, dataset_id, ids))
            }

            fn get_live_items_by_item_ids(&self, dataset_id: DatasetId, item_ids: &[ItemId]) -> Result<Vec<Item>, StoreError> {
                self.with_connection(|conn| rows::get_live_items_by_item_ids(conn, dataset_id, item_ids))
            }

            fn get_live_items_by_keys(&self, dataset_id: DatasetId, keys: &[String]) -> Result<Vec<Item>, StoreError> {
                self.with_connection(|conn| rows::get_live_items_by_keys(conn, dataset_id, keys))
            }

            fn list_live_items(&self, dataset_id: DatasetId, page: &PageRequest) -> Result<Page<Item>, StoreError> {
                self.with_connection(|conn| rows::list_live_items(conn, dataset_id, page))
            }

            fn list_items_at_version(
                &self,
                dataset_id: DatasetId,
                version_num: u64,
                page: &PageRequest,
            ) -> Result<Page<Item>, StoreError> {
                self.with_connection(|conn| rows::list_items_at_version(conn, dataset_id, version_num, page))
            }

            fn count_items_at_version(&self, dataset_id: DatasetId, version_num: u64) -> Result<u64, StoreError> {
                self.with_connection(|conn| rows::count_items_at_version(conn, dataset_id, version_num))
            }

            fn count_live_items(&self, dataset_id: DatasetId) -> Result<u64, StoreError> {
                self.with_connection(|conn| rows::count_live_items(conn, dataset_id))
            }

            fn insert_items(&self, items: &[Item]) -> Result<Vec<Item>, StoreError> {
                self.with_connection(|conn| rows::insert_items(conn, items))
            }

            fn update_item(&self, item: &Item) -> Result<(), StoreError> {
                self.with_connection(|conn| rows::update_item(conn, item))
            }

            fn archive_items(&self, dataset_id: DatasetId, ids: &[ItemRowId], del_vn: u64) -> Result<u64, StoreError> {
                self.with_connection(|conn| rows::archive_items(conn, dataset_id, ids, del_vn))
            }

            fn delete_items(&self, dataset_id: DatasetId, ids: &[ItemRowId]) -> Result<u64, StoreError> {
                self.with_connection(|conn| rows::delete_items(conn, dataset_id, ids))
            }

            fn archive_all_live(&self, dataset_id: DatasetId, del_vn: u64) -> Result<u64, StoreError> {
                self.with_connection(|conn| rows::archive_all_live(conn, dataset_id, del_vn))
            }

            fn upsert_snapshots(&self, snapshots: &[ItemSnapshot]) -> Result<(), StoreError> {
                self.with_connection(|conn| rows::upsert_snapshots(conn, snapshots))
            }

            fn count_snapshots(&self, version_id: VersionId) -> Result<u64, StoreError> {
                self.with_connection(|conn| rows::count_snapshots(conn, version_id))
            }

            fn list_snapshots(&self, version_id: VersionId, page: &PageRequest) -> Result<Page<ItemSnapshot>, StoreError> {
                self.with_connection(|conn| rows::list_snapshots(conn, version_id, page))
            }

            fn delete_snapshots(&self, version_id: VersionId) -> Result<u64, StoreError> {
                self.with_connection(|conn| rows::delete_snapshots(conn, version_id))
            }

            fn insert_job(&self, job: &IoJob) -> Result<IoJob, StoreError> {
                self.with_connection(|conn| rows::insert_job(conn, job))
            }

            fn get_job(&self, id: JobId) -> Result<Option<IoJob>, StoreError> {
                self.with_connection(|conn| rows::get_job(conn, id))
            }

            fn list_jobs(&self, dataset_id: DatasetId, page: &PageRequest) -> Result<Page<IoJob>, StoreError> {
                self.with_connection(|conn| rows::list_jobs(conn, dataset_id, page))
            }

            fn apply_job_delta(&self, id: JobId, delta: &JobDelta) -> Result<IoJob, StoreError> {
                self.with_connection(|conn| rows::apply_job_delta(conn, id, delta))
            }

            fn transition_job(&self, id: JobId, status: JobStatus, at_ms: i64) -> Result<IoJob, StoreError> {
                self.with_connection(|conn| rows::transition_job(conn, id, status, at_ms))
            }
        }
    };
}

// ============================================================================
// SECTION: Repository
// ============================================================================

/// `SQLite`-backed dataset repository.
///
/// # Invariants
/// - Connection access is serialized through a mutex.
/// - A transaction holds the mutex from `BEGIN IMMEDIATE` to commit or
///   rollback.
#[derive(Clone)]
pub struct SqliteRepository {
    /// Shared connection.
    connection: Arc<Mutex<Connection>>,
    /// Database file path.
    path: PathBuf,
}

impl SqliteRepository {
    /// Opens (or creates) the store described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the path is invalid, the database
    /// cannot be opened, or the schema version is unsupported.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        config.validate()?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            path: config.path.clone(),
        })
    }

    /// Returns the database file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Checks that the database answers queries.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the probe query fails.
    pub fn readiness(&self) -> Result<(), SqliteStoreError> {
        let connection = self.lock()?;
        connection.query_row("SELECT 1", params![], |row| row.get::<_, i64>(0)).map_err(db_error)?;
        Ok(())
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Io("sqlite connection lock poisoned".to_string()))
    }
}

impl ConnectionAccess for SqliteRepository {
    fn with_connection<T>(
        &self,
        body: impl FnOnce(&Connection) -> Result<T, SqliteStoreError>,
    ) -> Result<T, StoreError> {
        let connection = self.lock()?;
        Ok(body(&connection)?)
    }
}

/// Transaction-scoped handle.
struct SqliteTransaction<'a> {
    /// Connection with an open transaction.
    connection: &'a Connection,
}

impl ConnectionAccess for SqliteTransaction<'_> {
    fn with_connection<T>(
        &self,
        body: impl FnOnce(&Connection) -> Result<T, SqliteStoreError>,
    ) -> Result<T, StoreError> {
        Ok(body(self.connection)?)
    }
}

sqlite_repository_ops!(SqliteRepository);
sqlite_repository_ops!(SqliteTransaction<'_>);

impl Repository for SqliteRepository {
    fn transaction(&self, body: &mut TransactionFn<'_>) -> Result<(), DatasetError> {
        let mut connection = self.lock().map_err(StoreError::from)?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| StoreError::from(db_error(err)))?;
        body(&SqliteTransaction {
            connection: &tx,
        })?;
        tx.commit().map_err(|err| StoreError::from(db_error(err)))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    if path.display().to_string().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    if path.components().any(|component| component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH) {
        return Err(SqliteStoreError::Invalid("store path contains an overlong component".to_string()));
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid("store path must be a file, not a directory".to_string()));
    }
    Ok(())
}

/// Opens an `SQLite` connection and applies pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags =
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_error)?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms)).map_err(db_error)?;
    Ok(connection)
}

/// Creates the schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(db_error)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);").map_err(db_error)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(db_error)?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION]).map_err(db_error)?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS id_sequence (last_id INTEGER NOT NULL);
                INSERT INTO id_sequence (last_id) VALUES (0);
                CREATE TABLE IF NOT EXISTS datasets (
                    id INTEGER PRIMARY KEY,
                    space_id INTEGER NOT NULL,
                    deleted INTEGER NOT NULL,
                    next_version_num INTEGER NOT NULL,
                    body BLOB NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_datasets_space ON datasets (space_id, id);
                CREATE TABLE IF NOT EXISTS schemas (
                    id INTEGER PRIMARY KEY,
                    dataset_id INTEGER NOT NULL,
                    update_version INTEGER NOT NULL,
                    body BLOB NOT NULL
                );
                CREATE TABLE IF NOT EXISTS versions (
                    id INTEGER PRIMARY KEY,
                    dataset_id INTEGER NOT NULL,
                    version TEXT NOT NULL,
                    version_num INTEGER NOT NULL,
                    update_version INTEGER NOT NULL,
                    body BLOB NOT NULL,
                    UNIQUE (dataset_id, version),
                    UNIQUE (dataset_id, version_num)
                );
                CREATE TABLE IF NOT EXISTS items (
                    id INTEGER PRIMARY KEY,
                    dataset_id INTEGER NOT NULL,
                    item_id INTEGER NOT NULL,
                    item_key TEXT NOT NULL,
                    add_vn INTEGER NOT NULL,
                    del_vn INTEGER,
                    body BLOB NOT NULL
                );
                CREATE UNIQUE INDEX IF NOT EXISTS idx_items_live_key
                    ON items (dataset_id, item_key) WHERE del_vn IS NULL;
                CREATE INDEX IF NOT EXISTS idx_items_dataset ON items (dataset_id, id);
                CREATE INDEX IF NOT EXISTS idx_items_item_id ON items (dataset_id, item_id);
                CREATE TABLE IF NOT EXISTS snapshots (
                    version_id INTEGER NOT NULL,
                    item_id INTEGER NOT NULL,
                    body BLOB NOT NULL,
                    PRIMARY KEY (version_id, item_id)
                );
                CREATE TABLE IF NOT EXISTS jobs (
                    id INTEGER PRIMARY KEY,
                    dataset_id INTEGER NOT NULL,
                    body BLOB NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_jobs_dataset ON jobs (dataset_id, id);",
            )
            .map_err(db_error)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!("unsupported schema version: {value}")));
        }
    }
    tx.commit().map_err(db_error)?;
    Ok(())
}
