// crates/dataset-store-sqlite/src/rows.rs
// ============================================================================
// Module: SQLite Rows
// Description: Per-table statements and row encoding for the repository.
// Purpose: Keep SQL and JSON body handling out of the connection wrapper.
// Dependencies: dataset-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! Every function here takes a plain [`Connection`] so it runs the same way
//! on the shared connection and inside an open transaction. Item rows carry
//! their identity and version window in columns; those columns override the
//! JSON body on read so bulk archive statements never rewrite bodies.

// ============================================================================
// SECTION: Imports
// ============================================================================

use dataset_core::Dataset;
use dataset_core::DatasetId;
use dataset_core::DatasetSchema;
use dataset_core::DatasetStatus;
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
use dataset_core::SchemaId;
use dataset_core::SpaceId;
use dataset_core::VersionId;
use dataset_core::core::time::now_millis;
use dataset_core::effective_limit;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::store::SqliteStoreError;
use crate::store::db_error;

// ============================================================================
// SECTION: Encoding
// ============================================================================

/// Item columns in the order [`map_item_row`] reads them.
const ITEM_COLUMNS: &str = "id, item_id, item_key, dataset_id, add_vn, del_vn, body";

/// Serializes an entity body.
fn encode<T: Serialize>(value: &T, entity: &str) -> Result<Vec<u8>, SqliteStoreError> {
    serde_json::to_vec(value).map_err(|err| SqliteStoreError::Invalid(format!("encode {entity}: {err}")))
}

/// Deserializes an entity body.
fn decode<T: DeserializeOwned>(body: &[u8], entity: &str) -> Result<T, SqliteStoreError> {
    serde_json::from_slice(body).map_err(|err| SqliteStoreError::Corrupt(format!("decode {entity}: {err}")))
}

/// Converts an unsigned counter to a column value.
fn to_column(value: u64, column: &str) -> Result<i64, SqliteStoreError> {
    i64::try_from(value).map_err(|_| SqliteStoreError::Invalid(format!("{column} {value} exceeds the column range")))
}

/// Converts a column value to an unsigned counter.
fn from_column(value: i64, column: &str) -> Result<u64, SqliteStoreError> {
    u64::try_from(value).map_err(|_| SqliteStoreError::Corrupt(format!("{column} {value} is negative")))
}

/// Converts a row count to `u64`.
fn count(value: usize) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

/// Returns the SQL `LIMIT` for one page plus the lookahead row.
fn fetch_limit(limit: usize) -> i64 {
    i64::try_from(effective_limit(limit).saturating_add(1)).unwrap_or(i64::MAX)
}

/// Parses an ascending row cursor (rows strictly after it).
fn cursor_after(page: &PageRequest) -> Result<i64, SqliteStoreError> {
    page.cursor.as_deref().map_or(Ok(0), parse_cursor)
}

/// Parses a descending row cursor (rows strictly before it).
fn cursor_before(page: &PageRequest) -> Result<i64, SqliteStoreError> {
    page.cursor.as_deref().map_or(Ok(i64::MAX), parse_cursor)
}

/// Parses a numeric cursor.
fn parse_cursor(raw: &str) -> Result<i64, SqliteStoreError> {
    raw.parse::<i64>().map_err(|_| SqliteStoreError::Invalid(format!("invalid page cursor {raw:?}")))
}

/// Trims the lookahead row and derives the next cursor.
fn finish_page<T>(mut rows: Vec<T>, limit: usize, cursor_of: impl Fn(&T) -> String) -> Page<T> {
    let limit = effective_limit(limit);
    let next_cursor = if rows.len() > limit {
        rows.truncate(limit);
        rows.last().map(cursor_of)
    } else {
        None
    };
    Page {
        items: rows,
        next_cursor,
    }
}

/// Builds a not-found error.
fn missing(entity: &str, id: impl std::fmt::Display) -> SqliteStoreError {
    SqliteStoreError::NotFound(format!("{entity} {id} not found"))
}

/// Returns `id` when set, otherwise the next shared sequence value.
fn assign_id(conn: &Connection, id: i64) -> Result<i64, SqliteStoreError> {
    if id == 0 {
        return conn
            .query_row("UPDATE id_sequence SET last_id = last_id + 1 RETURNING last_id", params![], |row| row.get(0))
            .map_err(db_error);
    }
    conn.execute("UPDATE id_sequence SET last_id = MAX(last_id, ?1)", params![id]).map_err(db_error)?;
    Ok(id)
}

/// Runs `body` inside a savepoint so read-modify-write updates stay atomic.
fn with_savepoint<T>(
    conn: &Connection,
    body: impl FnOnce(&Connection) -> Result<T, SqliteStoreError>,
) -> Result<T, SqliteStoreError> {
    conn.execute_batch("SAVEPOINT dataset_store_rmw").map_err(db_error)?;
    match body(conn) {
        Ok(value) => {
            conn.execute_batch("RELEASE dataset_store_rmw").map_err(db_error)?;
            Ok(value)
        }
        Err(err) => {
            let _ = conn.execute_batch("ROLLBACK TO dataset_store_rmw; RELEASE dataset_store_rmw");
            Err(err)
        }
    }
}

// ============================================================================
// SECTION: Datasets
// ============================================================================

/// Loads a dataset.
pub fn get_dataset(conn: &Connection, id: DatasetId, options: ReadOptions) -> Result<Option<Dataset>, SqliteStoreError> {
    let body: Option<Vec<u8>> = conn
        .query_row(
            "SELECT body FROM datasets WHERE id = ?1 AND (?2 OR deleted = 0)",
            params![id.get(), options.with_deleted],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_error)?;
    body.map(|body| decode(&body, "dataset")).transpose()
}

/// Lists undeleted datasets of a space by id.
pub fn list_datasets(conn: &Connection, space_id: SpaceId, page: &PageRequest) -> Result<Page<Dataset>, SqliteStoreError> {
    let after = cursor_after(page)?;
    let mut statement = conn
        .prepare_cached(
            "SELECT body FROM datasets WHERE space_id = ?1 AND id > ?2 AND deleted = 0 ORDER BY id LIMIT ?3",
        )
        .map_err(db_error)?;
    let bodies = statement
        .query_map(params![space_id.get(), after, fetch_limit(page.limit)], |row| row.get::<_, Vec<u8>>(0))
        .map_err(db_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_error)?;
    let datasets = bodies.iter().map(|body| decode::<Dataset>(body, "dataset")).collect::<Result<Vec<_>, _>>()?;
    Ok(finish_page(datasets, page.limit, |dataset| dataset.id.to_string()))
}

/// Inserts a dataset, assigning an id when unset.
pub fn insert_dataset(conn: &Connection, dataset: &Dataset) -> Result<Dataset, SqliteStoreError> {
    let mut row = dataset.clone();
    row.id = DatasetId::new(assign_id(conn, row.id.get())?);
    conn.execute(
        "INSERT INTO datasets (id, space_id, deleted, next_version_num, body) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            row.id.get(),
            row.space_id.get(),
            row.status == DatasetStatus::Deleted,
            to_column(row.next_version_num, "next_version_num")?,
            encode(&row, "dataset")?
        ],
    )
    .map_err(|err| match db_error(err) {
        SqliteStoreError::Conflict(_) => SqliteStoreError::Conflict(format!("dataset {} already exists", row.id)),
        other => other,
    })?;
    Ok(row)
}

/// Replaces a dataset when its stored `next_version_num` matches.
pub fn update_dataset(conn: &Connection, dataset: &Dataset, expected_next_version_num: u64) -> Result<(), SqliteStoreError> {
    let changed = conn
        .execute(
            "UPDATE datasets SET space_id = ?1, deleted = ?2, next_version_num = ?3, body = ?4
             WHERE id = ?5 AND next_version_num = ?6",
            params![
                dataset.space_id.get(),
                dataset.status == DatasetStatus::Deleted,
                to_column(dataset.next_version_num, "next_version_num")?,
                encode(dataset, "dataset")?,
                dataset.id.get(),
                to_column(expected_next_version_num, "next_version_num")?
            ],
        )
        .map_err(db_error)?;
    if changed > 0 {
        return Ok(());
    }
    let stored: Option<i64> = conn
        .query_row("SELECT next_version_num FROM datasets WHERE id = ?1", params![dataset.id.get()], |row| row.get(0))
        .optional()
        .map_err(db_error)?;
    match stored {
        None => Err(missing("dataset", dataset.id)),
        Some(stored) => Err(SqliteStoreError::Conflict(format!(
            "dataset {} next_version_num is {stored}, expected {expected_next_version_num}",
            dataset.id
        ))),
    }
}

// ============================================================================
// SECTION: Schemas
// ============================================================================

/// Loads a schema.
pub fn get_schema(conn: &Connection, id: SchemaId) -> Result<Option<DatasetSchema>, SqliteStoreError> {
    let body: Option<Vec<u8>> = conn
        .query_row("SELECT body FROM schemas WHERE id = ?1", params![id.get()], |row| row.get(0))
        .optional()
        .map_err(db_error)?;
    body.map(|body| decode(&body, "schema")).transpose()
}

/// Inserts a schema, assigning an id when unset.
pub fn insert_schema(conn: &Connection, schema: &DatasetSchema) -> Result<DatasetSchema, SqliteStoreError> {
    let mut row = schema.clone();
    row.id = SchemaId::new(assign_id(conn, row.id.get())?);
    conn.execute(
        "INSERT OR REPLACE INTO schemas (id, dataset_id, update_version, body) VALUES (?1, ?2, ?3, ?4)",
        params![
            row.id.get(),
            row.dataset_id.get(),
            to_column(row.update_version, "update_version")?,
            encode(&row, "schema")?
        ],
    )
    .map_err(db_error)?;
    Ok(row)
}

/// Replaces a schema when its stored `update_version` matches.
pub fn update_schema(conn: &Connection, schema: &DatasetSchema, expected_update_version: u64) -> Result<(), SqliteStoreError> {
    let changed = conn
        .execute(
            "UPDATE schemas SET dataset_id = ?1, update_version = ?2, body = ?3 WHERE id = ?4 AND update_version = ?5",
            params![
                schema.dataset_id.get(),
                to_column(schema.update_version, "update_version")?,
                encode(schema, "schema")?,
                schema.id.get(),
                to_column(expected_update_version, "update_version")?
            ],
        )
        .map_err(db_error)?;
    if changed > 0 {
        return Ok(());
    }
    let stored = stored_update_version(conn, "schemas", schema.id.get())?;
    match stored {
        None => Err(missing("schema", schema.id)),
        Some(stored) => Err(SqliteStoreError::Conflict(format!(
            "schema {} update_version is {stored}, expected {expected_update_version}",
            schema.id
        ))),
    }
}

/// Reads the `update_version` column of a guarded row.
fn stored_update_version(conn: &Connection, table: &str, id: i64) -> Result<Option<i64>, SqliteStoreError> {
    conn.query_row(&format!("SELECT update_version FROM {table} WHERE id = ?1"), params![id], |row| row.get(0))
        .optional()
        .map_err(db_error)
}

// ============================================================================
// SECTION: Versions
// ============================================================================

/// Loads a version.
pub fn get_version(conn: &Connection, id: VersionId) -> Result<Option<DatasetVersion>, SqliteStoreError> {
    let body: Option<Vec<u8>> = conn
        .query_row("SELECT body FROM versions WHERE id = ?1", params![id.get()], |row| row.get(0))
        .optional()
        .map_err(db_error)?;
    body.map(|body| decode(&body, "version")).transpose()
}

/// Lists versions of a dataset by version number descending.
pub fn list_versions(
    conn: &Connection,
    dataset_id: DatasetId,
    page: &PageRequest,
) -> Result<Page<DatasetVersion>, SqliteStoreError> {
    let before = cursor_before(page)?;
    let mut statement = conn
        .prepare_cached(
            "SELECT body FROM versions WHERE dataset_id = ?1 AND version_num < ?2 ORDER BY version_num DESC LIMIT ?3",
        )
        .map_err(db_error)?;
    let bodies = statement
        .query_map(params![dataset_id.get(), before, fetch_limit(page.limit)], |row| row.get::<_, Vec<u8>>(0))
        .map_err(db_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_error)?;
    let versions =
        bodies.iter().map(|body| decode::<DatasetVersion>(body, "version")).collect::<Result<Vec<_>, _>>()?;
    Ok(finish_page(versions, page.limit, |version| version.version_num.to_string()))
}

/// Inserts a version; the version string and number are unique per dataset.
pub fn insert_version(conn: &Connection, version: &DatasetVersion) -> Result<DatasetVersion, SqliteStoreError> {
    let mut row = version.clone();
    row.id = VersionId::new(assign_id(conn, row.id.get())?);
    conn.execute(
        "INSERT INTO versions (id, dataset_id, version, version_num, update_version, body)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            row.id.get(),
            row.dataset_id.get(),
            row.version,
            to_column(row.version_num, "version_num")?,
            to_column(row.update_version, "update_version")?,
            encode(&row, "version")?
        ],
    )
    .map_err(|err| match db_error(err) {
        SqliteStoreError::Conflict(_) => SqliteStoreError::Conflict(format!(
            "dataset {} already has version {}",
            version.dataset_id, version.version
        )),
        other => other,
    })?;
    Ok(row)
}

/// Replaces a version when its stored `update_version` matches.
pub fn update_version(
    conn: &Connection,
    version: &DatasetVersion,
    expected_update_version: u64,
) -> Result<(), SqliteStoreError> {
    let changed = conn
        .execute(
            "UPDATE versions SET update_version = ?1, body = ?2 WHERE id = ?3 AND update_version = ?4",
            params![
                to_column(version.update_version, "update_version")?,
                encode(version, "version")?,
                version.id.get(),
                to_column(expected_update_version, "update_version")?
            ],
        )
        .map_err(db_error)?;
    if changed > 0 {
        return Ok(());
    }
    match stored_update_version(conn, "versions", version.id.get())? {
        None => Err(missing("version", version.id)),
        Some(stored) => Err(SqliteStoreError::Conflict(format!(
            "version {} update_version is {stored}, expected {expected_update_version}",
            version.id
        ))),
    }
}

/// Physically deletes a version row.
pub fn delete_version(conn: &Connection, id: VersionId) -> Result<(), SqliteStoreError> {
    let removed = conn.execute("DELETE FROM versions WHERE id = ?1", params![id.get()]).map_err(db_error)?;
    if removed == 0 {
        return Err(missing("version", id));
    }
    Ok(())
}

// ============================================================================
// SECTION: Items
// ============================================================================

/// Raw item row before the body is decoded.
struct ItemRow {
    /// Row id column.
    id: i64,
    /// Item id column.
    item_id: i64,
    /// Idempotency key column.
    item_key: String,
    /// Dataset column.
    dataset_id: i64,
    /// First version column.
    add_vn: i64,
    /// End version column.
    del_vn: Option<i64>,
    /// JSON body.
    body: Vec<u8>,
}

impl ItemRow {
    /// Decodes the body and overlays the column values.
    fn into_item(self) -> Result<Item, SqliteStoreError> {
        let mut item: Item = decode(&self.body, "item")?;
        item.id = ItemRowId::new(self.id);
        item.item_id = ItemId::new(self.item_id);
        item.item_key = self.item_key;
        item.dataset_id = DatasetId::new(self.dataset_id);
        item.add_vn = from_column(self.add_vn, "add_vn")?;
        item.del_vn = self.del_vn.map(|del_vn| from_column(del_vn, "del_vn")).transpose()?;
        Ok(item)
    }
}

/// Maps a row selected with [`ITEM_COLUMNS`].
fn map_item_row(row: &Row<'_>) -> rusqlite::Result<ItemRow> {
    Ok(ItemRow {
        id: row.get(0)?,
        item_id: row.get(1)?,
        item_key: row.get(2)?,
        dataset_id: row.get(3)?,
        add_vn: row.get(4)?,
        del_vn: row.get(5)?,
        body: row.get(6)?,
    })
}

/// Runs an item query and decodes every row.
fn query_items(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Item>, SqliteStoreError> {
    let mut statement = conn.prepare_cached(sql).map_err(db_error)?;
    let rows = statement
        .query_map(params, map_item_row)
        .map_err(db_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_error)?;
    rows.into_iter().map(ItemRow::into_item).collect()
}

/// Loads rows by row id, skipping missing ids and other datasets.
pub fn get_items(conn: &Connection, dataset_id: DatasetId, ids: &[ItemRowId]) -> Result<Vec<Item>, SqliteStoreError> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1 AND dataset_id = ?2");
    let mut items = Vec::with_capacity(ids.len());
    for id in ids {
        items.extend(query_items(conn, &sql, params![id.get(), dataset_id.get()])?);
    }
    Ok(items)
}

/// Loads live rows by item id in row order.
pub fn get_live_items_by_item_ids(
    conn: &Connection,
    dataset_id: DatasetId,
    item_ids: &[ItemId],
) -> Result<Vec<Item>, SqliteStoreError> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE dataset_id = ?1 AND item_id = ?2 AND del_vn IS NULL");
    let mut items = Vec::new();
    for item_id in item_ids {
        items.extend(query_items(conn, &sql, params![dataset_id.get(), item_id.get()])?);
    }
    items.sort_by_key(|item| item.id);
    items.dedup_by_key(|item| item.id);
    Ok(items)
}

/// Loads live rows by idempotency key in row order.
pub fn get_live_items_by_keys(
    conn: &Connection,
    dataset_id: DatasetId,
    keys: &[String],
) -> Result<Vec<Item>, SqliteStoreError> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE dataset_id = ?1 AND item_key = ?2 AND del_vn IS NULL");
    let mut items = Vec::new();
    for key in keys {
        items.extend(query_items(conn, &sql, params![dataset_id.get(), key])?);
    }
    items.sort_by_key(|item| item.id);
    items.dedup_by_key(|item| item.id);
    Ok(items)
}

/// Lists live rows by row id.
pub fn list_live_items(conn: &Connection, dataset_id: DatasetId, page: &PageRequest) -> Result<Page<Item>, SqliteStoreError> {
    let after = cursor_after(page)?;
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM items WHERE dataset_id = ?1 AND id > ?2 AND del_vn IS NULL ORDER BY id LIMIT ?3"
    );
    let items = query_items(conn, &sql, params![dataset_id.get(), after, fetch_limit(page.limit)])?;
    Ok(finish_page(items, page.limit, |item| item.id.to_string()))
}

/// Lists rows inside the window of `version_num` by row id.
pub fn list_items_at_version(
    conn: &Connection,
    dataset_id: DatasetId,
    version_num: u64,
    page: &PageRequest,
) -> Result<Page<Item>, SqliteStoreError> {
    let after = cursor_after(page)?;
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM items
         WHERE dataset_id = ?1 AND id > ?2 AND add_vn <= ?3 AND (del_vn IS NULL OR del_vn > ?3)
         ORDER BY id LIMIT ?4"
    );
    let vn = to_column(version_num, "version_num")?;
    let items = query_items(conn, &sql, params![dataset_id.get(), after, vn, fetch_limit(page.limit)])?;
    Ok(finish_page(items, page.limit, |item| item.id.to_string()))
}

/// Counts rows inside the window of `version_num`.
pub fn count_items_at_version(conn: &Connection, dataset_id: DatasetId, version_num: u64) -> Result<u64, SqliteStoreError> {
    let total: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM items WHERE dataset_id = ?1 AND add_vn <= ?2 AND (del_vn IS NULL OR del_vn > ?2)",
            params![dataset_id.get(), to_column(version_num, "version_num")?],
            |row| row.get(0),
        )
        .map_err(db_error)?;
    from_column(total, "count")
}

/// Counts live rows.
pub fn count_live_items(conn: &Connection, dataset_id: DatasetId) -> Result<u64, SqliteStoreError> {
    let total: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM items WHERE dataset_id = ?1 AND del_vn IS NULL",
            params![dataset_id.get()],
            |row| row.get(0),
        )
        .map_err(db_error)?;
    from_column(total, "count")
}

/// Inserts rows, skipping live `item_key` collisions and taken row ids.
pub fn insert_items(conn: &Connection, items: &[Item]) -> Result<Vec<Item>, SqliteStoreError> {
    let mut statement = conn
        .prepare_cached(
            "INSERT OR IGNORE INTO items (id, item_id, item_key, dataset_id, add_vn, del_vn, body)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .map_err(db_error)?;
    let mut inserted = Vec::with_capacity(items.len());
    for item in items {
        let mut row = item.clone();
        row.id = ItemRowId::new(assign_id(conn, row.id.get())?);
        if row.item_id.is_unset() {
            row.item_id = ItemId::new(row.id.get());
        }
        if row.item_key.is_empty() {
            row.item_key = row.item_id.to_string();
        }
        let del_vn = row.del_vn.map(|del_vn| to_column(del_vn, "del_vn")).transpose()?;
        let changed = statement
            .execute(params![
                row.id.get(),
                row.item_id.get(),
                row.item_key,
                row.dataset_id.get(),
                to_column(row.add_vn, "add_vn")?,
                del_vn,
                encode(&row, "item")?
            ])
            .map_err(db_error)?;
        if changed > 0 {
            inserted.push(row);
        }
    }
    Ok(inserted)
}

/// Replaces a live row in place.
pub fn update_item(conn: &Connection, item: &Item) -> Result<(), SqliteStoreError> {
    let del_vn = item.del_vn.map(|del_vn| to_column(del_vn, "del_vn")).transpose()?;
    let changed = conn
        .execute(
            "UPDATE items SET item_id = ?1, item_key = ?2, add_vn = ?3, del_vn = ?4, body = ?5
             WHERE id = ?6 AND dataset_id = ?7 AND del_vn IS NULL",
            params![
                item.item_id.get(),
                item.item_key,
                to_column(item.add_vn, "add_vn")?,
                del_vn,
                encode(item, "item")?,
                item.id.get(),
                item.dataset_id.get()
            ],
        )
        .map_err(db_error)?;
    if changed == 0 {
        return Err(missing("item", item.id));
    }
    Ok(())
}

/// Ends live rows at `del_vn`.
pub fn archive_items(
    conn: &Connection,
    dataset_id: DatasetId,
    ids: &[ItemRowId],
    del_vn: u64,
) -> Result<u64, SqliteStoreError> {
    let del_vn = to_column(del_vn, "del_vn")?;
    let mut statement = conn
        .prepare_cached("UPDATE items SET del_vn = ?1 WHERE id = ?2 AND dataset_id = ?3 AND del_vn IS NULL")
        .map_err(db_error)?;
    let mut archived = 0;
    for id in ids {
        archived += statement.execute(params![del_vn, id.get(), dataset_id.get()]).map_err(db_error)?;
    }
    Ok(count(archived))
}

/// Physically deletes rows of a dataset.
pub fn delete_items(conn: &Connection, dataset_id: DatasetId, ids: &[ItemRowId]) -> Result<u64, SqliteStoreError> {
    let mut statement =
        conn.prepare_cached("DELETE FROM items WHERE id = ?1 AND dataset_id = ?2").map_err(db_error)?;
    let mut removed = 0;
    for id in ids {
        removed += statement.execute(params![id.get(), dataset_id.get()]).map_err(db_error)?;
    }
    Ok(count(removed))
}

/// Ends every live row: rows added at or after `del_vn` are removed, the
/// rest archived.
pub fn archive_all_live(conn: &Connection, dataset_id: DatasetId, del_vn: u64) -> Result<u64, SqliteStoreError> {
    let del_vn = to_column(del_vn, "del_vn")?;
    with_savepoint(conn, |conn| {
        let removed = conn
            .execute(
                "DELETE FROM items WHERE dataset_id = ?1 AND del_vn IS NULL AND add_vn >= ?2",
                params![dataset_id.get(), del_vn],
            )
            .map_err(db_error)?;
        let archived = conn
            .execute(
                "UPDATE items SET del_vn = ?2 WHERE dataset_id = ?1 AND del_vn IS NULL",
                params![dataset_id.get(), del_vn],
            )
            .map_err(db_error)?;
        Ok(count(removed + archived))
    })
}

// ============================================================================
// SECTION: Snapshots
// ============================================================================

/// Inserts or replaces snapshots keyed by `(version_id, item_id)`.
pub fn upsert_snapshots(conn: &Connection, snapshots: &[ItemSnapshot]) -> Result<(), SqliteStoreError> {
    with_savepoint(conn, |conn| {
        let mut statement = conn
            .prepare_cached(
                "INSERT INTO snapshots (version_id, item_id, body) VALUES (?1, ?2, ?3)
                 ON CONFLICT (version_id, item_id) DO UPDATE SET body = excluded.body",
            )
            .map_err(db_error)?;
        for snapshot in snapshots {
            statement
                .execute(params![
                    snapshot.version_id.get(),
                    snapshot.item.item_id.get(),
                    encode(snapshot, "snapshot")?
                ])
                .map_err(db_error)?;
        }
        Ok(())
    })
}

/// Counts snapshots of a version.
pub fn count_snapshots(conn: &Connection, version_id: VersionId) -> Result<u64, SqliteStoreError> {
    let total: i64 = conn
        .query_row("SELECT COUNT(*) FROM snapshots WHERE version_id = ?1", params![version_id.get()], |row| row.get(0))
        .map_err(db_error)?;
    from_column(total, "count")
}

/// Lists snapshots of a version by item id.
pub fn list_snapshots(
    conn: &Connection,
    version_id: VersionId,
    page: &PageRequest,
) -> Result<Page<ItemSnapshot>, SqliteStoreError> {
    let after = cursor_after(page)?;
    let mut statement = conn
        .prepare_cached(
            "SELECT body FROM snapshots WHERE version_id = ?1 AND item_id > ?2 ORDER BY item_id LIMIT ?3",
        )
        .map_err(db_error)?;
    let bodies = statement
        .query_map(params![version_id.get(), after, fetch_limit(page.limit)], |row| row.get::<_, Vec<u8>>(0))
        .map_err(db_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_error)?;
    let snapshots =
        bodies.iter().map(|body| decode::<ItemSnapshot>(body, "snapshot")).collect::<Result<Vec<_>, _>>()?;
    Ok(finish_page(snapshots, page.limit, |snapshot| snapshot.item.item_id.to_string()))
}

/// Deletes snapshots of a version.
pub fn delete_snapshots(conn: &Connection, version_id: VersionId) -> Result<u64, SqliteStoreError> {
    let removed =
        conn.execute("DELETE FROM snapshots WHERE version_id = ?1", params![version_id.get()]).map_err(db_error)?;
    Ok(count(removed))
}

// ============================================================================
// SECTION: Jobs
// ============================================================================

/// Inserts a job, assigning an id when unset.
pub fn insert_job(conn: &Connection, job: &IoJob) -> Result<IoJob, SqliteStoreError> {
    let mut row = job.clone();
    row.id = JobId::new(assign_id(conn, row.id.get())?);
    write_job(conn, &row)?;
    Ok(row)
}

/// Writes a job row.
fn write_job(conn: &Connection, job: &IoJob) -> Result<(), SqliteStoreError> {
    conn.execute(
        "INSERT OR REPLACE INTO jobs (id, dataset_id, body) VALUES (?1, ?2, ?3)",
        params![job.id.get(), job.dataset_id.get(), encode(job, "job")?],
    )
    .map_err(db_error)?;
    Ok(())
}

/// Loads a job.
pub fn get_job(conn: &Connection, id: JobId) -> Result<Option<IoJob>, SqliteStoreError> {
    let body: Option<Vec<u8>> = conn
        .query_row("SELECT body FROM jobs WHERE id = ?1", params![id.get()], |row| row.get(0))
        .optional()
        .map_err(db_error)?;
    body.map(|body| decode(&body, "job")).transpose()
}

/// Lists jobs of a dataset by id descending.
pub fn list_jobs(conn: &Connection, dataset_id: DatasetId, page: &PageRequest) -> Result<Page<IoJob>, SqliteStoreError> {
    let before = cursor_before(page)?;
    let mut statement = conn
        .prepare_cached("SELECT body FROM jobs WHERE dataset_id = ?1 AND id < ?2 ORDER BY id DESC LIMIT ?3")
        .map_err(db_error)?;
    let bodies = statement
        .query_map(params![dataset_id.get(), before, fetch_limit(page.limit)], |row| row.get::<_, Vec<u8>>(0))
        .map_err(db_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_error)?;
    let jobs = bodies.iter().map(|body| decode::<IoJob>(body, "job")).collect::<Result<Vec<_>, _>>()?;
    Ok(finish_page(jobs, page.limit, |job| job.id.to_string()))
}

/// Applies a guarded delta.
pub fn apply_job_delta(conn: &Connection, id: JobId, delta: &JobDelta) -> Result<IoJob, SqliteStoreError> {
    with_savepoint(conn, |conn| {
        let mut job = get_job(conn, id)?.ok_or_else(|| missing("job", id))?;
        job.apply_delta(delta, now_millis()).map_err(SqliteStoreError::Conflict)?;
        write_job(conn, &job)?;
        Ok(job)
    })
}

/// Moves a non-terminal job to `status`.
pub fn transition_job(conn: &Connection, id: JobId, status: JobStatus, at_ms: i64) -> Result<IoJob, SqliteStoreError> {
    with_savepoint(conn, |conn| {
        let mut job = get_job(conn, id)?.ok_or_else(|| missing("job", id))?;
        job.transition(status, at_ms).map_err(SqliteStoreError::Conflict)?;
        write_job(conn, &job)?;
        Ok(job)
    })
}
