// crates/dataset-core/src/runtime/memory/repository.rs
// ============================================================================
// Module: In-Memory Repository
// Description: Mutex-guarded table set implementing the repository contract.
// Purpose: Back tests and single-node runs with exact transactional semantics.
// Dependencies: crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryRepository`] keeps every table in one [`MemoryTables`] value
//! behind a mutex. A transaction clones the tables, runs the body against the
//! clone, and swaps it in only when the body succeeds, so rollback is exact.
//! Faults can be injected per operation name to exercise crash and retry
//! paths.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::core::dataset::Dataset;
use crate::core::dataset::DatasetStatus;
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
use crate::core::job::IoJob;
use crate::core::job::JobDelta;
use crate::core::job::JobStatus;
use crate::core::schema::DatasetSchema;
use crate::core::time::now_millis;
use crate::core::version::DatasetVersion;
use crate::interfaces::Page;
use crate::interfaces::PageRequest;
use crate::interfaces::ReadOptions;
use crate::interfaces::Repository;
use crate::interfaces::RepositoryOps;
use crate::interfaces::StoreError;
use crate::interfaces::TransactionFn;
use crate::interfaces::effective_limit;
use crate::interfaces::parse_row_cursor;

// ============================================================================
// SECTION: Tables
// ============================================================================

/// Every table of the in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryTables {
    datasets: BTreeMap<DatasetId, Dataset>,
    schemas: BTreeMap<SchemaId, DatasetSchema>,
    versions: BTreeMap<VersionId, DatasetVersion>,
    items: BTreeMap<ItemRowId, Item>,
    snapshots: BTreeMap<(VersionId, ItemId), ItemSnapshot>,
    jobs: BTreeMap<JobId, IoJob>,
    last_id: i64,
}

impl MemoryTables {
    /// Returns `id` when set, otherwise the next auto-increment value.
    fn assign(&mut self, id: i64) -> i64 {
        if id == 0 {
            self.last_id += 1;
            self.last_id
        } else {
            self.last_id = self.last_id.max(id);
            id
        }
    }
}

/// Builds one page from rows already ordered and filtered past the cursor.
fn paginate<T, I>(rows: I, limit: usize, cursor_of: impl Fn(&T) -> String) -> Page<T>
where
    I: Iterator<Item = T>,
{
    let limit = effective_limit(limit);
    let mut items: Vec<T> = rows.take(limit + 1).collect();
    let next_cursor = if items.len() > limit {
        items.truncate(limit);
        items.last().map(&cursor_of)
    } else {
        None
    };
    Page {
        items,
        next_cursor,
    }
}

fn missing(entity: &str, id: impl std::fmt::Display) -> StoreError {
    StoreError::NotFound(format!("{entity} {id} not found"))
}

// ============================================================================
// SECTION: Table Operations
// ============================================================================

/// Access to a mutable table set for one operation.
trait TableAccess {
    /// Runs `body` with exclusive access to the tables.
    fn with_tables<T>(
        &self,
        operation: &'static str,
        body: impl FnOnce(&mut MemoryTables) -> Result<T, StoreError>,
    ) -> Result<T, StoreError>;
}

/// Implements [`RepositoryOps`] for a [`TableAccess`] type.
macro_rules! table_repository_ops {
    ($target:ty) => {
        impl RepositoryOps for $target {
            fn get_dataset(&self, id: DatasetId, options: ReadOptions) -> Result<Option<Dataset>, StoreError> {
                self.with_tables("get_dataset", |tables| {
                    Ok(tables
                        .datasets
                        .get(&id)
                        .filter(|dataset| options.with_deleted || dataset.status != DatasetStatus::Deleted)
                        .cloned())
                })
            }

            fn list_datasets(&self, space_id: SpaceId, page: &PageRequest) -> Result<Page<Dataset>, StoreError> {
                let after = parse_row_cursor(page.cursor.as_deref())?;
                self.with_tables("list_datasets", |tables| {
                    let rows = tables.datasets.values().filter(|dataset| {
                        dataset.space_id == space_id
                            && dataset.id.get() > after
                            && dataset.status != DatasetStatus::Deleted
                    });
                    Ok(paginate(rows.cloned(), page.limit, |dataset| dataset.id.to_string()))
                })
            }

            fn insert_dataset(&self, dataset: &Dataset) -> Result<Dataset, StoreError> {
                self.with_tables("insert_dataset", |tables| {
                    let mut row = dataset.clone();
                    row.id = DatasetId::new(tables.assign(row.id.get()));
                    if tables.datasets.contains_key(&row.id) {
                        return Err(StoreError::Conflict(format!("dataset {} already exists", row.id)));
                    }
                    tables.datasets.insert(row.id, row.clone());
                    Ok(row)
                })
            }

            fn update_dataset(&self, dataset: &Dataset, expected_next_version_num: u64) -> Result<(), StoreError> {
                self.with_tables("update_dataset", |tables| {
                    let stored = tables.datasets.get_mut(&dataset.id).ok_or_else(|| missing("dataset", dataset.id))?;
                    if stored.next_version_num != expected_next_version_num {
                        return Err(StoreError::Conflict(format!(
                            "dataset {} next_version_num is {}, expected {expected_next_version_num}",
                            dataset.id, stored.next_version_num
                        )));
                    }
                    *stored = dataset.clone();
                    Ok(())
                })
            }

            fn get_schema(&self, id: SchemaId) -> Result<Option<DatasetSchema>, StoreError> {
                self.with_tables("get_schema", |tables| Ok(tables.schemas.get(&id).cloned()))
            }

            fn insert_schema(&self, schema: &DatasetSchema) -> Result<DatasetSchema, StoreError> {
                self.with_tables("insert_schema", |tables| {
                    let mut row = schema.clone();
                    row.id = SchemaId::new(tables.assign(row.id.get()));
                    tables.schemas.insert(row.id, row.clone());
                    Ok(row)
                })
            }

            fn update_schema(&self, schema: &DatasetSchema, expected_update_version: u64) -> Result<(), StoreError> {
                self.with_tables("update_schema", |tables| {
                    let stored = tables.schemas.get_mut(&schema.id).ok_or_else(|| missing("schema", schema.id))?;
                    if stored.update_version != expected_update_version {
                        return Err(StoreError::Conflict(format!(
                            "schema {} update_version is {}, expected {expected_update_version}",
                            schema.id, stored.update_version
                        )));
                    }
                    *stored = schema.clone();
                    Ok(())
                })
            }

            fn get_version(&self, id: VersionId) -> Result<Option<DatasetVersion>, StoreError> {
                self.with_tables("get_version", |tables| Ok(tables.versions.get(&id).cloned()))
            }

            fn list_versions(&self, dataset_id: DatasetId, page: &PageRequest) -> Result<Page<DatasetVersion>, StoreError> {
                let before = match page.cursor.as_deref() {
                    Some(raw) => {
                        raw.parse::<u64>().map_err(|_| StoreError::Invalid(format!("invalid page cursor {raw:?}")))?
                    }
                    None => u64::MAX,
                };
                self.with_tables("list_versions", |tables| {
                    let mut rows: Vec<DatasetVersion> = tables
                        .versions
                        .values()
                        .filter(|version| version.dataset_id == dataset_id && version.version_num < before)
                        .cloned()
                        .collect();
                    rows.sort_by(|left, right| right.version_num.cmp(&left.version_num));
                    Ok(paginate(rows.into_iter(), page.limit, |version| version.version_num.to_string()))
                })
            }

            fn insert_version(&self, version: &DatasetVersion) -> Result<DatasetVersion, StoreError> {
                self.with_tables("insert_version", |tables| {
                    let duplicate = tables.versions.values().any(|existing| {
                        existing.dataset_id == version.dataset_id
                            && (existing.version == version.version || existing.version_num == version.version_num)
                    });
                    if duplicate {
                        return Err(StoreError::Conflict(format!(
                            "dataset {} already has version {}",
                            version.dataset_id, version.version
                        )));
                    }
                    let mut row = version.clone();
                    row.id = VersionId::new(tables.assign(row.id.get()));
                    tables.versions.insert(row.id, row.clone());
                    Ok(row)
                })
            }

            fn update_version(&self, version: &DatasetVersion, expected_update_version: u64) -> Result<(), StoreError> {
                self.with_tables("update_version", |tables| {
                    let stored = tables.versions.get_mut(&version.id).ok_or_else(|| missing("version", version.id))?;
                    if stored.update_version != expected_update_version {
                        return Err(StoreError::Conflict(format!(
                            "version {} update_version is {}, expected {expected_update_version}",
                            version.id, stored.update_version
                        )));
                    }
                    *stored = version.clone();
                    Ok(())
                })
            }

            fn delete_version(&self, id: VersionId) -> Result<(), StoreError> {
                self.with_tables("delete_version", |tables| {
                    tables.versions.remove(&id).map(|_| ()).ok_or_else(|| missing("version", id))
                })
            }

            fn get_items(&self, dataset_id: DatasetId, ids: &[ItemRowId]) -> Result<Vec<Item>, StoreError> {
                self.with_tables("get_items", |tables| {
                    Ok(ids
                        .iter()
                        .filter_map(|id| tables.items.get(id))
                        .filter(|item| item.dataset_id == dataset_id)
                        .cloned()
                        .collect())
                })
            }

            fn get_live_items_by_item_ids(&self, dataset_id: DatasetId, item_ids: &[ItemId]) -> Result<Vec<Item>, StoreError> {
                self.with_tables("get_live_items_by_item_ids", |tables| {
                    Ok(tables
                        .items
                        .values()
                        .filter(|item| item.dataset_id == dataset_id && item.is_live() && item_ids.contains(&item.item_id))
                        .cloned()
                        .collect())
                })
            }

            fn get_live_items_by_keys(&self, dataset_id: DatasetId, keys: &[String]) -> Result<Vec<Item>, StoreError> {
                self.with_tables("get_live_items_by_keys", |tables| {
                    Ok(tables
                        .items
                        .values()
                        .filter(|item| item.dataset_id == dataset_id && item.is_live() && keys.contains(&item.item_key))
                        .cloned()
                        .collect())
                })
            }

            fn list_live_items(&self, dataset_id: DatasetId, page: &PageRequest) -> Result<Page<Item>, StoreError> {
                let after = parse_row_cursor(page.cursor.as_deref())?;
                self.with_tables("list_live_items", |tables| {
                    let rows = tables
                        .items
                        .range(ItemRowId::new(after.saturating_add(1)) ..)
                        .map(|(_, item)| item)
                        .filter(|item| item.dataset_id == dataset_id && item.is_live());
                    Ok(paginate(rows.cloned(), page.limit, |item| item.id.to_string()))
                })
            }

            fn list_items_at_version(
                &self,
                dataset_id: DatasetId,
                version_num: u64,
                page: &PageRequest,
            ) -> Result<Page<Item>, StoreError> {
                let after = parse_row_cursor(page.cursor.as_deref())?;
                self.with_tables("list_items_at_version", |tables| {
                    let rows = tables
                        .items
                        .range(ItemRowId::new(after.saturating_add(1)) ..)
                        .map(|(_, item)| item)
                        .filter(|item| item.dataset_id == dataset_id && item.is_live_at(version_num));
                    Ok(paginate(rows.cloned(), page.limit, |item| item.id.to_string()))
                })
            }

            fn count_items_at_version(&self, dataset_id: DatasetId, version_num: u64) -> Result<u64, StoreError> {
                self.with_tables("count_items_at_version", |tables| {
                    let count = tables
                        .items
                        .values()
                        .filter(|item| item.dataset_id == dataset_id && item.is_live_at(version_num))
                        .count();
                    Ok(u64::try_from(count).unwrap_or(u64::MAX))
                })
            }

            fn count_live_items(&self, dataset_id: DatasetId) -> Result<u64, StoreError> {
                self.with_tables("count_live_items", |tables| {
                    let count = tables.items.values().filter(|item| item.dataset_id == dataset_id && item.is_live()).count();
                    Ok(u64::try_from(count).unwrap_or(u64::MAX))
                })
            }

            fn insert_items(&self, items: &[Item]) -> Result<Vec<Item>, StoreError> {
                self.with_tables("insert_items", |tables| {
                    let mut inserted = Vec::with_capacity(items.len());
                    for item in items {
                        let mut row = item.clone();
                        row.id = ItemRowId::new(tables.assign(row.id.get()));
                        if row.item_id.is_unset() {
                            row.item_id = ItemId::new(row.id.get());
                        }
                        if row.item_key.is_empty() {
                            row.item_key = row.item_id.to_string();
                        }
                        let conflict = tables.items.values().any(|existing| {
                            existing.dataset_id == row.dataset_id && existing.is_live() && existing.item_key == row.item_key
                        });
                        if conflict || tables.items.contains_key(&row.id) {
                            continue;
                        }
                        tables.items.insert(row.id, row.clone());
                        inserted.push(row);
                    }
                    Ok(inserted)
                })
            }

            fn update_item(&self, item: &Item) -> Result<(), StoreError> {
                self.with_tables("update_item", |tables| {
                    let stored = tables
                        .items
                        .get_mut(&item.id)
                        .filter(|stored| stored.dataset_id == item.dataset_id && stored.is_live())
                        .ok_or_else(|| missing("item", item.id))?;
                    *stored = item.clone();
                    Ok(())
                })
            }

            fn archive_items(&self, dataset_id: DatasetId, ids: &[ItemRowId], del_vn: u64) -> Result<u64, StoreError> {
                self.with_tables("archive_items", |tables| {
                    let mut archived = 0;
                    for id in ids {
                        if let Some(item) = tables.items.get_mut(id)
                            && item.dataset_id == dataset_id
                            && item.is_live()
                        {
                            item.del_vn = Some(del_vn);
                            archived += 1;
                        }
                    }
                    Ok(archived)
                })
            }

            fn delete_items(&self, dataset_id: DatasetId, ids: &[ItemRowId]) -> Result<u64, StoreError> {
                self.with_tables("delete_items", |tables| {
                    let mut removed = 0;
                    for id in ids {
                        if tables.items.get(id).is_some_and(|item| item.dataset_id == dataset_id) {
                            tables.items.remove(id);
                            removed += 1;
                        }
                    }
                    Ok(removed)
                })
            }

            fn archive_all_live(&self, dataset_id: DatasetId, del_vn: u64) -> Result<u64, StoreError> {
                self.with_tables("archive_all_live", |tables| {
                    let mut affected = 0;
                    tables.items.retain(|_, item| {
                        if item.dataset_id != dataset_id || !item.is_live() {
                            return true;
                        }
                        affected += 1;
                        if item.add_vn >= del_vn {
                            return false;
                        }
                        item.del_vn = Some(del_vn);
                        true
                    });
                    Ok(affected)
                })
            }

            fn upsert_snapshots(&self, snapshots: &[ItemSnapshot]) -> Result<(), StoreError> {
                self.with_tables("upsert_snapshots", |tables| {
                    for snapshot in snapshots {
                        tables.snapshots.insert((snapshot.version_id, snapshot.item.item_id), snapshot.clone());
                    }
                    Ok(())
                })
            }

            fn count_snapshots(&self, version_id: VersionId) -> Result<u64, StoreError> {
                self.with_tables("count_snapshots", |tables| {
                    let count = tables.snapshots.keys().filter(|(version, _)| *version == version_id).count();
                    Ok(u64::try_from(count).unwrap_or(u64::MAX))
                })
            }

            fn list_snapshots(&self, version_id: VersionId, page: &PageRequest) -> Result<Page<ItemSnapshot>, StoreError> {
                let after = parse_row_cursor(page.cursor.as_deref())?;
                self.with_tables("list_snapshots", |tables| {
                    let rows = tables
                        .snapshots
                        .range((version_id, ItemId::new(after.saturating_add(1))) ..)
                        .take_while(|((version, _), _)| *version == version_id)
                        .map(|(_, snapshot)| snapshot.clone());
                    Ok(paginate(rows, page.limit, |snapshot| snapshot.item.item_id.to_string()))
                })
            }

            fn delete_snapshots(&self, version_id: VersionId) -> Result<u64, StoreError> {
                self.with_tables("delete_snapshots", |tables| {
                    let before = tables.snapshots.len();
                    tables.snapshots.retain(|(version, _), _| *version != version_id);
                    Ok(u64::try_from(before - tables.snapshots.len()).unwrap_or(u64::MAX))
                })
            }

            fn insert_job(&self, job: &IoJob) -> Result<IoJob, StoreError> {
                self.with_tables("insert_job", |tables| {
                    let mut row = job.clone();
                    row.id = JobId::new(tables.assign(row.id.get()));
                    tables.jobs.insert(row.id, row.clone());
                    Ok(row)
                })
            }

            fn get_job(&self, id: JobId) -> Result<Option<IoJob>, StoreError> {
                self.with_tables("get_job", |tables| Ok(tables.jobs.get(&id).cloned()))
            }

            fn list_jobs(&self, dataset_id: DatasetId, page: &PageRequest) -> Result<Page<IoJob>, StoreError> {
                let before = page.cursor.as_deref().map_or(Ok(i64::MAX), |raw| parse_row_cursor(Some(raw)))?;
                self.with_tables("list_jobs", |tables| {
                    let rows = tables
                        .jobs
                        .values()
                        .rev()
                        .filter(|job| job.dataset_id == dataset_id && job.id.get() < before)
                        .cloned();
                    Ok(paginate(rows, page.limit, |job| job.id.to_string()))
                })
            }

            fn apply_job_delta(&self, id: JobId, delta: &JobDelta) -> Result<IoJob, StoreError> {
                self.with_tables("apply_job_delta", |tables| {
                    let job = tables.jobs.get_mut(&id).ok_or_else(|| missing("job", id))?;
                    job.apply_delta(delta, now_millis()).map_err(StoreError::Conflict)?;
                    Ok(job.clone())
                })
            }

            fn transition_job(&self, id: JobId, status: JobStatus, at_ms: i64) -> Result<IoJob, StoreError> {
                self.with_tables("transition_job", |tables| {
                    let job = tables.jobs.get_mut(&id).ok_or_else(|| missing("job", id))?;
                    job.transition(status, at_ms).map_err(StoreError::Conflict)?;
                    Ok(job.clone())
                })
            }
        }
    };
}

// ============================================================================
// SECTION: Fault Injection
// ============================================================================

/// Planned failure for one repository operation.
#[derive(Debug, Clone, Copy, Default)]
struct FaultRule {
    /// Calls that still succeed before failures start.
    skip: usize,
    /// Remaining failing calls.
    failures: usize,
}

/// Shared fault plan keyed by operation name.
#[derive(Debug, Clone, Default)]
struct FaultPlan {
    rules: Arc<Mutex<BTreeMap<&'static str, FaultRule>>>,
}

impl FaultPlan {
    fn check(&self, operation: &'static str) -> Result<(), StoreError> {
        let mut rules =
            self.rules.lock().map_err(|_| StoreError::Store("fault plan lock poisoned".to_string()))?;
        let Some(rule) = rules.get_mut(operation) else {
            return Ok(());
        };
        if rule.skip > 0 {
            rule.skip -= 1;
            return Ok(());
        }
        if rule.failures > 0 {
            rule.failures -= 1;
            return Err(StoreError::Io(format!("injected fault in {operation}")));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Repository
// ============================================================================

/// In-memory repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    /// Committed tables.
    tables: Arc<Mutex<MemoryTables>>,
    /// Injected faults.
    faults: FaultPlan,
}

impl InMemoryRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `operation` fail `failures` times after `skip` successful calls.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the fault plan lock is poisoned.
    pub fn inject_fault(&self, operation: &'static str, skip: usize, failures: usize) -> Result<(), StoreError> {
        self.faults
            .rules
            .lock()
            .map_err(|_| StoreError::Store("fault plan lock poisoned".to_string()))?
            .insert(operation, FaultRule {
                skip,
                failures,
            });
        Ok(())
    }
}

impl TableAccess for InMemoryRepository {
    fn with_tables<T>(
        &self,
        operation: &'static str,
        body: impl FnOnce(&mut MemoryTables) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.faults.check(operation)?;
        let mut tables =
            self.tables.lock().map_err(|_| StoreError::Store("repository lock poisoned".to_string()))?;
        body(&mut tables)
    }
}

/// Transaction-scoped handle over a working copy of the tables.
struct MemoryTransaction {
    /// Working copy.
    tables: RefCell<MemoryTables>,
    /// Injected faults.
    faults: FaultPlan,
}

impl TableAccess for MemoryTransaction {
    fn with_tables<T>(
        &self,
        operation: &'static str,
        body: impl FnOnce(&mut MemoryTables) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.faults.check(operation)?;
        let mut tables = self
            .tables
            .try_borrow_mut()
            .map_err(|_| StoreError::Store("transaction handle re-entered".to_string()))?;
        body(&mut tables)
    }
}

table_repository_ops!(InMemoryRepository);
table_repository_ops!(MemoryTransaction);

impl Repository for InMemoryRepository {
    fn transaction(&self, body: &mut TransactionFn<'_>) -> Result<(), DatasetError> {
        let mut committed =
            self.tables.lock().map_err(|_| StoreError::Store("repository lock poisoned".to_string()))?;
        let transaction = MemoryTransaction {
            tables: RefCell::new(committed.clone()),
            faults: self.faults.clone(),
        };
        body(&transaction)?;
        *committed = transaction.tables.into_inner();
        Ok(())
    }
}
