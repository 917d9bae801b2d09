// crates/dataset-engine/src/item_service.rs
// ============================================================================
// Module: Item Service
// Description: Item writes under barriers with capacity accounting.
// Purpose: Create, update, archive, delete, and read dataset items.
// Dependencies: dataset-core, rand
// ============================================================================

//! ## Overview
//! Writes follow one shape: validate outside the barrier, reserve capacity on
//! the atomic counter, take a write-item barrier, re-read the dataset, push
//! payloads to their tiers, and commit one transaction that touches the
//! dataset row (guarded on `next_version_num`), re-checks the schema
//! `update_version`, and writes the item rows. Any failure after the
//! reservation refunds the counter.
//!
//! Rows added at the dataset's current `next_version_num` are not part of
//! any version yet and may change in place or be removed physically; older
//! rows are archived by setting `del_vn` so snapshots keep their meaning.
//!
//! Security posture: item payloads are untrusted input; they pass through
//! sanitization and validation before they reach storage.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use dataset_core::Dataset;
use dataset_core::DatasetError;
use dataset_core::DatasetId;
use dataset_core::DatasetSchema;
use dataset_core::ErrorKind;
use dataset_core::IndexedItem;
use dataset_core::Item;
use dataset_core::ItemErrorCollector;
use dataset_core::ItemId;
use dataset_core::ItemRowId;
use dataset_core::OpContext;
use dataset_core::OperationKind;
use dataset_core::Page;
use dataset_core::PageRequest;
use dataset_core::ReadOptions;
use dataset_core::RepositoryOps;
use dataset_core::SchemaId;
use dataset_core::StorageProvider;
use dataset_core::core::time::now_millis;
use dataset_core::runtime::field_data::SchemaValidator;
use dataset_core::runtime::sanitize::prepare_items;
use dataset_core::runtime::sanitize::sanitize_item;
use dataset_core::runtime::sanitize::sanitize_output;
use dataset_core::runtime::sanitize::validate_item;

use crate::barrier::BarrierGuard;
use crate::barrier::OperationBarrier;
use crate::collaborators::Collaborators;
use crate::events::CAPACITY_REFUND;
use crate::events::COUNTER_ANOMALY;
use crate::events::EngineEvent;
use crate::events::ID_FALLBACK;
use crate::events::PAYLOAD_CLEANUP_FAILED;
use crate::payload::OffloadReceipt;
use crate::payload::TieredPayloadStore;

// ============================================================================
// SECTION: Options and Outcomes
// ============================================================================

/// Batch-create modifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchCreateOptions {
    /// Insert the items that fit when capacity runs out instead of none.
    pub partial_add: bool,
    /// Audit operator.
    pub operator: String,
}

/// Result of a batch create.
#[derive(Debug, Default)]
pub struct BatchCreateOutcome {
    /// Stored rows in caller order: inserted rows and rows reloaded after an
    /// item-key conflict.
    pub items: Vec<IndexedItem>,
    /// Rows newly inserted by this call.
    pub inserted: u64,
    /// Rejected items grouped by error kind.
    pub errors: ItemErrorCollector,
    /// Capacity ran out before every valid item was granted.
    pub dataset_full: bool,
}

impl BatchCreateOutcome {
    /// Returns the number of stored rows (inserted or reloaded).
    #[must_use]
    pub fn added(&self) -> u64 {
        u64::try_from(self.items.len()).unwrap_or(u64::MAX)
    }
}

// ============================================================================
// SECTION: Service
// ============================================================================

/// Item write and read operations.
#[derive(Clone)]
pub struct ItemService {
    /// Shared backends.
    collaborators: Collaborators,
    /// Barrier for write-item and clear operations.
    barrier: OperationBarrier,
    /// Payload tiers.
    payloads: TieredPayloadStore,
}

impl ItemService {
    /// Creates the service.
    #[must_use]
    pub const fn new(collaborators: Collaborators, barrier: OperationBarrier, payloads: TieredPayloadStore) -> Self {
        Self {
            collaborators,
            barrier,
            payloads,
        }
    }

    // ------------------------------------------------------------------------
    // Batch create
    // ------------------------------------------------------------------------

    /// Validates and inserts a batch of items.
    ///
    /// Item-level failures are reported in the outcome; the call fails only
    /// when the dataset, schema, barrier, or storage fails. With
    /// `partial_add` the first items (by index) that fit the remaining
    /// capacity are inserted; without it the batch is all-or-nothing.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::NotFound`] for a missing dataset,
    /// [`DatasetError::InvalidParam`] for a read-only dataset,
    /// [`DatasetError::ConcurrentDatasetOperations`] on barrier timeout or a
    /// concurrent schema change, and storage errors from collaborators.
    pub async fn batch_create(
        &self,
        ctx: &OpContext,
        dataset_id: DatasetId,
        items: Vec<IndexedItem>,
        options: &BatchCreateOptions,
    ) -> Result<BatchCreateOutcome, DatasetError> {
        ctx.check()?;
        let dataset = self.load_dataset(dataset_id)?;
        dataset.ensure_writable()?;
        let schema = self.load_schema(dataset.schema_id)?;
        let prepared = prepare_items(&dataset, &schema, items)?;
        let mut outcome = BatchCreateOutcome {
            errors: prepared.errors,
            ..BatchCreateOutcome::default()
        };
        let mut good = prepared.good;
        good.sort_by_key(|indexed| indexed.index);
        let (mut stored, mut good) = self.split_stored(dataset_id, good)?;
        if good.is_empty() {
            outcome.items = stored;
            return Ok(outcome);
        }

        let want = u64::try_from(good.len()).unwrap_or(u64::MAX);
        let granted = self.reserve(&dataset, want, options.partial_add)?;
        if granted < want {
            outcome.dataset_full = true;
            outcome.errors.add_count(
                ErrorKind::ExceedDatasetCapacity,
                want - granted,
                &format!("dataset {dataset_id} reached its item capacity"),
            );
            good.truncate(usize::try_from(granted).unwrap_or(usize::MAX));
        }
        if good.is_empty() {
            outcome.items = stored;
            return Ok(outcome);
        }

        match self.insert_granted(ctx, &dataset, &schema, good, &options.operator).await {
            Ok((inserted_rows, inserted)) => {
                let conflicts = granted.saturating_sub(inserted);
                if conflicts > 0 {
                    self.refund(dataset_id, conflicts, "item key conflicts");
                }
                stored.extend(inserted_rows);
                stored.sort_by_key(|indexed| indexed.index);
                outcome.items = stored;
                outcome.inserted = inserted;
                Ok(outcome)
            }
            Err(err) => {
                self.refund(dataset_id, granted, "batch create failed");
                Err(err)
            }
        }
    }

    /// Splits off items whose key already names a live row. Those rows are
    /// reported as stored without taking capacity, so a replayed batch
    /// reaches the same outcome on a full dataset.
    fn split_stored(
        &self,
        dataset_id: DatasetId,
        good: Vec<IndexedItem>,
    ) -> Result<(Vec<IndexedItem>, Vec<IndexedItem>), DatasetError> {
        let keys: Vec<String> = good
            .iter()
            .filter(|indexed| !indexed.item.item_key.is_empty())
            .map(|indexed| indexed.item.item_key.clone())
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect();
        if keys.is_empty() {
            return Ok((Vec::new(), good));
        }
        let live: BTreeMap<String, Item> = self
            .collaborators
            .repository
            .get_live_items_by_keys(dataset_id, &keys)?
            .into_iter()
            .map(|item| (item.item_key.clone(), item))
            .collect();
        if live.is_empty() {
            return Ok((Vec::new(), good));
        }
        let mut stored = Vec::new();
        let mut fresh = Vec::with_capacity(good.len());
        for indexed in good {
            match live.get(&indexed.item.item_key) {
                Some(row) => stored.push(IndexedItem {
                    index: indexed.index,
                    item: row.clone(),
                }),
                None => fresh.push(indexed),
            }
        }
        Ok((stored, fresh))
    }

    /// Reserves up to `want` slots and returns the granted count.
    fn reserve(&self, dataset: &Dataset, want: u64, partial_add: bool) -> Result<u64, DatasetError> {
        self.ensure_counter(dataset.id)?;
        let want_delta = i64::try_from(want).unwrap_or(i64::MAX);
        let total = self.collaborators.counter.incr_item_count(dataset.id, want_delta)?;
        let max = dataset.spec.max_item_count;
        if max <= 0 || total <= max {
            return Ok(want);
        }
        let over = u64::try_from(total - max).unwrap_or(u64::MAX);
        let refund = if partial_add { over.min(want) } else { want };
        self.refund(dataset.id, refund, "capacity overshoot");
        Ok(want - refund)
    }

    /// Initializes a missing counter from the live item count.
    fn ensure_counter(&self, dataset_id: DatasetId) -> Result<(), DatasetError> {
        if self.collaborators.counter.get_item_count(dataset_id)?.is_some() {
            return Ok(());
        }
        let live = self.collaborators.repository.count_live_items(dataset_id)?;
        self.collaborators.counter.set_item_count(dataset_id, i64::try_from(live).unwrap_or(i64::MAX))?;
        self.collaborators.emit(
            &EngineEvent::warn(COUNTER_ANOMALY, format!("item counter missing; rebuilt at {live}")).dataset(dataset_id),
        );
        Ok(())
    }

    /// Returns `count` slots to the counter.
    fn refund(&self, dataset_id: DatasetId, count: u64, reason: &str) {
        if count == 0 {
            return;
        }
        let delta = i64::try_from(count).unwrap_or(i64::MAX);
        let event = match self.collaborators.counter.incr_item_count(dataset_id, -delta) {
            Ok(total) => EngineEvent::info(CAPACITY_REFUND, format!("refunded {count} slots ({reason}); counter {total}")),
            Err(err) => EngineEvent::error(COUNTER_ANOMALY, format!("refund of {count} slots failed ({reason}): {err}")),
        };
        self.collaborators.emit(&event.dataset(dataset_id));
    }

    /// Assigns ids, offloads payloads, and inserts the granted items.
    ///
    /// Returns the stored rows in caller order and the number newly inserted.
    async fn insert_granted(
        &self,
        ctx: &OpContext,
        dataset: &Dataset,
        schema: &DatasetSchema,
        granted: Vec<IndexedItem>,
        operator: &str,
    ) -> Result<(Vec<IndexedItem>, u64), DatasetError> {
        let (indexes, mut rows): (Vec<u64>, Vec<Item>) =
            granted.into_iter().map(|indexed| (indexed.index, indexed.item)).unzip();
        self.assign_ids(dataset.id, &mut rows)?;
        for row in &mut rows {
            if row.item_key.is_empty() && !row.item_id.is_unset() {
                row.item_key = row.item_id.to_string();
            }
        }

        let guard = self.barrier.acquire(ctx, dataset.id, OperationKind::WriteItem).await?;
        let dataset = self.load_dataset(dataset.id)?;
        dataset.ensure_writable()?;
        let now = now_millis();
        for row in &mut rows {
            row.dataset_id = dataset.id;
            row.schema_id = dataset.schema_id;
            row.add_vn = dataset.next_version_num;
            row.del_vn = None;
            row.created_by = operator.to_string();
            row.created_at_ms = now;
            row.updated_by = operator.to_string();
            row.updated_at_ms = now;
        }
        ctx.check()?;
        let receipt = self.payloads.offload(&mut rows).await?;

        let mut inserted = Vec::new();
        let committed = self.collaborators.repository.transaction(&mut |tx: &dyn RepositoryOps| {
            touch_dataset(tx, &dataset, OperationKind::WriteItem, operator)?;
            guard_schema(tx, schema.id, schema.update_version)?;
            inserted = tx.insert_items(&rows)?;
            Ok(())
        });
        drop(guard);
        if let Err(err) = committed {
            self.discard(&receipt, dataset.id).await;
            return Err(err);
        }

        let inserted_count = u64::try_from(inserted.len()).unwrap_or(u64::MAX);
        let stored = if inserted.len() == rows.len() {
            inserted
        } else {
            self.reconcile_conflicts(&dataset, &rows, inserted).await?
        };
        let items = indexes
            .into_iter()
            .zip(stored)
            .map(|(index, item)| IndexedItem {
                index,
                item,
            })
            .collect();
        Ok((items, inserted_count))
    }

    /// Assigns generator ids, leaving them to the store when the generator
    /// is down and every payload stays inline.
    fn assign_ids(&self, dataset_id: DatasetId, rows: &mut [Item]) -> Result<(), DatasetError> {
        match self.collaborators.ids.gen_multi_ids(rows.len()) {
            Ok(ids) if ids.len() == rows.len() => {
                for (row, id) in rows.iter_mut().zip(ids) {
                    row.id = ItemRowId::new(id);
                    row.item_id = ItemId::new(id);
                }
                Ok(())
            }
            outcome => {
                let reason = match outcome {
                    Err(err) => err.to_string(),
                    Ok(ids) => format!("generator returned {} ids for {} items", ids.len(), rows.len()),
                };
                if self.payloads.needs_object_tier(rows)? {
                    return Err(DatasetError::Storage(format!(
                        "id generator unavailable and payloads need object storage: {reason}"
                    )));
                }
                for row in rows.iter_mut() {
                    row.id = ItemRowId::default();
                    row.item_id = ItemId::default();
                }
                self.collaborators.emit(
                    &EngineEvent::warn(ID_FALLBACK, format!("using store-assigned item ids: {reason}"))
                        .dataset(dataset_id),
                );
                Ok(())
            }
        }
    }

    /// Maps each requested row to the stored row, reloading rows whose
    /// item key already existed.
    ///
    /// `inserted` follows the order of `requested` with conflicting rows
    /// left out; keyless rows carry store-assigned ids and never conflict.
    async fn reconcile_conflicts(
        &self,
        dataset: &Dataset,
        requested: &[Item],
        inserted: Vec<Item>,
    ) -> Result<Vec<Item>, DatasetError> {
        let mut fresh = inserted.into_iter().peekable();
        let mut matched: Vec<Option<Item>> = Vec::with_capacity(requested.len());
        for row in requested {
            let is_next = fresh.peek().is_some_and(|stored| {
                row.item_key.is_empty()
                    || (stored.item_key == row.item_key && (row.item_id.is_unset() || stored.item_id == row.item_id))
            });
            matched.push(if is_next { fresh.next() } else { None });
        }
        if fresh.next().is_some() {
            return Err(DatasetError::Internal("store returned rows that were not requested".to_string()));
        }

        let missing: Vec<String> = requested
            .iter()
            .zip(&matched)
            .filter(|(_, stored)| stored.is_none())
            .map(|(row, _)| row.item_key.clone())
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect();
        let reloaded: BTreeMap<String, Item> = self
            .collaborators
            .repository
            .get_live_items_by_keys(dataset.id, &missing)?
            .into_iter()
            .map(|item| (item.item_key.clone(), item))
            .collect();
        let orphaned: Vec<Item> = requested
            .iter()
            .zip(&matched)
            .filter(|(row, stored)| stored.is_none() && row.data_properties.storage != StorageProvider::InlineRow)
            .map(|(row, _)| row.clone())
            .collect();
        if !orphaned.is_empty()
            && let Err(err) = self.payloads.delete(&orphaned).await
        {
            self.collaborators.emit(
                &EngineEvent::warn(PAYLOAD_CLEANUP_FAILED, format!("conflicting payloads not removed: {err}"))
                    .dataset(dataset.id),
            );
        }
        requested
            .iter()
            .zip(matched)
            .map(|(row, stored)| match stored {
                Some(item) => Ok(item),
                None => reloaded.get(&row.item_key).cloned().ok_or_else(|| {
                    DatasetError::Internal(format!("item key {} neither inserted nor found", row.item_key))
                }),
            })
            .collect()
    }

    /// Deletes objects written for rows that were never stored.
    async fn discard(&self, receipt: &OffloadReceipt, dataset_id: DatasetId) {
        if receipt.is_empty() {
            return;
        }
        if let Err(err) = self.payloads.discard(receipt).await {
            self.collaborators.emit(
                &EngineEvent::warn(PAYLOAD_CLEANUP_FAILED, format!("{} payload objects not removed: {err}", receipt.len()))
                    .dataset(dataset_id),
            );
        }
    }

    // ------------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------------

    /// Replaces the payload of a live item.
    ///
    /// Rows added at the current `next_version_num` change in place; older
    /// rows go through [`ItemService::archive_and_create`].
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::NotFound`] for a missing or archived item,
    /// item-level errors when the new payload is invalid, and barrier or
    /// storage errors.
    pub async fn update_item(
        &self,
        ctx: &OpContext,
        dataset_id: DatasetId,
        item: Item,
        operator: &str,
    ) -> Result<Item, DatasetError> {
        let (dataset, schema, candidate) = self.prepare_single(dataset_id, item)?;
        let guard = self.barrier.acquire(ctx, dataset_id, OperationKind::WriteItem).await?;
        let dataset = self.reload_writable(dataset.id)?;
        let existing = self.live_row(dataset_id, candidate.id)?;
        self.replace_locked(ctx, &dataset, &schema, existing, candidate, operator, guard).await
    }

    /// Archives `old_id` at the current `next_version_num` and inserts a new
    /// row carrying the same item id and key.
    ///
    /// A row added at the current `next_version_num` belongs to no version
    /// yet, so it is rewritten in place instead.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::NotFound`] for a missing or archived item,
    /// item-level errors when the payload is invalid, and barrier or storage
    /// errors.
    pub async fn archive_and_create(
        &self,
        ctx: &OpContext,
        dataset_id: DatasetId,
        old_id: ItemRowId,
        item: Item,
        operator: &str,
    ) -> Result<Item, DatasetError> {
        let (_, schema, candidate) = self.prepare_single(dataset_id, item)?;
        let guard = self.barrier.acquire(ctx, dataset_id, OperationKind::WriteItem).await?;
        let dataset = self.reload_writable(dataset_id)?;
        let existing = self.live_row(dataset_id, old_id)?;
        self.replace_locked(ctx, &dataset, &schema, existing, candidate, operator, guard).await
    }

    /// Routes a replacement by whether `existing` is part of a version.
    #[allow(clippy::too_many_arguments, reason = "Barrier guard and prepared state are threaded explicitly.")]
    async fn replace_locked(
        &self,
        ctx: &OpContext,
        dataset: &Dataset,
        schema: &DatasetSchema,
        existing: Item,
        candidate: Item,
        operator: &str,
        guard: BarrierGuard,
    ) -> Result<Item, DatasetError> {
        if existing.add_vn == dataset.next_version_num {
            self.rewrite_locked(ctx, dataset, schema, existing, candidate, operator, guard).await
        } else {
            self.archive_and_create_locked(ctx, dataset, schema, existing, candidate, operator, guard).await
        }
    }

    /// Rewrites a row that no version references yet.
    ///
    /// Object-tier payloads go to a fresh revision key; the previous object
    /// is deleted only after the row update commits.
    #[allow(clippy::too_many_arguments, reason = "Barrier guard and prepared state are threaded explicitly.")]
    async fn rewrite_locked(
        &self,
        ctx: &OpContext,
        dataset: &Dataset,
        schema: &DatasetSchema,
        existing: Item,
        candidate: Item,
        operator: &str,
        guard: BarrierGuard,
    ) -> Result<Item, DatasetError> {
        let mut row = existing.clone();
        row.data = candidate.data;
        row.repeated_data = candidate.repeated_data;
        row.data_properties.bytes = candidate.data_properties.bytes;
        row.data_properties.runes = candidate.data_properties.runes;
        row.schema_id = dataset.schema_id;
        row.updated_by = operator.to_string();
        row.updated_at_ms = now_millis();
        ctx.check()?;
        let revision = format!("{:016x}", rand::random::<u64>());
        let receipt = self.payloads.offload_revision(std::slice::from_mut(&mut row), &revision).await?;
        let committed = self.collaborators.repository.transaction(&mut |tx: &dyn RepositoryOps| {
            touch_dataset(tx, dataset, OperationKind::WriteItem, operator)?;
            guard_schema(tx, schema.id, schema.update_version)?;
            tx.update_item(&row)?;
            Ok(())
        });
        drop(guard);
        if let Err(err) = committed {
            self.discard(&receipt, dataset.id).await;
            return Err(err);
        }
        if existing.data_properties.storage != StorageProvider::InlineRow {
            self.cleanup(std::slice::from_ref(&existing), dataset.id).await;
        }
        Ok(row)
    }

    /// Archive-and-create body run while the write barrier is held.
    #[allow(clippy::too_many_arguments, reason = "Barrier guard and prepared state are threaded explicitly.")]
    async fn archive_and_create_locked(
        &self,
        ctx: &OpContext,
        dataset: &Dataset,
        schema: &DatasetSchema,
        existing: Item,
        candidate: Item,
        operator: &str,
        guard: BarrierGuard,
    ) -> Result<Item, DatasetError> {
        let now = now_millis();
        let mut row = Item {
            id: ItemRowId::default(),
            item_id: existing.item_id,
            item_key: existing.item_key.clone(),
            dataset_id: dataset.id,
            schema_id: dataset.schema_id,
            data: candidate.data,
            repeated_data: candidate.repeated_data,
            data_properties: candidate.data_properties,
            add_vn: dataset.next_version_num,
            del_vn: None,
            created_by: existing.created_by.clone(),
            created_at_ms: existing.created_at_ms,
            updated_by: operator.to_string(),
            updated_at_ms: now,
        };
        if let Ok(ids) = self.collaborators.ids.gen_multi_ids(1)
            && let Some(id) = ids.first()
        {
            row.id = ItemRowId::new(*id);
        }
        ctx.check()?;
        let receipt = self.payloads.offload(std::slice::from_mut(&mut row)).await?;
        let mut stored = Vec::new();
        let committed = self.collaborators.repository.transaction(&mut |tx: &dyn RepositoryOps| {
            touch_dataset(tx, dataset, OperationKind::WriteItem, operator)?;
            guard_schema(tx, schema.id, schema.update_version)?;
            tx.archive_items(dataset.id, &[existing.id], dataset.next_version_num)?;
            stored = tx.insert_items(std::slice::from_ref(&row))?;
            if stored.is_empty() {
                return Err(DatasetError::ConcurrentDatasetOperations(format!(
                    "item key {} was taken while archiving",
                    existing.item_key
                )));
            }
            Ok(())
        });
        drop(guard);
        if let Err(err) = committed {
            self.discard(&receipt, dataset.id).await;
            return Err(err);
        }
        stored
            .pop()
            .ok_or_else(|| DatasetError::Internal("archive-and-create stored no row".to_string()))
    }

    /// Sanitizes and validates a single-item payload.
    fn prepare_single(&self, dataset_id: DatasetId, mut item: Item) -> Result<(Dataset, DatasetSchema, Item), DatasetError> {
        let dataset = self.load_dataset(dataset_id)?;
        dataset.ensure_writable()?;
        let schema = self.load_schema(dataset.schema_id)?;
        sanitize_item(&dataset, &schema, &mut item);
        item.compute_data_properties();
        let validator = SchemaValidator::new(&schema)?;
        validate_item(&dataset, &validator, &item)?;
        Ok((dataset, schema, item))
    }

    // ------------------------------------------------------------------------
    // Delete and clear
    // ------------------------------------------------------------------------

    /// Removes items: rows added at the current `next_version_num` are
    /// deleted, older rows archived. Returns the number of items removed.
    ///
    /// # Errors
    ///
    /// Returns barrier and storage errors.
    pub async fn batch_delete(
        &self,
        ctx: &OpContext,
        dataset_id: DatasetId,
        ids: &[ItemRowId],
        operator: &str,
    ) -> Result<u64, DatasetError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let dataset = self.load_dataset(dataset_id)?;
        dataset.ensure_writable()?;
        let guard = self.barrier.acquire(ctx, dataset_id, OperationKind::WriteItem).await?;
        let dataset = self.reload_writable(dataset_id)?;
        let rows: Vec<Item> =
            self.collaborators.repository.get_items(dataset_id, ids)?.into_iter().filter(Item::is_live).collect();
        let (uncommitted, committed): (Vec<Item>, Vec<Item>) =
            rows.into_iter().partition(|row| row.add_vn == dataset.next_version_num);
        let delete_ids: Vec<ItemRowId> = uncommitted.iter().map(|row| row.id).collect();
        let archive_ids: Vec<ItemRowId> = committed.iter().map(|row| row.id).collect();
        ctx.check()?;
        let mut removed = 0_u64;
        self.collaborators.repository.transaction(&mut |tx: &dyn RepositoryOps| {
            touch_dataset(tx, &dataset, OperationKind::WriteItem, operator)?;
            removed = tx.delete_items(dataset_id, &delete_ids)? + tx.archive_items(dataset_id, &archive_ids, dataset.next_version_num)?;
            Ok(())
        })?;
        drop(guard);
        if removed > 0 {
            let delta = i64::try_from(removed).unwrap_or(i64::MAX);
            if let Err(err) = self.collaborators.counter.incr_item_count(dataset_id, -delta) {
                self.collaborators.emit(
                    &EngineEvent::error(COUNTER_ANOMALY, format!("counter not decremented by {removed}: {err}"))
                        .dataset(dataset_id),
                );
            }
        }
        self.cleanup(&uncommitted, dataset_id).await;
        Ok(removed)
    }

    /// Ends every live item at the current `next_version_num` and resets the
    /// counter. Returns the number of rows affected.
    ///
    /// # Errors
    ///
    /// Returns barrier and storage errors.
    pub async fn clear(&self, ctx: &OpContext, dataset_id: DatasetId, operator: &str) -> Result<u64, DatasetError> {
        let dataset = self.load_dataset(dataset_id)?;
        dataset.ensure_writable()?;
        let guard = self.barrier.acquire(ctx, dataset_id, OperationKind::ClearDataset).await?;
        let dataset = self.reload_writable(dataset_id)?;
        ctx.check()?;
        let mut affected = 0_u64;
        self.collaborators.repository.transaction(&mut |tx: &dyn RepositoryOps| {
            touch_dataset(tx, &dataset, OperationKind::ClearDataset, operator)?;
            affected = tx.archive_all_live(dataset_id, dataset.next_version_num)?;
            Ok(())
        })?;
        drop(guard);
        self.collaborators.counter.set_item_count(dataset_id, 0)?;
        Ok(affected)
    }

    /// Deletes payload objects of removed rows, logging failures.
    async fn cleanup(&self, rows: &[Item], dataset_id: DatasetId) {
        if let Err(err) = self.payloads.delete(rows).await {
            self.collaborators.emit(
                &EngineEvent::warn(PAYLOAD_CLEANUP_FAILED, format!("removed item payloads not deleted: {err}"))
                    .dataset(dataset_id),
            );
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Loads one item with its payload.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::NotFound`] when the item is missing.
    pub async fn get_item(&self, dataset_id: DatasetId, id: ItemRowId) -> Result<Item, DatasetError> {
        self.batch_get(dataset_id, &[id])
            .await?
            .pop()
            .ok_or_else(|| DatasetError::NotFound(format!("item {id} in dataset {dataset_id}")))
    }

    /// Loads items with their payloads, skipping missing ids.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn batch_get(&self, dataset_id: DatasetId, ids: &[ItemRowId]) -> Result<Vec<Item>, DatasetError> {
        let dataset = self.load_dataset(dataset_id)?;
        let mut items = self.collaborators.repository.get_items(dataset_id, ids)?;
        self.present(dataset.schema_id, &mut items).await?;
        Ok(items)
    }

    /// Lists live items with their payloads.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn list_items(&self, dataset_id: DatasetId, page: &PageRequest) -> Result<Page<Item>, DatasetError> {
        let dataset = self.load_dataset(dataset_id)?;
        let mut listed = self.collaborators.repository.list_live_items(dataset_id, page)?;
        self.present(dataset.schema_id, &mut listed.items).await?;
        Ok(listed)
    }

    /// Restores payloads of rows stored in object tiers.
    ///
    /// # Errors
    ///
    /// Returns storage errors and [`DatasetError::Internal`] for missing objects.
    pub async fn load_data(&self, items: &mut [Item]) -> Result<(), DatasetError> {
        self.payloads.load(items).await
    }

    /// Loads payloads and applies output sanitization against `schema_id`.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn present(&self, schema_id: SchemaId, items: &mut [Item]) -> Result<(), DatasetError> {
        self.payloads.load(items).await?;
        let schema = self.load_schema(schema_id)?;
        for item in items.iter_mut() {
            sanitize_output(&schema, item);
        }
        Ok(())
    }

    /// Recomputes the live item count and resets the counter.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn recount_items(&self, dataset_id: DatasetId) -> Result<u64, DatasetError> {
        let live = self.collaborators.repository.count_live_items(dataset_id)?;
        let previous = self.collaborators.counter.get_item_count(dataset_id)?;
        let live_count = i64::try_from(live).unwrap_or(i64::MAX);
        self.collaborators.counter.set_item_count(dataset_id, live_count)?;
        if previous != Some(live_count) {
            let shown = previous.map_or_else(|| "missing".to_string(), |value| value.to_string());
            self.collaborators.emit(
                &EngineEvent::warn(COUNTER_ANOMALY, format!("item counter was {shown}, repository holds {live}"))
                    .dataset(dataset_id),
            );
        }
        Ok(live)
    }

    // ------------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------------

    /// Loads a dataset from the primary replica.
    fn load_dataset(&self, dataset_id: DatasetId) -> Result<Dataset, DatasetError> {
        self.collaborators
            .repository
            .get_dataset(dataset_id, ReadOptions::master())?
            .ok_or_else(|| DatasetError::NotFound(format!("dataset {dataset_id}")))
    }

    /// Re-reads a dataset inside the barrier window.
    fn reload_writable(&self, dataset_id: DatasetId) -> Result<Dataset, DatasetError> {
        let dataset = self.load_dataset(dataset_id)?;
        dataset.ensure_writable()?;
        Ok(dataset)
    }

    /// Loads a schema.
    fn load_schema(&self, schema_id: SchemaId) -> Result<DatasetSchema, DatasetError> {
        self.collaborators
            .repository
            .get_schema(schema_id)?
            .ok_or_else(|| DatasetError::NotFound(format!("schema {schema_id}")))
    }

    /// Loads one live row.
    fn live_row(&self, dataset_id: DatasetId, id: ItemRowId) -> Result<Item, DatasetError> {
        self.collaborators
            .repository
            .get_items(dataset_id, &[id])?
            .into_iter()
            .find(Item::is_live)
            .ok_or_else(|| DatasetError::NotFound(format!("live item {id} in dataset {dataset_id}")))
    }
}

// ============================================================================
// SECTION: Transaction Helpers
// ============================================================================

/// Records `kind` as the dataset's last operation, guarded on
/// `next_version_num`.
pub(crate) fn touch_dataset(
    tx: &dyn RepositoryOps,
    dataset: &Dataset,
    kind: OperationKind,
    operator: &str,
) -> Result<(), DatasetError> {
    let mut touched = dataset.clone();
    touched.last_operation = Some(kind);
    touched.updated_by = operator.to_string();
    touched.updated_at_ms = now_millis();
    tx.update_dataset(&touched, dataset.next_version_num)?;
    Ok(())
}

/// Fails when the schema moved past the `update_version` read by the caller.
pub(crate) fn guard_schema(
    tx: &dyn RepositoryOps,
    schema_id: SchemaId,
    expected_update_version: u64,
) -> Result<(), DatasetError> {
    let schema = tx.get_schema(schema_id)?.ok_or_else(|| DatasetError::NotFound(format!("schema {schema_id}")))?;
    if schema.update_version != expected_update_version {
        return Err(DatasetError::ConcurrentDatasetOperations(format!(
            "schema {schema_id} changed: update_version {} (read {expected_update_version})",
            schema.update_version
        )));
    }
    Ok(())
}
