// crates/dataset-engine/src/version_service.rs
// ============================================================================
// Module: Version Service
// Description: Version creation, reads, counting, and purge.
// Purpose: Capture a dataset's next_version_num and hand off snapshot builds.
// Dependencies: dataset-core
// ============================================================================

//! ## Overview
//! Creating a version captures the dataset's `next_version_num` under the
//! create-version barrier, advances the dataset by one, and freezes the
//! schema. The item set of the version is every row with
//! `add_vn <= version_num < del_vn`; the snapshot builder copies that set
//! asynchronously after the version commits.

// ============================================================================
// SECTION: Imports
// ============================================================================

use dataset_core::Dataset;
use dataset_core::DatasetError;
use dataset_core::DatasetId;
use dataset_core::DatasetVersion;
use dataset_core::Item;
use dataset_core::OpContext;
use dataset_core::OperationKind;
use dataset_core::Page;
use dataset_core::PageRequest;
use dataset_core::ReadOptions;
use dataset_core::RepositoryOps;
use dataset_core::SnapshotProgress;
use dataset_core::SnapshotStatus;
use dataset_core::VersionId;
use dataset_core::core::time::now_millis;
use dataset_core::core::version::ensure_version_advances;

use crate::barrier::OperationBarrier;
use crate::collaborators::Collaborators;
use crate::events::EngineEvent;
use crate::events::SNAPSHOT_ENQUEUE_FAILED;
use crate::item_service::ItemService;
use crate::queue::JobQueue;

// ============================================================================
// SECTION: Service
// ============================================================================

/// Version operations.
#[derive(Clone)]
pub struct VersionService {
    /// Shared backends.
    collaborators: Collaborators,
    /// Barrier for version creation.
    barrier: OperationBarrier,
    /// Snapshot job publisher.
    queue: JobQueue,
    /// Payload loading and output sanitization for version reads.
    items: ItemService,
}

impl VersionService {
    /// Creates the service.
    #[must_use]
    pub const fn new(
        collaborators: Collaborators,
        barrier: OperationBarrier,
        queue: JobQueue,
        items: ItemService,
    ) -> Self {
        Self {
            collaborators,
            barrier,
            queue,
            items,
        }
    }

    /// Creates a version and enqueues its snapshot build.
    ///
    /// A failed enqueue is reported as an event; the version stays
    /// `unstarted` and can be re-enqueued.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidParam`] when `version` is not strict
    /// SemVer 2 or does not advance past the latest version, and barrier or
    /// storage errors.
    pub async fn create_version(
        &self,
        ctx: &OpContext,
        dataset_id: DatasetId,
        version: &str,
        description: &str,
        operator: &str,
    ) -> Result<DatasetVersion, DatasetError> {
        let dataset = self.load_dataset(dataset_id)?;
        dataset.ensure_writable()?;
        ensure_version_advances(dataset.latest_version.as_deref(), version)?;

        let guard = self.barrier.acquire(ctx, dataset_id, OperationKind::CreateVersion).await?;
        let dataset = self.load_dataset(dataset_id)?;
        dataset.ensure_writable()?;
        ensure_version_advances(dataset.latest_version.as_deref(), version)?;
        let schema = self
            .collaborators
            .repository
            .get_schema(dataset.schema_id)?
            .ok_or_else(|| DatasetError::NotFound(format!("schema {}", dataset.schema_id)))?;
        let now = now_millis();
        let mut row = DatasetVersion {
            id: VersionId::default(),
            dataset_id,
            schema_id: dataset.schema_id,
            version: version.to_string(),
            version_num: dataset.next_version_num,
            description: description.to_string(),
            item_count: 0,
            snapshot_status: SnapshotStatus::Unstarted,
            snapshot_progress: SnapshotProgress::default(),
            update_version: 1,
            dataset_brief: dataset.brief(),
            created_by: operator.to_string(),
            created_at_ms: now,
            updated_at_ms: now,
            disabled_at_ms: None,
        };
        if let Ok(ids) = self.collaborators.ids.gen_multi_ids(1)
            && let Some(id) = ids.first()
        {
            row.id = VersionId::new(*id);
        }
        ctx.check()?;

        let mut created = None;
        self.collaborators.repository.transaction(&mut |tx: &dyn RepositoryOps| {
            let stored = tx.insert_version(&row)?;
            let mut advanced = dataset.clone();
            advanced.latest_version = Some(version.to_string());
            advanced.next_version_num = dataset.next_version_num + 1;
            advanced.last_operation = Some(OperationKind::CreateVersion);
            advanced.updated_by = operator.to_string();
            advanced.updated_at_ms = now;
            tx.update_dataset(&advanced, dataset.next_version_num)?;
            if !schema.immutable {
                let mut frozen = schema.clone();
                frozen.immutable = true;
                frozen.update_version = schema.update_version + 1;
                frozen.updated_by = operator.to_string();
                frozen.updated_at_ms = now;
                tx.update_schema(&frozen, schema.update_version)?;
            }
            created = Some(stored);
            Ok(())
        })?;
        drop(guard);
        let created =
            created.ok_or_else(|| DatasetError::Internal("version transaction committed nothing".to_string()))?;

        if let Err(err) = self.queue.enqueue_snapshot(dataset.space_id, created.id, operator).await {
            self.collaborators.emit(
                &EngineEvent::error(SNAPSHOT_ENQUEUE_FAILED, format!("snapshot job not published: {err}"))
                    .dataset(dataset_id)
                    .version(created.id)
                    .caused_by(&err),
            );
        }
        Ok(created)
    }

    /// Loads a version.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::NotFound`] when the version is missing.
    pub fn get_version(&self, version_id: VersionId) -> Result<DatasetVersion, DatasetError> {
        self.collaborators
            .repository
            .get_version(version_id)?
            .ok_or_else(|| DatasetError::NotFound(format!("version {version_id}")))
    }

    /// Lists versions of a dataset, newest first.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn list_versions(&self, dataset_id: DatasetId, page: &PageRequest) -> Result<Page<DatasetVersion>, DatasetError> {
        Ok(self.collaborators.repository.list_versions(dataset_id, page)?)
    }

    /// Returns the number of items in a version.
    ///
    /// Completed versions answer from the row; otherwise the cached count is
    /// used, computing and caching it from the live window when absent.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::NotFound`] for a missing version and storage errors.
    pub fn get_item_count_of_version(&self, version_id: VersionId) -> Result<u64, DatasetError> {
        let version = self.get_version(version_id)?;
        if version.snapshot_status == SnapshotStatus::Completed {
            return Ok(version.item_count);
        }
        if let Some(count) = self.collaborators.counter.get_item_count_of_version(version_id)? {
            return Ok(count);
        }
        let count = self.collaborators.repository.count_items_at_version(version.dataset_id, version.version_num)?;
        self.collaborators.counter.set_item_count_of_version(version_id, count)?;
        Ok(count)
    }

    /// Lists the items of a version with payloads.
    ///
    /// Completed versions read their snapshots; others read the live window
    /// at `version_num`.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::NotFound`] for a missing version and storage errors.
    pub async fn list_items_of_version(
        &self,
        version_id: VersionId,
        page: &PageRequest,
    ) -> Result<Page<Item>, DatasetError> {
        let version = self.get_version(version_id)?;
        let mut listed = if version.snapshot_status == SnapshotStatus::Completed {
            let snapshots = self.collaborators.repository.list_snapshots(version_id, page)?;
            Page {
                items: snapshots.items.into_iter().map(|snapshot| snapshot.item).collect(),
                next_cursor: snapshots.next_cursor,
            }
        } else {
            self.collaborators.repository.list_items_at_version(version.dataset_id, version.version_num, page)?
        };
        self.items.present(version.schema_id, &mut listed.items).await?;
        Ok(listed)
    }

    /// Deletes a version row and its snapshots; item rows are untouched.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::NotFound`] for a missing version and storage errors.
    pub fn purge_version(&self, version_id: VersionId) -> Result<u64, DatasetError> {
        self.get_version(version_id)?;
        let mut removed = 0_u64;
        self.collaborators.repository.transaction(&mut |tx: &dyn RepositoryOps| {
            removed = tx.delete_snapshots(version_id)?;
            tx.delete_version(version_id)?;
            Ok(())
        })?;
        Ok(removed)
    }

    /// Loads a dataset from the primary replica.
    fn load_dataset(&self, dataset_id: DatasetId) -> Result<Dataset, DatasetError> {
        self.collaborators
            .repository
            .get_dataset(dataset_id, ReadOptions::master())?
            .ok_or_else(|| DatasetError::NotFound(format!("dataset {dataset_id}")))
    }
}
