// crates/dataset-engine/src/dataset_service.rs
// ============================================================================
// Module: Dataset Service
// Description: Dataset lifecycle: create, read, list, soft delete, rename.
// Purpose: Keep dataset and initial schema creation in one transaction.
// Dependencies: dataset-core
// ============================================================================

//! ## Overview
//! Creating a dataset validates the requested fields, assigns ids (falling
//! back to store auto-increment when the id generator is down), and inserts
//! the dataset with its first mutable schema in a single transaction. The
//! item counter starts at zero. Deletion is a soft delete that never
//! cascades to schemas, versions, or items.

// ============================================================================
// SECTION: Imports
// ============================================================================

use dataset_core::Dataset;
use dataset_core::DatasetError;
use dataset_core::DatasetId;
use dataset_core::DatasetSchema;
use dataset_core::DatasetStatus;
use dataset_core::FieldSchema;
use dataset_core::OpContext;
use dataset_core::OperationKind;
use dataset_core::Page;
use dataset_core::PageRequest;
use dataset_core::ReadOptions;
use dataset_core::RepositoryOps;
use dataset_core::SchemaId;
use dataset_core::SpaceId;
use dataset_core::core::time::now_millis;
use dataset_core::runtime::schema::prepare_fields;

use crate::barrier::OperationBarrier;
use crate::collaborators::Collaborators;
use crate::events::EngineEvent;
use crate::events::ID_FALLBACK;

// ============================================================================
// SECTION: Service
// ============================================================================

/// Dataset lifecycle operations.
#[derive(Clone)]
pub struct DatasetService {
    /// Shared backends.
    collaborators: Collaborators,
    /// Barrier for dataset creation.
    barrier: OperationBarrier,
}

impl DatasetService {
    /// Creates the service.
    #[must_use]
    pub const fn new(collaborators: Collaborators, barrier: OperationBarrier) -> Self {
        Self {
            collaborators,
            barrier,
        }
    }

    /// Creates a dataset with its first schema.
    ///
    /// The caller's `id`, `schema_id`, status, and version fields are reset.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidParam`] for invalid fields and storage
    /// errors from collaborators.
    pub async fn create_dataset(
        &self,
        ctx: &OpContext,
        dataset: Dataset,
        fields: Vec<FieldSchema>,
        operator: &str,
    ) -> Result<(Dataset, DatasetSchema), DatasetError> {
        ctx.check()?;
        if dataset.name.trim().is_empty() {
            return Err(DatasetError::InvalidParam("dataset name must not be empty".to_string()));
        }
        let fields = prepare_fields(&dataset, fields)?;
        let now = now_millis();
        let mut row = dataset;
        row.status = DatasetStatus::Available;
        row.latest_version = None;
        row.next_version_num = 1;
        row.last_operation = Some(OperationKind::CreateDataset);
        row.created_by = operator.to_string();
        row.created_at_ms = now;
        row.updated_by = operator.to_string();
        row.updated_at_ms = now;
        let mut schema = DatasetSchema::new(DatasetId::default(), fields);
        schema.update_version = 1;
        schema.created_by = operator.to_string();
        schema.created_at_ms = now;
        schema.updated_by = operator.to_string();
        schema.updated_at_ms = now;

        match self.collaborators.ids.gen_multi_ids(2) {
            Ok(ids) if ids.len() == 2 => {
                row.id = DatasetId::new(ids[0]);
                schema.id = SchemaId::new(ids[1]);
                schema.dataset_id = row.id;
                row.schema_id = schema.id;
            }
            outcome => {
                let reason = outcome.map_or_else(|err| err.to_string(), |ids| format!("generator returned {} ids", ids.len()));
                row.id = DatasetId::default();
                row.schema_id = SchemaId::default();
                schema.id = SchemaId::default();
                self.collaborators.emit(&EngineEvent::warn(ID_FALLBACK, format!("using store-assigned dataset ids: {reason}")));
            }
        }

        let guard = if row.id.is_unset() {
            None
        } else {
            Some(self.barrier.acquire(ctx, row.id, OperationKind::CreateDataset).await?)
        };
        let mut created = None;
        self.collaborators.repository.transaction(&mut |tx: &dyn RepositoryOps| {
            let mut dataset = tx.insert_dataset(&row)?;
            let mut first = schema.clone();
            first.dataset_id = dataset.id;
            let first = tx.insert_schema(&first)?;
            if dataset.schema_id != first.id {
                dataset.schema_id = first.id;
                tx.update_dataset(&dataset, dataset.next_version_num)?;
            }
            created = Some((dataset, first));
            Ok(())
        })?;
        drop(guard);
        let (dataset, schema) =
            created.ok_or_else(|| DatasetError::Internal("dataset transaction committed nothing".to_string()))?;
        self.collaborators.counter.set_item_count(dataset.id, 0)?;
        Ok((dataset, schema))
    }

    /// Loads a dataset, excluding soft-deleted ones.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::NotFound`] when the dataset is missing or deleted.
    pub fn get_dataset(&self, dataset_id: DatasetId) -> Result<Dataset, DatasetError> {
        self.collaborators
            .repository
            .get_dataset(dataset_id, ReadOptions::default())?
            .ok_or_else(|| DatasetError::NotFound(format!("dataset {dataset_id}")))
    }

    /// Lists datasets of a space.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn list_datasets(&self, space_id: SpaceId, page: &PageRequest) -> Result<Page<Dataset>, DatasetError> {
        Ok(self.collaborators.repository.list_datasets(space_id, page)?)
    }

    /// Soft-deletes a dataset.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::NotFound`] when the dataset is missing and
    /// [`DatasetError::ConcurrentDatasetOperations`] when a version was
    /// created concurrently.
    pub fn delete_dataset(&self, dataset_id: DatasetId, operator: &str) -> Result<(), DatasetError> {
        let dataset = self.load_for_update(dataset_id)?;
        if dataset.status == DatasetStatus::Deleted {
            return Ok(());
        }
        let mut deleted = dataset.clone();
        deleted.status = DatasetStatus::Deleted;
        deleted.updated_by = operator.to_string();
        deleted.updated_at_ms = now_millis();
        self.collaborators.repository.update_dataset(&deleted, dataset.next_version_num)?;
        Ok(())
    }

    /// Updates a dataset's name and description.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidParam`] for an empty name or a
    /// read-only dataset, [`DatasetError::NotFound`] when missing, and
    /// [`DatasetError::ConcurrentDatasetOperations`] on a concurrent version.
    pub fn update_dataset_meta(
        &self,
        dataset_id: DatasetId,
        name: Option<String>,
        description: Option<String>,
        operator: &str,
    ) -> Result<Dataset, DatasetError> {
        let dataset = self.load_for_update(dataset_id)?;
        dataset.ensure_writable()?;
        let mut updated = dataset.clone();
        if let Some(name) = name {
            if name.trim().is_empty() {
                return Err(DatasetError::InvalidParam("dataset name must not be empty".to_string()));
            }
            updated.name = name;
        }
        if let Some(description) = description {
            updated.description = description;
        }
        updated.updated_by = operator.to_string();
        updated.updated_at_ms = now_millis();
        self.collaborators.repository.update_dataset(&updated, dataset.next_version_num)?;
        Ok(updated)
    }

    /// Loads a dataset from the primary replica, including deleted rows.
    fn load_for_update(&self, dataset_id: DatasetId) -> Result<Dataset, DatasetError> {
        let options = ReadOptions {
            with_master: true,
            with_deleted: true,
        };
        self.collaborators
            .repository
            .get_dataset(dataset_id, options)?
            .ok_or_else(|| DatasetError::NotFound(format!("dataset {dataset_id}")))
    }
}
