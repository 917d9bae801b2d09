// crates/dataset-engine/src/schema_service.rs
// ============================================================================
// Module: Schema Service
// Description: Schema edits under the update-schema barrier.
// Purpose: Merge field edits, enforce compatibility, and fork frozen schemas.
// Dependencies: dataset-core
// ============================================================================

//! ## Overview
//! A schema edit merges the requested fields onto the current schema. When
//! the merge is incompatible with the previous fields the dataset must hold
//! no live items. Mutable schemas are updated in place; a schema frozen by a
//! version is never modified, so the edit inserts a new schema row and
//! repoints the dataset at it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use dataset_core::Dataset;
use dataset_core::DatasetError;
use dataset_core::DatasetId;
use dataset_core::DatasetSchema;
use dataset_core::FieldSchema;
use dataset_core::OpContext;
use dataset_core::OperationKind;
use dataset_core::ReadOptions;
use dataset_core::RepositoryOps;
use dataset_core::core::time::now_millis;
use dataset_core::runtime::schema::compatible;
use dataset_core::runtime::schema::merge;

use crate::barrier::OperationBarrier;
use crate::collaborators::Collaborators;

// ============================================================================
// SECTION: Service
// ============================================================================

/// Schema read and edit operations.
#[derive(Clone)]
pub struct SchemaService {
    /// Shared backends.
    collaborators: Collaborators,
    /// Barrier for schema edits.
    barrier: OperationBarrier,
}

impl SchemaService {
    /// Creates the service.
    #[must_use]
    pub const fn new(collaborators: Collaborators, barrier: OperationBarrier) -> Self {
        Self {
            collaborators,
            barrier,
        }
    }

    /// Returns the dataset's current schema.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::NotFound`] when the dataset or schema is missing.
    pub fn get_schema(&self, dataset_id: DatasetId) -> Result<DatasetSchema, DatasetError> {
        let dataset = self.load_dataset(dataset_id)?;
        self.load_schema(&dataset)
    }

    /// Replaces the dataset's field list.
    ///
    /// Fields omitted from `fields` become tombstones. Incompatible edits
    /// require an empty dataset.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidParam`] when editing is disabled or the
    /// fields are invalid, [`DatasetError::IncompatibleDatasetSchema`] when an
    /// incompatible edit meets live items, and barrier or storage errors.
    pub async fn update_schema(
        &self,
        ctx: &OpContext,
        dataset_id: DatasetId,
        fields: Vec<FieldSchema>,
        operator: &str,
    ) -> Result<DatasetSchema, DatasetError> {
        let dataset = self.load_dataset(dataset_id)?;
        ensure_editable(&dataset)?;
        let schema = self.load_schema(&dataset)?;
        let merged = merge(&dataset, &schema.fields, fields.clone())?;
        if !compatible(&schema.fields, &merged) {
            self.ensure_empty(dataset_id)?;
        }

        let guard = self.barrier.acquire(ctx, dataset_id, OperationKind::UpdateSchema).await?;
        let dataset = self.load_dataset(dataset_id)?;
        ensure_editable(&dataset)?;
        let schema = self.load_schema(&dataset)?;
        let merged = merge(&dataset, &schema.fields, fields)?;
        let requires_empty = !compatible(&schema.fields, &merged);
        ctx.check()?;

        let now = now_millis();
        let mut committed = None;
        self.collaborators.repository.transaction(&mut |tx: &dyn RepositoryOps| {
            if requires_empty && tx.count_live_items(dataset_id)? > 0 {
                return Err(incompatible(dataset_id));
            }
            let mut touched = dataset.clone();
            touched.last_operation = Some(OperationKind::UpdateSchema);
            touched.updated_by = operator.to_string();
            touched.updated_at_ms = now;
            let stored = if schema.immutable {
                let mut fork = DatasetSchema::new(dataset_id, merged.clone());
                fork.update_version = 1;
                fork.created_by = operator.to_string();
                fork.created_at_ms = now;
                fork.updated_by = operator.to_string();
                fork.updated_at_ms = now;
                let fork = tx.insert_schema(&fork)?;
                touched.schema_id = fork.id;
                fork
            } else {
                let mut updated = schema.clone();
                updated.fields.clone_from(&merged);
                updated.update_version = schema.update_version + 1;
                updated.updated_by = operator.to_string();
                updated.updated_at_ms = now;
                tx.update_schema(&updated, schema.update_version)?;
                updated
            };
            tx.update_dataset(&touched, dataset.next_version_num)?;
            committed = Some(stored);
            Ok(())
        })?;
        drop(guard);
        committed.ok_or_else(|| DatasetError::Internal("schema transaction committed nothing".to_string()))
    }

    /// Fails when the dataset still holds live items.
    fn ensure_empty(&self, dataset_id: DatasetId) -> Result<(), DatasetError> {
        if self.collaborators.repository.count_live_items(dataset_id)? > 0 {
            return Err(incompatible(dataset_id));
        }
        Ok(())
    }

    /// Loads a dataset from the primary replica.
    fn load_dataset(&self, dataset_id: DatasetId) -> Result<Dataset, DatasetError> {
        self.collaborators
            .repository
            .get_dataset(dataset_id, ReadOptions::master())?
            .ok_or_else(|| DatasetError::NotFound(format!("dataset {dataset_id}")))
    }

    /// Loads the dataset's current schema.
    fn load_schema(&self, dataset: &Dataset) -> Result<DatasetSchema, DatasetError> {
        self.collaborators
            .repository
            .get_schema(dataset.schema_id)?
            .ok_or_else(|| DatasetError::NotFound(format!("schema {} of dataset {}", dataset.schema_id, dataset.id)))
    }
}

/// Fails when schema editing is disabled or the dataset is read-only.
fn ensure_editable(dataset: &Dataset) -> Result<(), DatasetError> {
    dataset.ensure_writable()?;
    if !dataset.features.edit_schema {
        return Err(DatasetError::InvalidParam(format!("dataset {} does not allow schema edits", dataset.id)));
    }
    Ok(())
}

/// Error for incompatible edits on a non-empty dataset.
fn incompatible(dataset_id: DatasetId) -> DatasetError {
    DatasetError::IncompatibleDatasetSchema(format!(
        "dataset {dataset_id} holds items; the new fields are incompatible with the current schema"
    ))
}
