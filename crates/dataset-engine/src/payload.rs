// crates/dataset-engine/src/payload.rs
// ============================================================================
// Module: Tiered Payload Store
// Description: Size-based routing of item payloads to storage providers.
// Purpose: Keep large payloads out of item rows behind a stable storage key.
// Dependencies: dataset-core, serde, serde_json
// ============================================================================

//! ## Overview
//! The tier table is an ordered list of `(provider, max_size)` entries with
//! strictly ascending sizes. Each item goes to the first provider whose
//! `max_size` covers `data_properties.bytes`. Inline-row payloads stay in the
//! row; every other provider receives the serialized payload under
//! `dataset:{did}:item:{iid}:vn:{add_vn}` and the row keeps only the pointer.
//! In-place rewrites append a `:rev:{revision}` segment so the committed
//! object stays readable until the new row is stored. Reads reverse the process from `data_properties.storage`. Adding a tier
//! is a configuration change; services never name providers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use dataset_core::DatasetError;
use dataset_core::FieldData;
use dataset_core::Item;
use dataset_core::ItemPayload;
use dataset_core::PayloadDriver;
use dataset_core::PayloadEntry;
use dataset_core::RepeatedRow;
use dataset_core::StorageProvider;
use serde::Serialize;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// One storage tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tier {
    /// Provider receiving payloads of this tier.
    pub provider: StorageProvider,
    /// Largest payload (bytes) routed to this tier.
    pub max_size: u64,
}

/// Ordered tier table.
///
/// # Invariants
/// - At least one tier; `max_size` strictly ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierConfig {
    /// Tiers in ascending size order.
    pub tiers: Vec<Tier>,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            tiers: vec![Tier {
                provider: StorageProvider::InlineRow,
                max_size: u64::MAX,
            }],
        }
    }
}

impl TierConfig {
    /// Validates ordering and emptiness.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidParam`] for an empty or unordered table.
    pub fn validate(&self) -> Result<(), DatasetError> {
        if self.tiers.is_empty() {
            return Err(DatasetError::InvalidParam("tier table must not be empty".to_string()));
        }
        for pair in self.tiers.windows(2) {
            if pair[1].max_size <= pair[0].max_size {
                return Err(DatasetError::InvalidParam(format!(
                    "tier max sizes must ascend: {} follows {}",
                    pair[1].max_size, pair[0].max_size
                )));
            }
        }
        Ok(())
    }
}

/// Serialized view of an item payload, borrowed from the item.
#[derive(Serialize)]
struct PayloadView<'a> {
    /// Flat fields.
    data: &'a [FieldData],
    /// Repeated rows.
    repeated_data: &'a [RepeatedRow],
}

/// Objects written by one offload, for cleanup when the insert fails.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OffloadReceipt {
    /// Written keys per provider.
    written: BTreeMap<StorageProvider, Vec<String>>,
}

impl OffloadReceipt {
    /// Returns true when nothing left the rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.written.values().all(Vec::is_empty)
    }

    /// Returns the number of objects written.
    #[must_use]
    pub fn len(&self) -> usize {
        self.written.values().map(Vec::len).sum()
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Routes payloads to tiers and back.
#[derive(Clone)]
pub struct TieredPayloadStore {
    /// Tiers in ascending size order.
    tiers: Vec<Tier>,
    /// Drivers for object-store providers.
    drivers: BTreeMap<StorageProvider, Arc<dyn PayloadDriver>>,
}

impl TieredPayloadStore {
    /// Builds the store from a validated tier table.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidParam`] when the table is invalid or an
    /// object-store tier has no driver.
    pub fn new(
        config: TierConfig,
        drivers: BTreeMap<StorageProvider, Arc<dyn PayloadDriver>>,
    ) -> Result<Self, DatasetError> {
        config.validate()?;
        for tier in &config.tiers {
            if tier.provider != StorageProvider::InlineRow && !drivers.contains_key(&tier.provider) {
                return Err(DatasetError::InvalidParam(format!(
                    "tier {} has no payload driver",
                    tier.provider.as_str()
                )));
            }
        }
        Ok(Self {
            tiers: config.tiers,
            drivers,
        })
    }

    /// Picks the provider for a payload of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Internal`] when no tier is large enough.
    pub fn select(&self, bytes: u64) -> Result<StorageProvider, DatasetError> {
        self.tiers
            .iter()
            .find(|tier| tier.max_size >= bytes)
            .map(|tier| tier.provider)
            .ok_or_else(|| DatasetError::Internal(format!("no storage tier accepts a {bytes} byte payload")))
    }

    /// Returns true when any item would leave the row.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Internal`] when no tier fits an item.
    pub fn needs_object_tier(&self, items: &[Item]) -> Result<bool, DatasetError> {
        for item in items {
            if self.select(item.data_properties.bytes)? != StorageProvider::InlineRow {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Returns the object key of an item payload.
    #[must_use]
    pub fn storage_key(item: &Item) -> String {
        format!("dataset:{}:item:{}:vn:{}", item.dataset_id, item.item_id, item.add_vn)
    }

    /// Returns the object key of a rewritten payload.
    #[must_use]
    pub fn revision_key(item: &Item, revision: &str) -> String {
        format!("{}:rev:{revision}", Self::storage_key(item))
    }

    /// Writes payloads of non-inline items to their tiers and strips them
    /// from the rows.
    ///
    /// Items must carry `item_id` and `add_vn`. Payloads are removed from the
    /// rows only after every write succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Internal`] when no tier fits or serialization
    /// fails, and a storage error when a driver write fails.
    pub async fn offload(&self, items: &mut [Item]) -> Result<OffloadReceipt, DatasetError> {
        self.offload_keyed(items, None).await
    }

    /// Offloads a rewrite of stored rows under revision keys, leaving the
    /// objects of the committed rows untouched.
    ///
    /// # Errors
    ///
    /// Same as [`TieredPayloadStore::offload`].
    pub async fn offload_revision(&self, items: &mut [Item], revision: &str) -> Result<OffloadReceipt, DatasetError> {
        self.offload_keyed(items, Some(revision)).await
    }

    /// Offload body shared by fresh writes and rewrites.
    async fn offload_keyed(&self, items: &mut [Item], revision: Option<&str>) -> Result<OffloadReceipt, DatasetError> {
        let mut batches: BTreeMap<StorageProvider, Vec<(usize, PayloadEntry)>> = BTreeMap::new();
        for (position, item) in items.iter_mut().enumerate() {
            let provider = self.select(item.data_properties.bytes)?;
            item.data_properties.storage = provider;
            if provider == StorageProvider::InlineRow {
                item.data_properties.storage_key = None;
                continue;
            }
            if item.item_id.is_unset() {
                return Err(DatasetError::Internal("object tier payload needs an item id".to_string()));
            }
            let key = revision.map_or_else(|| Self::storage_key(item), |revision| Self::revision_key(item, revision));
            let bytes = serde_json::to_vec(&PayloadView {
                data: &item.data,
                repeated_data: &item.repeated_data,
            })
            .map_err(|err| DatasetError::json("serialize item payload", &err))?;
            item.data_properties.storage_key = Some(key.clone());
            batches.entry(provider).or_default().push((position, PayloadEntry {
                key,
                bytes,
            }));
        }
        let mut receipt = OffloadReceipt::default();
        for (provider, batch) in &batches {
            let driver = self.driver(*provider)?;
            let entries: Vec<PayloadEntry> = batch.iter().map(|(_, entry)| entry.clone()).collect();
            if let Err(err) = driver.mset_item_data(&entries).await {
                let _ = self.discard(&receipt).await;
                return Err(err.into());
            }
            receipt.written.insert(*provider, entries.into_iter().map(|entry| entry.key).collect());
        }
        for (position, _) in batches.values().flatten() {
            if let Some(item) = items.get_mut(*position) {
                drop(item.take_payload());
            }
        }
        Ok(receipt)
    }

    /// Deletes objects written by an offload whose rows were not stored.
    ///
    /// # Errors
    ///
    /// Returns a storage error when a delete fails.
    pub async fn discard(&self, receipt: &OffloadReceipt) -> Result<(), DatasetError> {
        for (provider, keys) in &receipt.written {
            if keys.is_empty() {
                continue;
            }
            self.driver(*provider)?.delete_item_data(keys).await?;
        }
        Ok(())
    }

    /// Restores payloads of rows whose data lives in an object tier.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Internal`] when an object is missing or does
    /// not decode, and a storage error when a driver read fails.
    pub async fn load(&self, items: &mut [Item]) -> Result<(), DatasetError> {
        let mut batches: BTreeMap<StorageProvider, Vec<(usize, String)>> = BTreeMap::new();
        for (position, item) in items.iter().enumerate() {
            let provider = item.data_properties.storage;
            if provider == StorageProvider::InlineRow || !item.has_no_payload() {
                continue;
            }
            let key = item.data_properties.storage_key.clone().unwrap_or_else(|| Self::storage_key(item));
            batches.entry(provider).or_default().push((position, key));
        }
        for (provider, batch) in batches {
            let keys: Vec<String> = batch.iter().map(|(_, key)| key.clone()).collect();
            let objects = self.driver(provider)?.mget_item_data(&keys).await?;
            for ((position, key), object) in batch.into_iter().zip(objects) {
                let bytes = object.ok_or_else(|| {
                    DatasetError::Internal(format!("payload object {key} missing from {}", provider.as_str()))
                })?;
                let payload: ItemPayload =
                    serde_json::from_slice(&bytes).map_err(|err| DatasetError::json("decode item payload", &err))?;
                if let Some(item) = items.get_mut(position) {
                    item.restore_payload(payload);
                }
            }
        }
        Ok(())
    }

    /// Deletes the objects behind rows that were physically removed.
    ///
    /// # Errors
    ///
    /// Returns a storage error when a delete fails.
    pub async fn delete(&self, items: &[Item]) -> Result<(), DatasetError> {
        let mut receipt = OffloadReceipt::default();
        for item in items {
            let provider = item.data_properties.storage;
            if provider == StorageProvider::InlineRow {
                continue;
            }
            let key = item.data_properties.storage_key.clone().unwrap_or_else(|| Self::storage_key(item));
            receipt.written.entry(provider).or_default().push(key);
        }
        self.discard(&receipt).await
    }

    /// Returns the driver for an object-store provider.
    fn driver(&self, provider: StorageProvider) -> Result<&Arc<dyn PayloadDriver>, DatasetError> {
        self.drivers
            .get(&provider)
            .ok_or_else(|| DatasetError::Internal(format!("no payload driver for {}", provider.as_str())))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::expect_used,
        clippy::unwrap_used,
        reason = "Test assertions use expect/unwrap for clarity."
    )]

    use super::*;

    #[test]
    fn validate_rejects_unordered_tiers() {
        let config = TierConfig {
            tiers: vec![
                Tier {
                    provider: StorageProvider::InlineRow,
                    max_size: 100,
                },
                Tier {
                    provider: StorageProvider::ObjectStoreA,
                    max_size: 100,
                },
            ],
        };
        assert!(config.validate().is_err());
        assert!(TierConfig { tiers: Vec::new() }.validate().is_err());
    }

    #[test]
    fn select_fails_past_last_tier() {
        let store = TieredPayloadStore::new(
            TierConfig {
                tiers: vec![Tier {
                    provider: StorageProvider::InlineRow,
                    max_size: 10,
                }],
            },
            BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(store.select(10).unwrap(), StorageProvider::InlineRow);
        assert!(matches!(store.select(11), Err(DatasetError::Internal(_))));
    }
}
