// crates/dataset-engine/src/import/unit.rs
// ============================================================================
// Module: Import Unit
// Description: In-memory accumulation between two import commits.
// Purpose: Turn source records into items and progress into job deltas.
// Dependencies: dataset-core
// ============================================================================

//! ## Overview
//! An [`ImportUnit`] holds the records read from one file since the last
//! commit. Its [`SubProgress`] is the absolute progress of the file as of
//! the last read record; [`ImportUnit::commit_delta`] folds the pending
//! counts into it and produces the [`JobDelta`] guarded on the job's
//! committed `processed` count.

// ============================================================================
// SECTION: Imports
// ============================================================================

use dataset_core::ErrorKind;
use dataset_core::FieldData;
use dataset_core::FieldMapping;
use dataset_core::IndexedItem;
use dataset_core::Item;
use dataset_core::ItemErrorCollector;
use dataset_core::ItemErrorGroup;
use dataset_core::JobDelta;
use dataset_core::JobId;
use dataset_core::Record;
use dataset_core::SubProgress;

// ============================================================================
// SECTION: Record Mapping
// ============================================================================

/// Target name that sets the item key instead of a field.
pub const KEY_TARGET: &str = "key";

/// Converts one record into an item.
///
/// Without mappings every column maps to the field of the same name. Null
/// values are dropped. Items without a mapped key get the deterministic key
/// `import:{job}:{file}:{index}` so a replayed record hits the same row.
#[must_use]
pub fn item_from_record(record: &Record, mappings: &[FieldMapping], job_id: JobId, file: &str, index: u64) -> Item {
    let mut key = None;
    let mut data = Vec::new();
    let mut place = |target: &str, content: String| {
        if target == KEY_TARGET {
            key = Some(content);
        } else {
            data.push(FieldData::named(target, content));
        }
    };
    if mappings.is_empty() {
        for (column, value) in record {
            if !value.is_null() {
                place(column, value.to_content_string());
            }
        }
    } else {
        for mapping in mappings {
            if let Some(value) = record.get(&mapping.source)
                && !value.is_null()
            {
                place(&mapping.target, value.to_content_string());
            }
        }
    }
    let key = key.filter(|key| !key.trim().is_empty()).unwrap_or_else(|| format!("import:{job_id}:{file}:{index}"));
    Item::with_data(data).with_item_key(key)
}

// ============================================================================
// SECTION: Unit
// ============================================================================

/// Records of one file read since the last commit.
#[derive(Debug)]
pub struct ImportUnit {
    /// Absolute file progress as of the last read record.
    sub: SubProgress,
    /// Items awaiting insertion.
    items: Vec<IndexedItem>,
    /// Records read for insertion since the last commit.
    processed: u64,
    /// Records only counted since the last commit.
    scanned: u64,
    /// Item errors since the last commit.
    errors: ItemErrorCollector,
}

impl ImportUnit {
    /// Starts a unit from the committed progress of a file.
    #[must_use]
    pub fn new(sub: SubProgress) -> Self {
        Self {
            sub,
            items: Vec::new(),
            processed: 0,
            scanned: 0,
            errors: ItemErrorCollector::new(),
        }
    }

    /// Returns the file progress.
    #[must_use]
    pub const fn sub_progress(&self) -> &SubProgress {
        &self.sub
    }

    /// Queues an item read at `index`; `cursor` is the reader position after it.
    pub fn push(&mut self, index: u64, item: Item, cursor: u64) {
        self.items.push(IndexedItem {
            index,
            item,
        });
        self.processed += 1;
        self.sub.cursor = cursor;
    }

    /// Counts a record read without inserting it.
    pub const fn skip(&mut self, cursor: u64) {
        self.scanned += 1;
        self.sub.cursor = cursor;
    }

    /// Returns the number of records read since the last commit.
    #[must_use]
    pub const fn pending(&self) -> u64 {
        self.processed + self.scanned
    }

    /// Takes the queued items for insertion.
    pub fn take_items(&mut self) -> Vec<IndexedItem> {
        std::mem::take(&mut self.items)
    }

    /// Records errors reported by the insert.
    pub fn add_errors(&mut self, groups: Vec<ItemErrorGroup>) {
        self.errors.extend(groups);
    }

    /// Records a source read failure at `index`.
    pub fn record_read_error(&mut self, index: u64, file: &str, message: &str) {
        self.errors.add(ErrorKind::InternalError, Some(index), None, format!("reading {file} stopped: {message}"));
    }

    /// Marks the file consumed; `cursor` is the number of records it holds.
    pub const fn finish(&mut self, cursor: u64) {
        self.sub.completed = true;
        self.sub.total = Some(cursor);
    }

    /// Folds pending counts into the file progress and builds the delta.
    ///
    /// The unit is empty afterwards.
    pub fn commit_delta(&mut self, expected_processed: u64, added: u64, max_error_details: usize) -> JobDelta {
        self.sub.processed += self.processed;
        self.sub.added += added;
        let errors = std::mem::take(&mut self.errors).into_groups(max_error_details);
        let delta = JobDelta {
            expected_processed,
            delta_processed: self.processed,
            delta_added: added,
            sub_progresses: vec![self.sub.clone()],
            errors,
            max_error_details,
            ..JobDelta::default()
        };
        self.processed = 0;
        self.scanned = 0;
        delta
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
