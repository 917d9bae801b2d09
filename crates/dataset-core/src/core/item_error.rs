// crates/dataset-core/src/core/item_error.rs
// ============================================================================
// Module: Item Error Groups
// Description: Per-kind aggregation of item-level ingestion errors.
// Purpose: Bound persisted error detail while keeping exact error counts.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Ingestion never surfaces item-level failures to the caller. Failures are
//! grouped by [`ErrorKind`] into [`ItemErrorGroup`] values that keep an exact
//! `error_count` but at most `cap` detail rows; once details are truncated the
//! group carries a summary line.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::error::DatasetError;
use crate::core::error::ErrorKind;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default number of detail rows kept per error kind.
pub const DEFAULT_MAX_ERROR_DETAILS: usize = 10;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One failed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemErrorDetail {
    /// Position of the item in its batch or source file.
    #[serde(default)]
    pub index: Option<u64>,
    /// Offending field key, when known.
    #[serde(default)]
    pub field: Option<String>,
    /// Human-readable reason.
    pub message: String,
}

/// Item errors of one kind.
///
/// # Invariants
/// - `details.len() <= error_count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemErrorGroup {
    /// Error kind.
    pub kind: ErrorKind,
    /// Summary set once details were truncated.
    #[serde(default)]
    pub summary: Option<String>,
    /// Exact number of failed items.
    pub error_count: u64,
    /// Bounded sample of failures.
    #[serde(default)]
    pub details: Vec<ItemErrorDetail>,
}

impl ItemErrorGroup {
    /// Creates a group with a count and no details.
    #[must_use]
    pub const fn counted(kind: ErrorKind, error_count: u64) -> Self {
        Self {
            kind,
            summary: None,
            error_count,
            details: Vec::new(),
        }
    }

    fn truncate(&mut self, cap: usize) {
        if self.details.len() > cap {
            self.details.truncate(cap);
        }
        if u64::try_from(self.details.len()).unwrap_or(u64::MAX) < self.error_count {
            self.summary = Some(format!(
                "{} {} errors, showing first {}",
                self.error_count,
                self.kind.as_str(),
                self.details.len()
            ));
        }
    }
}

// ============================================================================
// SECTION: Collector
// ============================================================================

/// Accumulates item errors by kind before they are persisted.
#[derive(Debug, Clone, Default)]
pub struct ItemErrorCollector {
    groups: BTreeMap<ErrorKind, ItemErrorGroup>,
}

impl ItemErrorCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one failed item.
    pub fn add(&mut self, kind: ErrorKind, index: Option<u64>, field: Option<String>, message: String) {
        let group = self.groups.entry(kind).or_insert_with(|| ItemErrorGroup::counted(kind, 0));
        group.error_count += 1;
        group.details.push(ItemErrorDetail {
            index,
            field,
            message,
        });
    }

    /// Records one failed item from a classified error.
    pub fn add_error(&mut self, index: Option<u64>, err: &DatasetError) {
        self.add(err.kind(), index, None, err.inner().to_string());
    }

    /// Records `count` failures of `kind` without per-item details.
    pub fn add_count(&mut self, kind: ErrorKind, count: u64, message: &str) {
        if count == 0 {
            return;
        }
        let group = self.groups.entry(kind).or_insert_with(|| ItemErrorGroup::counted(kind, 0));
        group.error_count += count;
        group.summary = Some(message.to_string());
    }

    /// Merges pre-grouped errors into the collector.
    pub fn extend(&mut self, groups: Vec<ItemErrorGroup>) {
        for incoming in groups {
            let group = self
                .groups
                .entry(incoming.kind)
                .or_insert_with(|| ItemErrorGroup::counted(incoming.kind, 0));
            group.error_count += incoming.error_count;
            group.details.extend(incoming.details);
            if group.summary.is_none() {
                group.summary = incoming.summary;
            }
        }
    }

    /// Returns true when nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Returns the total number of failed items.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.groups.values().map(|group| group.error_count).sum()
    }

    /// Returns the number of failed items of `kind`.
    #[must_use]
    pub fn count_of(&self, kind: ErrorKind) -> u64 {
        self.groups.get(&kind).map_or(0, |group| group.error_count)
    }

    /// Drains the collector into groups capped at `cap` details each.
    #[must_use]
    pub fn into_groups(self, cap: usize) -> Vec<ItemErrorGroup> {
        self.groups
            .into_values()
            .map(|mut group| {
                group.truncate(cap);
                group
            })
            .collect()
    }
}

// ============================================================================
// SECTION: Merge
// ============================================================================

/// Merges persisted groups with incoming groups, keeping at most `cap`
/// details per kind and summing counts.
#[must_use]
pub fn merge_error_groups(
    existing: Vec<ItemErrorGroup>,
    incoming: Vec<ItemErrorGroup>,
    cap: usize,
) -> Vec<ItemErrorGroup> {
    let mut collector = ItemErrorCollector::new();
    collector.extend(existing);
    collector.extend(incoming);
    collector.into_groups(cap)
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
    fn merge_caps_details_and_sums_counts() {
        let mut first = ItemErrorCollector::new();
        for index in 0 .. 8 {
            first.add(ErrorKind::SchemaMismatch, Some(index), None, "bad".to_string());
        }
        let mut second = ItemErrorCollector::new();
        for index in 8 .. 15 {
            second.add(ErrorKind::SchemaMismatch, Some(index), None, "bad".to_string());
        }
        let merged = merge_error_groups(first.into_groups(10), second.into_groups(10), 10);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].error_count, 15);
        assert_eq!(merged[0].details.len(), 10);
        assert!(merged[0].summary.is_some());
    }

    #[test]
    fn untruncated_group_has_no_summary() {
        let mut collector = ItemErrorCollector::new();
        collector.add(ErrorKind::EmptyData, Some(1), None, "empty".to_string());
        let groups = collector.into_groups(10);
        assert_eq!(groups[0].summary, None);
    }
}
