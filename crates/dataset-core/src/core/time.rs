// crates/dataset-core/src/core/time.rs
// ============================================================================
// Module: Dataset Time Helpers
// Description: Wall-clock helpers for audit timestamps.
// Purpose: Keep every timestamp leaving the core in epoch milliseconds.
// Dependencies: time
// ============================================================================

//! ## Overview
//! Timestamps stored on datasets, versions, items, and jobs are unix epoch
//! milliseconds (`i64`). This module is the single place the core reads the
//! wall clock so the unit never drifts between micro- and milliseconds.

// ============================================================================
// SECTION: Imports
// ============================================================================

use time::OffsetDateTime;

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Returns the current unix epoch time in milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}

/// Returns true when a record created at `ts_ms` with `ttl_ms` has expired at `now_ms`.
#[must_use]
pub const fn is_expired(ts_ms: i64, ttl_ms: i64, now_ms: i64) -> bool {
    ts_ms.saturating_add(ttl_ms) <= now_ms
}
