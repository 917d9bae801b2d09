// crates/dataset-object-store/src/key.rs
// ============================================================================
// Module: Storage Keys
// Description: Validation of payload keys and bucket prefixes.
// Purpose: Reject keys that could traverse or collide before any I/O.
// Dependencies: none
// ============================================================================

//! ## Overview
//! Payload keys are colon-separated segments such as
//! `dataset:7:item:42:vn:3`. Each segment is restricted to ASCII
//! alphanumerics plus `-`, `_` and `.`, and may not be `.` or `..`, so the
//! same key maps safely onto an object name or a nested local path.

use std::path::PathBuf;

use crate::error::ObjectStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a single key segment.
pub const MAX_SEGMENT_LENGTH: usize = 255;
/// Maximum total key length.
pub const MAX_KEY_LENGTH: usize = 1024;
/// Separator between key segments.
pub const KEY_SEPARATOR: char = ':';

// ============================================================================
// SECTION: Keys
// ============================================================================

/// Validates a payload key and returns its segments.
///
/// # Errors
///
/// Returns [`ObjectStoreError::Invalid`] when the key is empty, too long, or
/// has an invalid segment.
pub fn key_segments(key: &str) -> Result<Vec<&str>, ObjectStoreError> {
    if key.is_empty() {
        return Err(ObjectStoreError::Invalid("key must be set".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(ObjectStoreError::Invalid("key exceeds length limit".to_string()));
    }
    let segments: Vec<&str> = key.split(KEY_SEPARATOR).collect();
    for segment in &segments {
        validate_segment(segment)?;
    }
    Ok(segments)
}

/// Maps a payload key onto a relative path with one directory per segment.
///
/// # Errors
///
/// Returns [`ObjectStoreError::Invalid`] for invalid keys.
pub fn key_path(key: &str) -> Result<PathBuf, ObjectStoreError> {
    Ok(key_segments(key)?.into_iter().collect())
}

/// Validates one key or prefix segment.
fn validate_segment(segment: &str) -> Result<(), ObjectStoreError> {
    if segment.is_empty() || segment == "." || segment == ".." {
        return Err(ObjectStoreError::Invalid(format!("segment {segment:?} is invalid")));
    }
    if segment.len() > MAX_SEGMENT_LENGTH {
        return Err(ObjectStoreError::Invalid("segment exceeds length limit".to_string()));
    }
    if !segment.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.')) {
        return Err(ObjectStoreError::Invalid(format!("segment {segment:?} contains invalid characters")));
    }
    Ok(())
}

// ============================================================================
// SECTION: Prefixes
// ============================================================================

/// Normalizes a bucket prefix to `""` or `"a/b/"`.
///
/// # Errors
///
/// Returns [`ObjectStoreError::Invalid`] for absolute prefixes, traversal,
/// backslashes, or invalid segments.
pub fn normalize_prefix(raw: &str) -> Result<String, ObjectStoreError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    if trimmed.starts_with('/') {
        return Err(ObjectStoreError::Invalid("prefix must be relative (no leading slash)".to_string()));
    }
    if trimmed.contains('\\') {
        return Err(ObjectStoreError::Invalid("prefix must not contain backslashes".to_string()));
    }
    if trimmed.len() > MAX_KEY_LENGTH {
        return Err(ObjectStoreError::Invalid("prefix exceeds length limit".to_string()));
    }
    let normalized = trimmed.strip_suffix('/').unwrap_or(trimmed);
    for segment in normalized.split('/') {
        validate_segment(segment)?;
    }
    Ok(format!("{normalized}/"))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use super::*;

    #[test]
    fn engine_keys_map_to_nested_paths() {
        let path = key_path("dataset:7:item:42:vn:3").unwrap();
        assert_eq!(path, PathBuf::from("dataset/7/item/42/vn/3"));
    }

    #[test]
    fn traversal_and_separators_are_rejected() {
        for key in ["", "dataset::1", "dataset:..:1", "a/b", "a\\b", "a:.", "caf\u{e9}"] {
            assert!(key_segments(key).is_err(), "{key:?} accepted");
        }
    }

    #[test]
    fn prefixes_normalize_with_trailing_slash() {
        assert_eq!(normalize_prefix("").unwrap(), "");
        assert_eq!(normalize_prefix(" payloads/prod/ ").unwrap(), "payloads/prod/");
        assert!(normalize_prefix("/abs").is_err());
        assert!(normalize_prefix("a/../b").is_err());
        assert!(normalize_prefix("a\\b").is_err());
    }
}
