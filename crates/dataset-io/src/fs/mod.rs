// crates/dataset-io/src/fs/mod.rs
// ============================================================================
// Module: Source Filesystems
// Description: Read-only filesystem providers and shared path handling.
// Purpose: Resolve untrusted source paths to provider-relative components.
// Dependencies: dataset-core
// ============================================================================

//! ## Overview
//! Source paths use `/` separators and are always relative to the provider
//! root. Leading separators and `.` components are ignored; `..` is
//! rejected before any provider sees the path.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod local;
pub mod memory;

// ============================================================================
// SECTION: Imports
// ============================================================================

use dataset_core::SourceError;

pub use self::local::LocalFileSystem;
pub use self::memory::MemoryFileSystem;

// ============================================================================
// SECTION: Paths
// ============================================================================

/// Splits a source path into normal components.
///
/// An empty result denotes the provider root.
///
/// # Errors
///
/// Returns [`SourceError::Unsupported`] when the path contains `..` or a
/// NUL byte.
pub fn path_components(path: &str) -> Result<Vec<&str>, SourceError> {
    if path.contains('\0') {
        return Err(SourceError::Unsupported(format!("path contains NUL: {path:?}")));
    }
    let mut components = Vec::new();
    for component in path.split(['/', '\\']) {
        match component {
            "" | "." => {}
            ".." => return Err(SourceError::Unsupported(format!("path escapes provider root: {path}"))),
            other => components.push(other),
        }
    }
    Ok(components)
}

/// Normalizes a source path to `a/b/c` form.
///
/// # Errors
///
/// Returns [`SourceError::Unsupported`] for paths rejected by
/// [`path_components`].
pub fn normalize_path(path: &str) -> Result<String, SourceError> {
    Ok(path_components(path)?.join("/"))
}

/// Maps an IO error on `path` into a source error.
pub(crate) fn io_error(path: &str, err: &std::io::Error) -> SourceError {
    match err.kind() {
        std::io::ErrorKind::NotFound => SourceError::NotFound(path.to_string()),
        std::io::ErrorKind::PermissionDenied => SourceError::Unsupported(format!("{path}: {err}")),
        _ => SourceError::Io(format!("{path}: {err}")),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
