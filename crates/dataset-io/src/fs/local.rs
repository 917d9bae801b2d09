// crates/dataset-io/src/fs/local.rs
// ============================================================================
// Module: Local Filesystem
// Description: Directory-sandboxed source provider.
// Purpose: Read import sources from a local tree without escaping its root.
// Dependencies: cap-std, dataset-core
// ============================================================================

//! ## Overview
//! [`LocalFileSystem`] holds a capability handle on its root directory.
//! All lookups go through that handle, so absolute paths, parent traversal,
//! and symlinks pointing outside the root cannot reach other files.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::path::Path;
use std::path::PathBuf;

use cap_std::ambient_authority;
use cap_std::fs::Dir;
use dataset_core::FileStat;
use dataset_core::FileSystem;
use dataset_core::SourceError;

use crate::fs::io_error;
use crate::fs::path_components;

// ============================================================================
// SECTION: Provider
// ============================================================================

/// Read-only provider rooted at a local directory.
#[derive(Debug)]
pub struct LocalFileSystem {
    /// Root directory handle.
    root: Dir,
    /// Root path, kept for diagnostics.
    root_path: PathBuf,
}

impl LocalFileSystem {
    /// Opens a provider rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::NotFound`] when the root is missing and
    /// [`SourceError::Io`] when it cannot be opened as a directory.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, SourceError> {
        let root_path = root.as_ref().to_path_buf();
        let display = root_path.display().to_string();
        let root = Dir::open_ambient_dir(&root_path, ambient_authority()).map_err(|err| io_error(&display, &err))?;
        Ok(Self {
            root,
            root_path,
        })
    }

    /// Returns the root directory path.
    #[must_use]
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Resolves a source path to a root-relative path.
    fn resolve(path: &str) -> Result<PathBuf, SourceError> {
        let components = path_components(path)?;
        if components.is_empty() {
            return Ok(PathBuf::from("."));
        }
        Ok(components.iter().collect())
    }
}

impl FileSystem for LocalFileSystem {
    fn stat(&self, path: &str) -> Result<FileStat, SourceError> {
        let relative = Self::resolve(path)?;
        let metadata = self.root.metadata(&relative).map_err(|err| io_error(path, &err))?;
        let name = path_components(path)?.last().map_or_else(String::new, |name| (*name).to_string());
        Ok(FileStat {
            name,
            size: metadata.len(),
            is_dir: metadata.is_dir(),
        })
    }

    fn read_dir(&self, path: &str) -> Result<Vec<FileStat>, SourceError> {
        let relative = Self::resolve(path)?;
        let entries = self.root.read_dir(&relative).map_err(|err| io_error(path, &err))?;
        let mut stats = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| io_error(path, &err))?;
            let metadata = entry.metadata().map_err(|err| io_error(path, &err))?;
            stats.push(FileStat {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
                is_dir: metadata.is_dir(),
            });
        }
        stats.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(stats)
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>, SourceError> {
        let relative = Self::resolve(path)?;
        let file = self.root.open(&relative).map_err(|err| io_error(path, &err))?;
        let metadata = file.metadata().map_err(|err| io_error(path, &err))?;
        if metadata.is_dir() {
            return Err(SourceError::Unsupported(format!("{path} is a directory")));
        }
        Ok(Box::new(file.into_std()))
    }
}
