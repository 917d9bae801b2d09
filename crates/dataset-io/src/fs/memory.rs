// crates/dataset-io/src/fs/memory.rs
// ============================================================================
// Module: Memory Filesystem
// Description: In-memory file tree for tests and staged uploads.
// Purpose: Serve source files without touching disk.
// Dependencies: dataset-core
// ============================================================================

//! ## Overview
//! [`MemoryFileSystem`] keeps normalized paths mapped to byte buffers behind
//! a shared lock. Directories exist implicitly as path prefixes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::io::Cursor;
use std::io::Read;
use std::sync::Arc;
use std::sync::RwLock;

use dataset_core::FileStat;
use dataset_core::FileSystem;
use dataset_core::SourceError;

use crate::fs::normalize_path;

// ============================================================================
// SECTION: Provider
// ============================================================================

/// In-memory file tree keyed by normalized path.
///
/// Directories exist implicitly as prefixes of stored files.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    /// File contents by normalized path.
    files: Arc<RwLock<BTreeMap<String, Arc<Vec<u8>>>>>,
}

impl MemoryFileSystem {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `bytes` at `path`, replacing any previous file.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] for invalid paths or a poisoned tree lock.
    pub fn insert(&self, path: &str, bytes: impl Into<Vec<u8>>) -> Result<(), SourceError> {
        let path = normalize_path(path)?;
        if path.is_empty() {
            return Err(SourceError::Unsupported("cannot store a file at the root".to_string()));
        }
        let mut files = self.files.write().map_err(|_| SourceError::Io("memory tree poisoned".to_string()))?;
        files.insert(path, Arc::new(bytes.into()));
        Ok(())
    }

    /// Removes the file at `path`; returns true when it existed.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] for invalid paths or a poisoned tree lock.
    pub fn remove(&self, path: &str) -> Result<bool, SourceError> {
        let path = normalize_path(path)?;
        let mut files = self.files.write().map_err(|_| SourceError::Io("memory tree poisoned".to_string()))?;
        Ok(files.remove(&path).is_some())
    }

    /// Returns the file contents at a normalized path.
    fn file(&self, path: &str) -> Result<Option<Arc<Vec<u8>>>, SourceError> {
        let files = self.files.read().map_err(|_| SourceError::Io("memory tree poisoned".to_string()))?;
        Ok(files.get(path).cloned())
    }

    /// Returns true when some file lives below the normalized directory.
    fn is_dir(&self, path: &str) -> Result<bool, SourceError> {
        if path.is_empty() {
            return Ok(true);
        }
        let prefix = format!("{path}/");
        let files = self.files.read().map_err(|_| SourceError::Io("memory tree poisoned".to_string()))?;
        Ok(files.range(prefix.clone() ..).next().is_some_and(|(key, _)| key.starts_with(&prefix)))
    }
}

impl FileSystem for MemoryFileSystem {
    fn stat(&self, path: &str) -> Result<FileStat, SourceError> {
        let normalized = normalize_path(path)?;
        let name = normalized.rsplit('/').next().unwrap_or_default().to_string();
        if let Some(bytes) = self.file(&normalized)? {
            return Ok(FileStat {
                name,
                size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
                is_dir: false,
            });
        }
        if self.is_dir(&normalized)? {
            return Ok(FileStat {
                name,
                size: 0,
                is_dir: true,
            });
        }
        Err(SourceError::NotFound(path.to_string()))
    }

    fn read_dir(&self, path: &str) -> Result<Vec<FileStat>, SourceError> {
        let normalized = normalize_path(path)?;
        if !self.is_dir(&normalized)? {
            return Err(SourceError::NotFound(path.to_string()));
        }
        let prefix = if normalized.is_empty() { String::new() } else { format!("{normalized}/") };
        let files = self.files.read().map_err(|_| SourceError::Io("memory tree poisoned".to_string()))?;
        let mut stats = Vec::new();
        let mut dirs = BTreeSet::new();
        for (key, bytes) in files.range(prefix.clone() ..).take_while(|(key, _)| key.starts_with(&prefix)) {
            let rest = &key[prefix.len() ..];
            match rest.split_once('/') {
                Some((dir, _)) => {
                    dirs.insert(dir.to_string());
                }
                None => stats.push(FileStat {
                    name: rest.to_string(),
                    size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
                    is_dir: false,
                }),
            }
        }
        stats.extend(dirs.into_iter().map(|name| FileStat {
            name,
            size: 0,
            is_dir: true,
        }));
        stats.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(stats)
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>, SourceError> {
        let normalized = normalize_path(path)?;
        let bytes = self.file(&normalized)?.ok_or_else(|| SourceError::NotFound(path.to_string()))?;
        Ok(Box::new(Cursor::new(bytes.as_ref().clone())))
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
    fn read_dir_lists_files_and_implicit_directories() {
        let fs = MemoryFileSystem::new();
        fs.insert("imports/b.csv", "x").unwrap();
        fs.insert("imports/a.jsonl", "{}").unwrap();
        fs.insert("imports/nested/c.csv", "y").unwrap();
        fs.insert("importsx/d.csv", "z").unwrap();

        let names: Vec<(String, bool)> =
            fs.read_dir("imports").unwrap().into_iter().map(|stat| (stat.name, stat.is_dir)).collect();
        assert_eq!(names, vec![
            ("a.jsonl".to_string(), false),
            ("b.csv".to_string(), false),
            ("nested".to_string(), true),
        ]);
        assert!(fs.stat("imports/nested").unwrap().is_dir);
        assert!(matches!(fs.stat("imports/missing.csv"), Err(SourceError::NotFound(_))));
    }

    #[test]
    fn open_returns_stored_bytes() {
        let fs = MemoryFileSystem::new();
        fs.insert("/a.jsonl", "{\"q\":1}\n").unwrap();
        assert_eq!(fs.read_file("a.jsonl").unwrap(), b"{\"q\":1}\n");
        assert_eq!(fs.stat("a.jsonl").unwrap().size, 8);
    }
}
