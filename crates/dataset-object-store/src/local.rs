// crates/dataset-object-store/src/local.rs
// ============================================================================
// Module: Local Payload Driver
// Description: Payload driver over a local directory tree.
// Purpose: Offload item payloads to disk for single-node deployments.
// Dependencies: cap-std, dataset-core, tokio
// ============================================================================

//! ## Overview
//! [`LocalPayloadDriver`] stores each payload in a file whose path mirrors
//! the key segments (`dataset:7:item:42:vn:3` becomes
//! `dataset/7/item/42/vn/3`). The root is held as a capability handle, and
//! writes go through a temporary sibling renamed into place so readers never
//! observe a partial payload. Filesystem calls run on the blocking pool.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use cap_std::ambient_authority;
use cap_std::fs::Dir;
use dataset_core::PayloadDriver;
use dataset_core::PayloadEntry;
use dataset_core::PayloadError;

use crate::error::ObjectStoreError;
use crate::key::key_path;

// ============================================================================
// SECTION: Driver
// ============================================================================

/// Payload driver rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalPayloadDriver {
    /// Root directory handle.
    root: Arc<Dir>,
    /// Root path, kept for diagnostics.
    root_path: PathBuf,
}

impl LocalPayloadDriver {
    /// Opens the driver at `root`, creating the directory when missing.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError::Io`] when the root cannot be created or
    /// opened as a directory.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, ObjectStoreError> {
        let root_path = root.as_ref().to_path_buf();
        if root_path.as_os_str().is_empty() {
            return Err(ObjectStoreError::Invalid("local payload root must be set".to_string()));
        }
        std::fs::create_dir_all(&root_path).map_err(|err| io_error(&root_path.display().to_string(), &err))?;
        let root = Dir::open_ambient_dir(&root_path, ambient_authority())
            .map_err(|err| io_error(&root_path.display().to_string(), &err))?;
        Ok(Self {
            root: Arc::new(root),
            root_path,
        })
    }

    /// Returns the root directory path.
    #[must_use]
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Runs a filesystem closure on the blocking pool.
    async fn blocking<T, F>(&self, body: F) -> Result<T, ObjectStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Dir) -> Result<T, ObjectStoreError> + Send + 'static,
    {
        let root = Arc::clone(&self.root);
        tokio::task::spawn_blocking(move || body(&root))
            .await
            .map_err(|err| ObjectStoreError::Io(format!("payload task failed: {err}")))?
    }
}

#[async_trait]
impl PayloadDriver for LocalPayloadDriver {
    async fn mset_item_data(&self, entries: &[PayloadEntry]) -> Result<(), PayloadError> {
        let mut writes = Vec::with_capacity(entries.len());
        for entry in entries {
            writes.push((key_path(&entry.key)?, entry.bytes.clone()));
        }
        self.blocking(move |root| {
            for (path, bytes) in &writes {
                write_file(root, path, bytes)?;
            }
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn mget_item_data(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, PayloadError> {
        let paths = keys.iter().map(|key| key_path(key)).collect::<Result<Vec<_>, _>>()?;
        let values = self
            .blocking(move |root| paths.iter().map(|path| read_file(root, path)).collect::<Result<Vec<_>, _>>())
            .await?;
        Ok(values)
    }

    async fn delete_item_data(&self, keys: &[String]) -> Result<(), PayloadError> {
        let paths = keys.iter().map(|key| key_path(key)).collect::<Result<Vec<_>, _>>()?;
        self.blocking(move |root| {
            for path in &paths {
                match root.remove_file(path) {
                    Ok(()) => {}
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => return Err(io_error(&path.display().to_string(), &err)),
                }
            }
            Ok(())
        })
        .await?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Writes `bytes` to `path` through a temporary sibling.
fn write_file(root: &Dir, path: &Path, bytes: &[u8]) -> Result<(), ObjectStoreError> {
    let display = path.display().to_string();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        root.create_dir_all(parent).map_err(|err| io_error(&display, &err))?;
    }
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);
    root.write(&staging, bytes).map_err(|err| io_error(&display, &err))?;
    root.rename(&staging, root, path).map_err(|err| io_error(&display, &err))
}

/// Reads `path`, returning `None` when it does not exist.
fn read_file(root: &Dir, path: &Path) -> Result<Option<Vec<u8>>, ObjectStoreError> {
    match root.read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_error(&path.display().to_string(), &err)),
    }
}

/// Builds an I/O error naming the path.
fn io_error(path: &str, err: &io::Error) -> ObjectStoreError {
    ObjectStoreError::Io(format!("{path}: {err}"))
}
