// crates/dataset-io/src/factory.rs
// ============================================================================
// Module: Reader Factory
// Description: Provider registry that opens format-aware readers.
// Purpose: Resolve a provider name and file format to a record reader.
// Dependencies: dataset-core
// ============================================================================

//! ## Overview
//! [`FormatReaderFactory`] owns one [`FileSystem`] per provider name.
//! Parquet files are loaded whole because their footer sits at the end;
//! a size cap bounds that load.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use dataset_core::FileFormat;
use dataset_core::FileSystem;
use dataset_core::RecordReader;
use dataset_core::RecordReaderFactory;
use dataset_core::SourceError;

use crate::readers::CsvRecordReader;
use crate::readers::JsonlRecordReader;
use crate::readers::ParquetRecordReader;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default upper bound on a Parquet file loaded into memory.
pub const DEFAULT_MAX_PARQUET_BYTES: u64 = 1024 * 1024 * 1024;

// ============================================================================
// SECTION: Factory
// ============================================================================

/// Opens readers over registered filesystem providers.
#[derive(Clone)]
pub struct FormatReaderFactory {
    /// Filesystems by provider name.
    providers: BTreeMap<String, Arc<dyn FileSystem>>,
    /// Largest Parquet file accepted.
    max_parquet_bytes: u64,
}

impl Default for FormatReaderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatReaderFactory {
    /// Creates a factory without providers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: BTreeMap::new(),
            max_parquet_bytes: DEFAULT_MAX_PARQUET_BYTES,
        }
    }

    /// Registers `file_system` under `provider`, replacing any previous one.
    #[must_use]
    pub fn with_provider(mut self, provider: &str, file_system: Arc<dyn FileSystem>) -> Self {
        self.providers.insert(provider.to_string(), file_system);
        self
    }

    /// Sets the Parquet size cap.
    #[must_use]
    pub fn with_max_parquet_bytes(mut self, max_parquet_bytes: u64) -> Self {
        self.max_parquet_bytes = max_parquet_bytes;
        self
    }

    /// Returns the registered provider names.
    #[must_use]
    pub fn providers(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}

impl RecordReaderFactory for FormatReaderFactory {
    fn open_reader(&self, provider: &str, path: &str, format: FileFormat) -> Result<Box<dyn RecordReader>, SourceError> {
        let file_system = self.file_system(provider)?;
        match format {
            FileFormat::Csv => Ok(Box::new(CsvRecordReader::new(file_system.open(path)?)?)),
            FileFormat::Jsonl => Ok(Box::new(JsonlRecordReader::new(file_system.open(path)?)?)),
            FileFormat::Parquet => {
                let stat = file_system.stat(path)?;
                if stat.size > self.max_parquet_bytes {
                    return Err(SourceError::Unsupported(format!(
                        "{path} is {} bytes, above the {} byte parquet limit",
                        stat.size, self.max_parquet_bytes
                    )));
                }
                Ok(Box::new(ParquetRecordReader::from_bytes(file_system.read_file(path)?)?))
            }
        }
    }

    fn file_system(&self, provider: &str) -> Result<&dyn FileSystem, SourceError> {
        self.providers
            .get(provider)
            .map(|file_system| &**file_system)
            .ok_or_else(|| SourceError::Unsupported(format!("unknown file provider {provider:?}")))
    }
}
