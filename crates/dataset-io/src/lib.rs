// crates/dataset-io/src/lib.rs
// ============================================================================
// Module: Dataset IO
// Description: Source filesystems and format-aware record readers.
// Purpose: Feed import pipelines from local or in-memory file trees.
// Dependencies: dataset-core, bytes, cap-std, csv, parquet, serde_json
// ============================================================================

//! ## Overview
//! This crate implements the source seams of `dataset-core`:
//! [`FileSystem`](dataset_core::FileSystem) providers and
//! [`RecordReader`](dataset_core::RecordReader)s for CSV, JSONL, and
//! Parquet. [`FormatReaderFactory`] maps provider names to filesystems and
//! opens the reader matching a file format.
//!
//! Every reader exposes a cursor counting consumed source positions (data
//! rows for CSV and Parquet, physical lines for JSONL). Seeking to a cursor
//! taken earlier resumes at the next unread record.
//!
//! Security posture: source paths are untrusted; the local provider is
//! confined to its root directory through a capability handle and rejects
//! parent traversal.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod factory;
pub mod fs;
pub mod readers;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::factory::FormatReaderFactory;
pub use crate::fs::LocalFileSystem;
pub use crate::fs::MemoryFileSystem;
pub use crate::readers::CsvRecordReader;
pub use crate::readers::JsonlRecordReader;
pub use crate::readers::ParquetRecordReader;
