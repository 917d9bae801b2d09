// crates/dataset-io/src/readers/parquet_reader.rs
// ============================================================================
// Module: Parquet Reader
// Description: Row-group streaming Parquet record reader.
// Purpose: Read columnar exports row by row and resume by row index.
// Dependencies: bytes, dataset-core, parquet
// ============================================================================

//! ## Overview
//! The file is loaded once and decoded one row group at a time. Seeking
//! skips whole row groups from footer metadata without decoding them. The
//! cursor counts rows.
//!
//! Value mapping: integer columns become [`RecordValue::Int`] (unsigned
//! values above `i64::MAX` become strings), floating columns become
//! [`RecordValue::Float`], UTF-8 byte arrays become strings, nested groups,
//! lists, and maps keep their shape, and every other logical type (dates,
//! timestamps, decimals) is rendered in its canonical text form.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::VecDeque;

use bytes::Bytes;
use dataset_core::Record;
use dataset_core::RecordReader;
use dataset_core::RecordValue;
use dataset_core::SourceError;
use parquet::errors::ParquetError;
use parquet::file::reader::FileReader;
use parquet::file::serialized_reader::SerializedFileReader;
use parquet::record::Field;
use parquet::record::Row;

// ============================================================================
// SECTION: Reader
// ============================================================================

/// Row-group streaming Parquet reader.
pub struct ParquetRecordReader {
    /// Parsed file.
    file: SerializedFileReader<Bytes>,
    /// Next row group to decode.
    next_group: usize,
    /// Decoded rows of the current row group.
    buffered: VecDeque<Record>,
    /// Rows consumed.
    cursor: u64,
}

impl ParquetRecordReader {
    /// Opens a reader over a whole file.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Malformed`] when the footer cannot be parsed.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Result<Self, SourceError> {
        let file = SerializedFileReader::new(bytes.into()).map_err(map_parquet_error)?;
        Ok(Self {
            file,
            next_group: 0,
            buffered: VecDeque::new(),
            cursor: 0,
        })
    }

    /// Returns the total row count from the footer.
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        u64::try_from(self.file.metadata().file_metadata().num_rows()).unwrap_or(0)
    }

    /// Returns the row count of a row group from the footer.
    fn group_rows(&self, index: usize) -> u64 {
        u64::try_from(self.file.metadata().row_group(index).num_rows()).unwrap_or(0)
    }

    /// Decodes the next row group into the buffer; returns false when none remain.
    fn load_next_group(&mut self) -> Result<bool, SourceError> {
        if self.next_group >= self.file.num_row_groups() {
            return Ok(false);
        }
        let group = self.file.get_row_group(self.next_group).map_err(map_parquet_error)?;
        let rows = group.get_row_iter(None).map_err(map_parquet_error)?;
        let mut decoded = Vec::new();
        for row in rows {
            let row = row.map_err(map_parquet_error)?;
            decoded.push(record_from_row(&row));
        }
        self.buffered.extend(decoded);
        self.next_group += 1;
        Ok(true)
    }
}

impl RecordReader for ParquetRecordReader {
    fn next_record(&mut self) -> Result<Option<Record>, SourceError> {
        loop {
            if let Some(record) = self.buffered.pop_front() {
                self.cursor += 1;
                return Ok(Some(record));
            }
            if !self.load_next_group()? {
                return Ok(None);
            }
        }
    }

    fn seek_to_offset(&mut self, offset: u64) -> Result<(), SourceError> {
        while self.cursor < offset {
            if self.buffered.pop_front().is_some() {
                self.cursor += 1;
                continue;
            }
            if self.next_group >= self.file.num_row_groups() {
                break;
            }
            let rows = self.group_rows(self.next_group);
            if self.cursor + rows <= offset {
                self.cursor += rows;
                self.next_group += 1;
            } else {
                self.load_next_group()?;
            }
        }
        Ok(())
    }

    fn cursor(&self) -> u64 {
        self.cursor
    }
}

// ============================================================================
// SECTION: Value Mapping
// ============================================================================

/// Converts a decoded row into a record.
fn record_from_row(row: &Row) -> Record {
    row.get_column_iter().map(|(name, field)| (name.clone(), record_value(field))).collect()
}

/// Converts one Parquet field into a record value.
fn record_value(field: &Field) -> RecordValue {
    match field {
        Field::Null => RecordValue::Null,
        Field::Bool(value) => RecordValue::Bool(*value),
        Field::Byte(value) => RecordValue::Int(i64::from(*value)),
        Field::Short(value) => RecordValue::Int(i64::from(*value)),
        Field::Int(value) => RecordValue::Int(i64::from(*value)),
        Field::Long(value) => RecordValue::Int(*value),
        Field::UByte(value) => RecordValue::Int(i64::from(*value)),
        Field::UShort(value) => RecordValue::Int(i64::from(*value)),
        Field::UInt(value) => RecordValue::Int(i64::from(*value)),
        Field::ULong(value) => {
            i64::try_from(*value).map_or_else(|_| RecordValue::String(value.to_string()), RecordValue::Int)
        }
        Field::Float(value) => RecordValue::Float(f64::from(*value)),
        Field::Double(value) => RecordValue::Float(*value),
        Field::Str(value) => RecordValue::String(value.clone()),
        Field::Bytes(value) => match value.as_utf8() {
            Ok(text) => RecordValue::String(text.to_string()),
            Err(_) => RecordValue::String(String::from_utf8_lossy(value.data()).into_owned()),
        },
        Field::Group(row) => RecordValue::Map(record_from_row(row)),
        Field::ListInternal(list) => RecordValue::List(list.elements().iter().map(record_value).collect()),
        Field::MapInternal(map) => {
            let entries: BTreeMap<String, RecordValue> =
                map.entries().iter().map(|(key, value)| (map_key(key), record_value(value))).collect();
            RecordValue::Map(entries)
        }
        other => RecordValue::String(other.to_string()),
    }
}

/// Renders a map key as text.
fn map_key(key: &Field) -> String {
    match key {
        Field::Str(value) => value.clone(),
        other => record_value(other).to_content_string(),
    }
}

/// Maps a Parquet error into a source error.
fn map_parquet_error(err: ParquetError) -> SourceError {
    match err {
        ParquetError::External(inner) => SourceError::Io(inner.to_string()),
        other => SourceError::Malformed(other.to_string()),
    }
}
