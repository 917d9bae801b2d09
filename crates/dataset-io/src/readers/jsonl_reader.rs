// crates/dataset-io/src/readers/jsonl_reader.rs
// ============================================================================
// Module: JSONL Reader
// Description: One-object-per-line JSON record reader.
// Purpose: Read JSON lines losslessly and resume by physical line.
// Dependencies: dataset-core, serde_json
// ============================================================================

//! ## Overview
//! Blank lines are skipped but still advance the cursor, so a cursor always
//! names a physical line. Integers decode as `i64` and never pass through
//! floating point. A line that is not a JSON object is malformed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;

use dataset_core::Record;
use dataset_core::RecordReader;
use dataset_core::RecordValue;
use dataset_core::SourceError;
use serde_json::Value;

use crate::readers::UTF8_BOM;

// ============================================================================
// SECTION: Reader
// ============================================================================

/// Streaming JSONL reader.
pub struct JsonlRecordReader {
    /// Buffered source.
    inner: BufReader<Box<dyn Read + Send>>,
    /// Reused line buffer.
    line: Vec<u8>,
    /// Physical lines consumed.
    cursor: u64,
}

impl JsonlRecordReader {
    /// Opens a reader.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Io`] when the stream cannot be read.
    pub fn new(source: Box<dyn Read + Send>) -> Result<Self, SourceError> {
        let mut inner = BufReader::new(source);
        let head = inner.fill_buf().map_err(|err| SourceError::Io(err.to_string()))?;
        if head.starts_with(UTF8_BOM) {
            inner.consume(UTF8_BOM.len());
        }
        Ok(Self {
            inner,
            line: Vec::new(),
            cursor: 0,
        })
    }

    /// Reads the next physical line into the buffer; returns false at EOF.
    fn read_line(&mut self) -> Result<bool, SourceError> {
        self.line.clear();
        let read = self.inner.read_until(b'\n', &mut self.line).map_err(|err| SourceError::Io(err.to_string()))?;
        if read == 0 {
            return Ok(false);
        }
        self.cursor += 1;
        Ok(true)
    }
}

impl RecordReader for JsonlRecordReader {
    fn next_record(&mut self) -> Result<Option<Record>, SourceError> {
        while self.read_line()? {
            let text = self.line.trim_ascii();
            if text.is_empty() {
                continue;
            }
            let value: Value = serde_json::from_slice(text)
                .map_err(|err| SourceError::Malformed(format!("line {}: {err}", self.cursor)))?;
            let Value::Object(fields) = value else {
                return Err(SourceError::Malformed(format!("line {}: expected a JSON object", self.cursor)));
            };
            return Ok(Some(fields.into_iter().map(|(name, value)| (name, RecordValue::from(value))).collect()));
        }
        Ok(None)
    }

    fn seek_to_offset(&mut self, offset: u64) -> Result<(), SourceError> {
        while self.cursor < offset {
            if !self.read_line()? {
                break;
            }
        }
        Ok(())
    }

    fn cursor(&self) -> u64 {
        self.cursor
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
