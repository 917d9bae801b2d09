// crates/dataset-io/src/readers/csv_reader.rs
// ============================================================================
// Module: CSV Reader
// Description: Header-keyed CSV record reader.
// Purpose: Read delimited exports leniently and resume by data row.
// Dependencies: csv, dataset-core
// ============================================================================

//! ## Overview
//! The first row names the columns. Quoting is lenient: stray quotes inside
//! unquoted cells are kept as text and rows may be shorter or longer than
//! the header. Cells beyond the header are dropped; missing trailing cells
//! are absent from the record. The cursor counts data rows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;

use csv::ByteRecord;
use csv::Reader;
use csv::ReaderBuilder;
use dataset_core::Record;
use dataset_core::RecordReader;
use dataset_core::RecordValue;
use dataset_core::SourceError;

use crate::readers::UTF8_BOM;
use crate::readers::decode_text;

// ============================================================================
// SECTION: Reader
// ============================================================================

/// Streaming CSV reader.
pub struct CsvRecordReader {
    /// Underlying parser.
    inner: Reader<BufReader<Box<dyn Read + Send>>>,
    /// Column names from the header row.
    headers: Vec<String>,
    /// Reused row buffer.
    row: ByteRecord,
    /// Data rows consumed.
    cursor: u64,
}

impl CsvRecordReader {
    /// Opens a reader and consumes the header row.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Malformed`] when the header cannot be parsed
    /// and [`SourceError::Io`] when the stream fails.
    pub fn new(source: Box<dyn Read + Send>) -> Result<Self, SourceError> {
        Self::with_delimiter(source, b',')
    }

    /// Opens a reader with a custom delimiter.
    ///
    /// # Errors
    ///
    /// Same as [`CsvRecordReader::new`].
    pub fn with_delimiter(source: Box<dyn Read + Send>, delimiter: u8) -> Result<Self, SourceError> {
        let mut buffered = BufReader::new(source);
        let head = buffered.fill_buf().map_err(|err| SourceError::Io(err.to_string()))?;
        if head.starts_with(UTF8_BOM) {
            buffered.consume(UTF8_BOM.len());
        }
        let mut inner = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .double_quote(true)
            .from_reader(buffered);
        let mut header = ByteRecord::new();
        let headers = if inner.read_byte_record(&mut header).map_err(map_csv_error)? {
            header.iter().map(|cell| decode_text(cell).trim().to_string()).collect()
        } else {
            Vec::new()
        };
        Ok(Self {
            inner,
            headers,
            row: ByteRecord::new(),
            cursor: 0,
        })
    }

    /// Returns the header column names.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Reads the next raw row; returns false at end of file.
    fn read_row(&mut self) -> Result<bool, SourceError> {
        if self.headers.is_empty() {
            return Ok(false);
        }
        let more = self.inner.read_byte_record(&mut self.row).map_err(map_csv_error)?;
        if more {
            self.cursor += 1;
        }
        Ok(more)
    }
}

impl RecordReader for CsvRecordReader {
    fn next_record(&mut self) -> Result<Option<Record>, SourceError> {
        if !self.read_row()? {
            return Ok(None);
        }
        let record: Record = self
            .headers
            .iter()
            .zip(self.row.iter())
            .filter(|(name, _)| !name.is_empty())
            .map(|(name, cell)| (name.clone(), RecordValue::String(decode_text(cell))))
            .collect();
        Ok(Some(record))
    }

    fn seek_to_offset(&mut self, offset: u64) -> Result<(), SourceError> {
        while self.cursor < offset {
            if !self.read_row()? {
                break;
            }
        }
        Ok(())
    }

    fn cursor(&self) -> u64 {
        self.cursor
    }
}

/// Maps a parser error into a source error.
fn map_csv_error(err: csv::Error) -> SourceError {
    if err.is_io_error() {
        return SourceError::Io(err.to_string());
    }
    SourceError::Malformed(err.to_string())
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

    use std::io::Cursor;

    use super::*;

    fn reader(text: &[u8]) -> CsvRecordReader {
        CsvRecordReader::new(Box::new(Cursor::new(text.to_vec()))).unwrap()
    }

    fn cell(record: &Record, name: &str) -> String {
        record.get(name).map(RecordValue::to_content_string).unwrap()
    }

    #[test]
    fn bom_is_skipped_and_headers_are_trimmed() {
        let mut reader = reader(b"\xEF\xBB\xBFquestion, answer\nhi,there\n");
        assert_eq!(reader.headers(), ["question", "answer"]);
        let record = reader.next_record().unwrap().unwrap();
        assert_eq!(cell(&record, "question"), "hi");
        assert_eq!(cell(&record, "answer"), "there");
        assert!(reader.next_record().unwrap().is_none());
        assert_eq!(reader.cursor(), 1);
    }

    #[test]
    fn lenient_quotes_and_ragged_rows() {
        let mut reader = reader(b"a,b\nsay \"hi\",x\n\"multi\nline\"\n1,2,3\n");
        let first = reader.next_record().unwrap().unwrap();
        assert_eq!(cell(&first, "a"), "say \"hi\"");
        let second = reader.next_record().unwrap().unwrap();
        assert_eq!(cell(&second, "a"), "multi\nline");
        assert!(!second.contains_key("b"));
        let third = reader.next_record().unwrap().unwrap();
        assert_eq!(third.len(), 2);
    }

    #[test]
    fn seek_resumes_after_committed_rows() {
        let mut reader = reader(b"n\n0\n1\n2\n3\n");
        reader.seek_to_offset(2).unwrap();
        assert_eq!(reader.cursor(), 2);
        let record = reader.next_record().unwrap().unwrap();
        assert_eq!(cell(&record, "n"), "2");
        reader.seek_to_offset(100).unwrap();
        assert_eq!(reader.cursor(), 4);
    }

    #[test]
    fn empty_file_has_no_records() {
        let mut reader = reader(b"");
        assert!(reader.next_record().unwrap().is_none());
        assert_eq!(reader.cursor(), 0);
    }
}
