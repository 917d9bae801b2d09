// crates/dataset-io/src/readers/mod.rs
// ============================================================================
// Module: Record Readers
// Description: Format-aware readers over source byte streams.
// Purpose: Turn CSV, JSONL, and Parquet files into resumable record streams.
// Dependencies: dataset-core
// ============================================================================

//! ## Overview
//! Each reader implements [`RecordReader`](dataset_core::RecordReader).
//! Text formats tolerate a leading UTF-8 byte order mark; CSV cells that
//! are not valid UTF-8 are decoded as Windows-1252 so legacy exports still
//! import with readable text.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod csv_reader;
pub mod jsonl_reader;
pub mod parquet_reader;

pub use self::csv_reader::CsvRecordReader;
pub use self::jsonl_reader::JsonlRecordReader;
pub use self::parquet_reader::ParquetRecordReader;

// ============================================================================
// SECTION: Text Decoding
// ============================================================================

/// UTF-8 byte order mark.
pub(crate) const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Windows-1252 code points for bytes `0x80..=0x9F`.
const CP1252_HIGH: [char; 32] = [
    '\u{20AC}', '\u{81}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}', '\u{02C6}', '\u{2030}',
    '\u{0160}', '\u{2039}', '\u{0152}', '\u{8D}', '\u{017D}', '\u{8F}', '\u{90}', '\u{2018}', '\u{2019}', '\u{201C}',
    '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}', '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{9D}',
    '\u{017E}', '\u{0178}',
];

/// Decodes text as UTF-8, falling back to Windows-1252.
#[must_use]
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes
            .iter()
            .map(|byte| match byte {
                0x80 ..= 0x9F => CP1252_HIGH.get(usize::from(byte - 0x80)).copied().unwrap_or('\u{FFFD}'),
                _ => char::from(*byte),
            })
            .collect(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_utf8_falls_back_to_cp1252() {
        assert_eq!(decode_text(b"caf\xE9"), "café");
        assert_eq!(decode_text(b"\x93quoted\x94"), "\u{201C}quoted\u{201D}");
        assert_eq!(decode_text("naïve".as_bytes()), "naïve");
    }
}
