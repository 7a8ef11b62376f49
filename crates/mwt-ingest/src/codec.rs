//! Comma-delimited export codec
//!
//! Exports are plain comma-separated text: a header line followed by one
//! line per row. The exporter never quotes or escapes, so neither does this
//! codec. A `"` is an ordinary character, and a value containing a comma or
//! a line break cannot be represented at all.
//!
//! Field-count mismatches are rejected instead of being re-aligned.

use std::io;

use crate::error::{IngestError, Result};
use crate::record::Record;

/// Parse export text into records keyed by the header line
pub fn decode(text: &str) -> Result<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .quoting(false)
        .flexible(false)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    for (i, column) in headers.iter().enumerate() {
        if headers.iter().take(i).any(|earlier| earlier == column) {
            return Err(IngestError::DuplicateHeader(column.to_string()));
        }
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(malformed_row)?;
        records.push(headers.iter().zip(row.iter()).collect());
    }

    Ok(records)
}

/// Serialize records, taking the header from the first record's column order
///
/// Every record must carry the same column set as the first one.
pub fn encode(records: &[Record]) -> Result<String> {
    let Some(first) = records.first() else {
        return Ok(String::new());
    };
    let header: Vec<&str> = first.columns().collect();

    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Never)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(&header)?;

    for (index, record) in records.iter().enumerate() {
        if !record.has_same_columns(first) {
            return Err(IngestError::SchemaMismatch {
                index,
                expected: header.join(","),
                found: record.columns().collect::<Vec<_>>().join(","),
            });
        }

        let mut row = Vec::with_capacity(header.len());
        for column in &header {
            let value = record.get(column).unwrap_or_default();
            if value.contains([',', '\n', '\r']) {
                return Err(IngestError::UnencodableValue {
                    index,
                    column: column.to_string(),
                });
            }
            row.push(value);
        }
        writer.write_record(&row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| IngestError::Io(e.into_error()))?;

    String::from_utf8(bytes)
        .map_err(|e| IngestError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
}

fn malformed_row(err: csv::Error) -> IngestError {
    match err.kind() {
        csv::ErrorKind::UnequalLengths {
            pos,
            expected_len,
            len,
        } => IngestError::MalformedRow {
            line: pos.as_ref().map(|p| p.line()).unwrap_or_default(),
            expected: *expected_len as usize,
            found: *len as usize,
        },
        _ => IngestError::Csv(err),
    }
}
