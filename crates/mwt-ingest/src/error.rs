//! Error types for the ingestion pipeline
//!
//! Every variant is terminal for the file that raised it: the monitor logs it
//! with the file name and moves on to the next export.

use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// A data line does not have as many fields as the header
    #[error("Malformed row at line {line}: expected {expected} fields, found {found}")]
    MalformedRow {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("Duplicate column '{0}' in header")]
    DuplicateHeader(String),

    /// Records handed to the encoder do not share one column set
    #[error("Schema mismatch at record {index}: expected columns [{expected}], found [{found}]")]
    SchemaMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    /// The export format has no escaping, so these values cannot be written
    #[error("Value of column '{column}' in record {index} contains a delimiter or line break")]
    UnencodableValue { index: usize, column: String },

    #[error("Malformed Object field '{object}': {reason}")]
    MalformedObjectField { object: String, reason: &'static str },

    #[error("Missing column '{0}'")]
    MissingColumn(String),

    #[error("File name '{0}' does not end with a yyyyMMdd_HHmmss timestamp")]
    InvalidTimestampInFilename(String),

    #[error("Failed to load rows into '{table}': {message}")]
    Load { table: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IngestError {
    pub fn malformed_object(object: impl Into<String>, reason: &'static str) -> Self {
        Self::MalformedObjectField {
            object: object.into(),
            reason,
        }
    }

    pub fn load(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            table: table.into(),
            message: message.into(),
        }
    }
}

impl From<mwt_common::CommonError> for IngestError {
    fn from(err: mwt_common::CommonError) -> Self {
        match err {
            mwt_common::CommonError::Io(e) => IngestError::Io(e),
        }
    }
}
