//! Row and file-kind types shared by the codec, transformer and sink

use indexmap::IndexMap;
use std::fmt;

use crate::error::{IngestError, Result};
use crate::sink::Table;

/// Column names read from, or written into, export rows
pub mod columns {
    // Raw export columns
    pub const OBJECT: &str = "Object";
    pub const FAILURE_DESCRIPTION: &str = "FailureDescription";
    pub const NE_ALIAS: &str = "NeAlias";
    pub const NE_TYPE: &str = "NeType";
    pub const NODE_NAME: &str = "NodeName";
    pub const POSITION: &str = "Position";
    pub const ID_LOG_NUM: &str = "IdLogNum";
    pub const MEAN_RX_LEVEL_1M: &str = "MeanRxLevel1m";
    /// RF input exports spell the far-end column this way
    pub const RF_FAR_END_TID: &str = "FarEndTID";

    // Derived columns, named the way the normalized tables expect them
    pub const NETWORK_SID: &str = "NETWORK_SID";
    pub const DATETIME_KEY: &str = "DATETIME_KEY";
    pub const LINK: &str = "LINK";
    pub const TID: &str = "TID";
    pub const FAR_END_TID: &str = "FARENDTID";
    pub const SLOT: &str = "SLOT";
    pub const PORT: &str = "PORT";
}

/// One export row: column name to raw string value, in header order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: IndexMap<String, String>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// Value of a column the caller cannot proceed without
    pub fn require(&self, column: &str) -> Result<&str> {
        self.get(column)
            .ok_or_else(|| IngestError::MissingColumn(column.to_string()))
    }

    /// Set a value. New columns are appended; existing ones keep their position.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(column.into(), value.into());
    }

    /// Remove a column, preserving the order of the remaining ones
    pub fn remove(&mut self, column: &str) -> Option<String> {
        self.fields.shift_remove(column)
    }

    /// Build a copy of this record with `leading` columns placed first.
    ///
    /// A leading column that already exists is moved to the front and takes
    /// the new value.
    pub fn with_leading<I, K, V>(&self, leading: I) -> Record
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut fields: IndexMap<String, String> = leading
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        for (column, value) in &self.fields {
            if !fields.contains_key(column) {
                fields.insert(column.clone(), value.clone());
            }
        }

        Record { fields }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True when both records carry exactly the same column names, in any order
    pub fn has_same_columns(&self, other: &Record) -> bool {
        self.len() == other.len() && self.columns().all(|c| other.contains(c))
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Record {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Export family, recognised from the file name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    RadioLinkPower,
    RfInputPower,
    Unrecognized,
}

impl RecordKind {
    /// Case-insensitive substring match on `RADIO_LINK` / `RFINPUT`
    pub fn from_file_name(file_name: &str) -> Self {
        let upper = file_name.to_ascii_uppercase();
        if upper.contains("RADIO_LINK") {
            RecordKind::RadioLinkPower
        } else if upper.contains("RFINPUT") {
            RecordKind::RfInputPower
        } else {
            RecordKind::Unrecognized
        }
    }

    /// Destination table for normalized rows of this kind
    pub fn table(self) -> Option<Table> {
        match self {
            RecordKind::RadioLinkPower => Some(Table::RadioLink),
            RecordKind::RfInputPower => Some(Table::RfInput),
            RecordKind::Unrecognized => None,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::RadioLinkPower => write!(f, "radio_link_power"),
            RecordKind::RfInputPower => write!(f, "rf_input_power"),
            RecordKind::Unrecognized => write!(f, "unrecognized"),
        }
    }
}
