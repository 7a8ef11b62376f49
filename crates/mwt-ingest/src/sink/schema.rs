//! Fixed table schemas owned by the sink
//!
//! Column names are lowercase; header names from export rows are matched
//! against them case-insensitively.

use std::fmt;

/// A destination table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    RadioLink,
    RfInput,
    AggSlotHourly,
    AggSlotDaily,
}

impl Table {
    pub const fn name(self) -> &'static str {
        match self {
            Table::RadioLink => "radiolink",
            Table::RfInput => "rfinput",
            Table::AggSlotHourly => "trans_mw_agg_slot_hourly",
            Table::AggSlotDaily => "trans_mw_agg_slot_daily",
        }
    }

    pub fn schema(self) -> TableSchema {
        let columns = match self {
            Table::RadioLink => RADIO_LINK_COLUMNS,
            Table::RfInput => RF_INPUT_COLUMNS,
            Table::AggSlotHourly | Table::AggSlotDaily => AGGREGATE_COLUMNS,
        };
        TableSchema {
            table: self,
            columns,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static str,
}

const fn col(name: &'static str, sql_type: &'static str) -> Column {
    Column { name, sql_type }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub table: Table,
    pub columns: &'static [Column],
}

impl TableSchema {
    pub fn name(&self) -> &'static str {
        self.table.name()
    }

    /// Table column for a row header, ignoring case
    pub fn column_for(&self, header: &str) -> Option<&'static Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(header))
    }

    /// `CREATE TABLE` statement; identifiers are quoted because `time` and
    /// `interval` are keywords
    pub fn create_statement(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| format!("\"{}\" {}", c.name, c.sql_type))
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE IF NOT EXISTS \"{}\" ({})", self.name(), columns)
    }
}

const RADIO_LINK_COLUMNS: &[Column] = &[
    col("network_sid", "BIGINT"),
    col("datetime_key", "TIMESTAMP"),
    col("neid", "FLOAT"),
    col("object", "VARCHAR(255)"),
    col("time", "TIMESTAMP"),
    col("interval", "INT"),
    col("direction", "VARCHAR(255)"),
    col("nealias", "VARCHAR(255)"),
    col("netype", "VARCHAR(255)"),
    col("rxlevelbelowts1", "INT"),
    col("rxlevelbelowts2", "INT"),
    col("minrxlevel", "FLOAT"),
    col("maxrxlevel", "FLOAT"),
    col("txlevelabovets1", "INT"),
    col("mintxlevel", "FLOAT"),
    col("maxtxlevel", "FLOAT"),
    col("failuredescription", "VARCHAR(255)"),
    col("link", "VARCHAR(255)"),
    col("tid", "VARCHAR(255)"),
    col("farendtid", "VARCHAR(255)"),
    col("slot", "INT"),
    col("port", "INT"),
];

// RF input slots carry a trailing '+', so SLOT stays textual here
const RF_INPUT_COLUMNS: &[Column] = &[
    col("network_sid", "BIGINT"),
    col("datetime_key", "TIMESTAMP"),
    col("nodename", "VARCHAR(255)"),
    col("neid", "INT"),
    col("object", "VARCHAR(255)"),
    col("time", "TIMESTAMP"),
    col("interval", "INT"),
    col("direction", "VARCHAR(255)"),
    col("nealias", "VARCHAR(255)"),
    col("netype", "VARCHAR(255)"),
    col("rfinputpower", "FLOAT"),
    col("tid", "VARCHAR(255)"),
    col("farendtid", "VARCHAR(255)"),
    col("slot", "VARCHAR(255)"),
    col("port", "INT"),
];

const AGGREGATE_COLUMNS: &[Column] = &[
    col("time", "TIMESTAMP"),
    col("nealias", "VARCHAR(30)"),
    col("netype", "VARCHAR(30)"),
    col("datetime_key", "TIMESTAMP"),
    col("network_sid", "BIGINT"),
    col("rsl_input_power", "FLOAT"),
    col("maxrxlevel", "FLOAT"),
    col("rsl_deviation", "FLOAT"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let schema = Table::RadioLink.schema();
        assert_eq!(schema.column_for("NETWORK_SID").map(|c| c.name), Some("network_sid"));
        assert_eq!(schema.column_for("FarEndTid").map(|c| c.name), Some("farendtid"));
        assert!(schema.column_for("NodeName").is_none());
        assert!(Table::RfInput.schema().column_for("NodeName").is_some());
    }

    #[test]
    fn test_create_statement_quotes_keywords() {
        let sql = Table::RfInput.schema().create_statement();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"rfinput\" (\"network_sid\" BIGINT"));
        assert!(sql.contains("\"interval\" INT"));
        assert!(sql.contains("\"slot\" VARCHAR(255)"));
    }
}
