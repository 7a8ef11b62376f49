//! PostgreSQL sink
//!
//! Rows are streamed with `COPY ... FROM STDIN` in CSV mode. Columns are
//! listed by name, so a row's header order does not have to match the
//! table's column order. Empty values load as NULL.

use async_trait::async_trait;
use sqlx::postgres::PgPoolCopyExt;
use sqlx::PgPool;
use tracing::{debug, info};

use super::schema::{Table, TableSchema};
use super::Sink;
use crate::codec;
use crate::error::{IngestError, Result};
use crate::record::Record;

pub struct PgSink {
    pool: PgPool,
}

impl PgSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn copy_statement(table: Table, first: &Record) -> Result<String> {
        let schema = table.schema();
        let mut columns = Vec::with_capacity(first.len());

        for header in first.columns() {
            let column = schema.column_for(header).ok_or_else(|| {
                IngestError::load(table.name(), format!("column '{}' is not part of the table", header))
            })?;
            columns.push(format!("\"{}\"", column.name));
        }

        // Exports never quote, so pick a quote byte that cannot appear in them
        Ok(format!(
            "COPY \"{}\" ({}) FROM STDIN WITH (FORMAT csv, HEADER true, NULL '', QUOTE E'\\x01')",
            table.name(),
            columns.join(", ")
        ))
    }
}

/// Whether `table` exists in the connection's current schema
pub async fn table_exists(pool: &PgPool, table: Table) -> Result<bool> {
    let exists = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM information_schema.tables
            WHERE table_schema = current_schema() AND table_name = $1
        )
        "#,
    )
    .bind(table.name())
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

#[async_trait]
impl Sink for PgSink {
    async fn table_exists(&self, table: Table) -> Result<bool> {
        table_exists(&self.pool, table).await
    }

    async fn create_table(&self, schema: &TableSchema) -> Result<()> {
        sqlx::query(&schema.create_statement())
            .execute(&self.pool)
            .await?;

        info!(table = %schema.table, "Created table");
        Ok(())
    }

    async fn bulk_load(&self, table: Table, rows: &[Record]) -> Result<u64> {
        let Some(first) = rows.first() else {
            return Ok(0);
        };

        let statement = Self::copy_statement(table, first)?;
        let payload =
            codec::encode(rows).map_err(|e| IngestError::load(table.name(), e.to_string()))?;

        debug!(table = %table, rows = rows.len(), bytes = payload.len(), "Starting COPY");

        let mut copy = self
            .pool
            .copy_in_raw(&statement)
            .await
            .map_err(|e| IngestError::load(table.name(), e.to_string()))?;

        let sent = copy.send(payload.into_bytes()).await.map(|_| ());
        if let Err(e) = sent {
            let message = e.to_string();
            if let Err(abort_err) = copy.abort(message.clone()).await {
                debug!(error = %abort_err, "COPY abort did not complete cleanly");
            }
            return Err(IngestError::load(table.name(), message));
        }

        copy.finish()
            .await
            .map_err(|e| IngestError::load(table.name(), e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_statement_maps_headers_to_columns() {
        let row: Record = [("NETWORK_SID", "1"), ("Interval", "15"), ("SLOT", "3+")]
            .into_iter()
            .collect();
        let sql = PgSink::copy_statement(Table::RfInput, &row).unwrap();
        assert!(sql.starts_with(r#"COPY "rfinput" ("network_sid", "interval", "slot") FROM STDIN"#));
    }

    #[test]
    fn test_copy_statement_rejects_unknown_column() {
        let row: Record = [("NETWORK_SID", "1"), ("Position", "x")].into_iter().collect();
        let err = PgSink::copy_statement(Table::RadioLink, &row).unwrap_err();
        assert!(matches!(err, IngestError::Load { ref table, .. } if table == "radiolink"));
    }
}
