//! Bulk-load destination for normalized rows
//!
//! The pipeline only needs three things from storage: does a table exist,
//! create it from its fixed schema, and load a batch of uniform rows into it.

pub mod postgres;
pub mod schema;

use async_trait::async_trait;

use crate::error::Result;
use crate::record::Record;

pub use postgres::PgSink;
pub use schema::{Column, Table, TableSchema};

/// Storage adapter the monitor hands normalized rows to
#[async_trait]
pub trait Sink: Send + Sync {
    async fn table_exists(&self, table: Table) -> Result<bool>;

    async fn create_table(&self, schema: &TableSchema) -> Result<()>;

    /// Load all rows or none; returns the number of rows stored
    ///
    /// Fails with `IngestError::Load` on rows the table cannot accept or when
    /// the connection is lost.
    async fn bulk_load(&self, table: Table, rows: &[Record]) -> Result<u64>;
}

/// Create `table` if it does not exist yet. Returns true when it was created.
pub async fn ensure_table(sink: &dyn Sink, table: Table) -> Result<bool> {
    if sink.table_exists(table).await? {
        return Ok(false);
    }

    tracing::info!(table = %table, "Table does not exist, creating it");
    sink.create_table(&table.schema()).await?;
    Ok(true)
}
