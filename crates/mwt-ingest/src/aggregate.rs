//! Hourly and daily slot aggregates
//!
//! Recomputed from scratch after every load: both aggregate tables are
//! truncated and refilled from the join of the two normalized tables on
//! `network_sid`. Calling it twice in a row gives the same result.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::error::Result;
use crate::sink::postgres::table_exists;
use crate::sink::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOutcome {
    Refreshed,
    /// One of the normalized tables has not been created yet
    SkippedMissingSources,
}

#[async_trait]
pub trait Aggregator: Send + Sync {
    async fn aggregate(&self) -> Result<AggregateOutcome>;
}

pub struct PgAggregator {
    pool: PgPool,
}

impl PgAggregator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn refresh_statement(target: Table, bucket: &str) -> String {
    format!(
        r#"
        INSERT INTO "{target}"
        SELECT date_trunc('{bucket}', rp."time") AS "time",
               rf."nealias",
               rf."netype",
               rf."datetime_key",
               rf."network_sid",
               MAX(rf."rfinputpower") AS rsl_input_power,
               MAX(rp."maxrxlevel") AS maxrxlevel,
               ABS(MAX(rf."rfinputpower")) - ABS(MAX(rp."maxrxlevel")) AS rsl_deviation
        FROM "{rf}" rf
        INNER JOIN "{rp}" rp ON rf."network_sid" = rp."network_sid"
        GROUP BY 1, 2, 3, 4, 5
        "#,
        target = target.name(),
        bucket = bucket,
        rf = Table::RfInput.name(),
        rp = Table::RadioLink.name(),
    )
}

#[async_trait]
impl Aggregator for PgAggregator {
    async fn aggregate(&self) -> Result<AggregateOutcome> {
        let rf_ready = table_exists(&self.pool, Table::RfInput).await?;
        let rp_ready = table_exists(&self.pool, Table::RadioLink).await?;

        if !(rf_ready && rp_ready) {
            warn!(
                rfinput = rf_ready,
                radiolink = rp_ready,
                "Not all normalized tables exist yet, skipping aggregation"
            );
            return Ok(AggregateOutcome::SkippedMissingSources);
        }

        let mut tx = self.pool.begin().await?;

        for (target, bucket) in [(Table::AggSlotHourly, "hour"), (Table::AggSlotDaily, "day")] {
            sqlx::query(&target.schema().create_statement())
                .execute(&mut *tx)
                .await?;
            sqlx::query(&format!("TRUNCATE TABLE \"{}\"", target.name()))
                .execute(&mut *tx)
                .await?;
            let inserted = sqlx::query(&refresh_statement(target, bucket))
                .execute(&mut *tx)
                .await?
                .rows_affected();

            info!(table = %target, rows = inserted, "Aggregate refreshed");
        }

        tx.commit().await?;

        Ok(AggregateOutcome::Refreshed)
    }
}
