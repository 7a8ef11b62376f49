//! MWT Ingest Library
//!
//! Loads microwave transport performance exports into PostgreSQL.
//!
//! A collector drops radio link and RF input power exports into an inbox
//! directory. Each new file is archived (the archive doubles as the record of
//! what was already ingested), normalized into the table layout, bulk-loaded,
//! and followed by a refresh of the hourly and daily slot aggregates.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mwt_ingest::{aggregate::PgAggregator, config::Config, db, monitor::DirectoryMonitor, sink::PgSink};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let pool = db::create_pool(&config.database).await?;
//!     let monitor = DirectoryMonitor::new(
//!         &config.inbox,
//!         Arc::new(PgSink::new(pool.clone())),
//!         Arc::new(PgAggregator::new(pool)),
//!     )?;
//!
//!     let (_stop, shutdown) = tokio::sync::watch::channel(false);
//!     monitor.run(shutdown).await?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod aggregate;
pub mod archive;
pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod monitor;
pub mod record;
pub mod sink;
pub mod transform;

pub use error::{IngestError, Result};
pub use identity::{DerivedIdentity, IdentityDeriver, SidHashAlgorithm, SidHasher};
pub use monitor::{DirectoryMonitor, FileOutcome};
pub use record::{Record, RecordKind};
