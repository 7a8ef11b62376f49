//! MWT Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ambient utilities shared by the microwave-transport telemetry workspace.
//!
//! - **Logging**: `tracing` subscriber setup driven by environment variables
//! - **Checksums**: SHA-256 digests for identity hashing and archive ledgers
//! - **Errors**: the I/O error type these helpers return
//!
//! # Example
//!
//! ```no_run
//! use mwt_common::checksum::sha256_file;
//!
//! fn describe(path: &str) -> mwt_common::Result<()> {
//!     let digest = sha256_file(path)?;
//!     tracing::info!(%digest, "archived export");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

pub use error::{CommonError, Result};
