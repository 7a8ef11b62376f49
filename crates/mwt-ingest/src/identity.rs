//! Network element identity and file timestamp derivation
//!
//! `NETWORK_SID` identifies a network element across exports. It is the
//! SHA-256 of `NeAlias + NeType`, folded into a non-negative 63-bit integer by
//! a pluggable [`SidHasher`]. Both shipped folds are pure functions of the
//! digest text, so the same element gets the same id across restarts, hosts
//! and releases.
//!
//! `DATETIME_KEY` comes from the `yyyyMMdd_HHmmss` stamp every export carries
//! just before its four-character extension.

use chrono::NaiveDateTime;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use mwt_common::checksum::sha256_hex;

use crate::error::{IngestError, Result};
use crate::record::columns;

/// Layout of the stamp embedded in export file names
pub const FILENAME_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Rendering of `DATETIME_KEY` in normalized rows; loads straight into TIMESTAMP
pub const DATETIME_KEY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const TIMESTAMP_LEN: usize = 15;
/// The stamp starts this many bytes before the end of the name (".txt" follows it)
const TIMESTAMP_OFFSET_FROM_END: usize = 19;

const FNV1A64_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV1A64_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Folds a hex SHA-256 digest into an integer
pub trait SidHasher: Send + Sync {
    fn fold(&self, hex_digest: &str) -> u64;
}

/// FNV-1a over the digest's hex characters
#[derive(Debug, Clone, Copy, Default)]
pub struct Fnv1a;

impl SidHasher for Fnv1a {
    fn fold(&self, hex_digest: &str) -> u64 {
        hex_digest.bytes().fold(FNV1A64_OFFSET, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(FNV1A64_PRIME)
        })
    }
}

/// First eight bytes of the digest, big-endian
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestPrefix;

impl SidHasher for DigestPrefix {
    fn fold(&self, hex_digest: &str) -> u64 {
        hex_digest
            .get(..16)
            .and_then(|prefix| u64::from_str_radix(prefix, 16).ok())
            .unwrap_or_default()
    }
}

/// Configurable choice of [`SidHasher`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SidHashAlgorithm {
    #[default]
    Fnv1a,
    DigestPrefix,
}

impl FromStr for SidHashAlgorithm {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fnv1a" | "fnv" => Ok(SidHashAlgorithm::Fnv1a),
            "digest-prefix" | "prefix" => Ok(SidHashAlgorithm::DigestPrefix),
            _ => Err(IngestError::Config(format!("Unknown SID hash algorithm: {}", s))),
        }
    }
}

impl fmt::Display for SidHashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SidHashAlgorithm::Fnv1a => write!(f, "fnv1a"),
            SidHashAlgorithm::DigestPrefix => write!(f, "digest-prefix"),
        }
    }
}

/// `(NETWORK_SID, DATETIME_KEY)` for one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedIdentity {
    pub network_sid: i64,
    pub datetime_key: NaiveDateTime,
}

impl DerivedIdentity {
    /// The two leading columns of every normalized row
    pub fn columns(&self) -> [(&'static str, String); 2] {
        [
            (columns::NETWORK_SID, self.network_sid.to_string()),
            (
                columns::DATETIME_KEY,
                self.datetime_key.format(DATETIME_KEY_FORMAT).to_string(),
            ),
        ]
    }
}

/// Computes [`DerivedIdentity`] values with an injected hash fold
#[derive(Clone)]
pub struct IdentityDeriver {
    hasher: Arc<dyn SidHasher>,
}

impl IdentityDeriver {
    pub fn new(hasher: impl SidHasher + 'static) -> Self {
        Self {
            hasher: Arc::new(hasher),
        }
    }

    pub fn from_algorithm(algorithm: SidHashAlgorithm) -> Self {
        match algorithm {
            SidHashAlgorithm::Fnv1a => Self::new(Fnv1a),
            SidHashAlgorithm::DigestPrefix => Self::new(DigestPrefix),
        }
    }

    pub fn network_sid(&self, ne_alias: &str, ne_type: &str) -> i64 {
        let digest = sha256_hex(format!("{}{}", ne_alias, ne_type));
        (self.hasher.fold(&digest) & i64::MAX as u64) as i64
    }

    pub fn derive(&self, ne_alias: &str, ne_type: &str, file_name: &str) -> Result<DerivedIdentity> {
        Ok(DerivedIdentity {
            network_sid: self.network_sid(ne_alias, ne_type),
            datetime_key: datetime_key(file_name)?,
        })
    }
}

impl Default for IdentityDeriver {
    fn default() -> Self {
        Self::new(Fnv1a)
    }
}

impl fmt::Debug for IdentityDeriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityDeriver").finish_non_exhaustive()
    }
}

/// Parse the export timestamp out of a file name
///
/// `RADIO_LINK_POWER_SITE1_20240102_030405.txt` -> `2024-01-02 03:04:05`
pub fn datetime_key(file_name: &str) -> Result<NaiveDateTime> {
    let invalid = || IngestError::InvalidTimestampInFilename(file_name.to_string());

    let start = file_name
        .len()
        .checked_sub(TIMESTAMP_OFFSET_FROM_END)
        .ok_or_else(invalid)?;
    let stamp = file_name
        .get(start..start + TIMESTAMP_LEN)
        .ok_or_else(invalid)?;

    let well_formed = stamp.bytes().enumerate().all(|(i, b)| match i {
        8 => b == b'_',
        _ => b.is_ascii_digit(),
    });
    if !well_formed {
        return Err(invalid());
    }

    NaiveDateTime::parse_from_str(stamp, FILENAME_TIMESTAMP_FORMAT).map_err(|_| invalid())
}
