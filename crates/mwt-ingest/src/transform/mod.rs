//! Kind-specific normalization of decoded export rows
//!
//! Each rule set takes ownership of the decoded rows and returns a new
//! sequence: rows may be dropped, have columns removed, gain derived columns,
//! or (radio links with a merged slot range) be split in two. Nothing is
//! mutated in place while it is being iterated, and any failing row fails the
//! whole file so a partially transformed batch is never loaded.

pub mod radio_link;
pub mod rf_input;

use chrono::NaiveDateTime;

use crate::codec;
use crate::error::Result;
use crate::identity::{DerivedIdentity, IdentityDeriver};
use crate::record::{columns, Record, RecordKind};

pub use radio_link::LinkAddress;

/// Decode the text of export `file_name` and apply its kind's rules
pub fn normalize(file_name: &str, text: &str, deriver: &IdentityDeriver) -> Result<Vec<Record>> {
    let kind = RecordKind::from_file_name(file_name);
    let records = codec::decode(text)?;
    transform(kind, records, file_name, deriver)
}

/// Apply the rule set for `kind`. Unrecognized rows pass through untouched.
pub fn transform(
    kind: RecordKind,
    records: Vec<Record>,
    file_name: &str,
    deriver: &IdentityDeriver,
) -> Result<Vec<Record>> {
    match kind {
        RecordKind::RadioLinkPower => radio_link::transform(records, file_name, deriver),
        RecordKind::RfInputPower => rf_input::transform(records, file_name, deriver),
        RecordKind::Unrecognized => Ok(records),
    }
}

/// Copy of `record` led by `NETWORK_SID` and `DATETIME_KEY`
fn stamp_identity(
    record: &Record,
    deriver: &IdentityDeriver,
    datetime_key: NaiveDateTime,
) -> Result<Record> {
    let identity = DerivedIdentity {
        network_sid: deriver.network_sid(
            record.require(columns::NE_ALIAS)?,
            record.require(columns::NE_TYPE)?,
        ),
        datetime_key,
    };

    Ok(record.with_leading(identity.columns()))
}
