//! Radio link power rules
//!
//! The `Object` field encodes the link and both ends of the hop, e.g.
//! `1/2/3_ABC_NODE1_XYZ_NODE2`. Its first `_` segment yields `LINK`, the
//! third and fifth tokens the near-end and far-end terminal ids. A merged
//! slot range such as `1+2/3` becomes one row per slot.

use tracing::debug;

use super::stamp_identity;
use crate::error::{IngestError, Result};
use crate::identity::{self, IdentityDeriver};
use crate::record::{columns, Record};

/// Marker object of rows the collector could not reach
pub const UNREACHABLE_OBJECT: &str = "Unreachable Bulk FC";

/// `FailureDescription` value of a healthy measurement
pub const NO_FAILURE: &str = "-";

const DROPPED_COLUMNS: [&str; 3] = [columns::NODE_NAME, columns::POSITION, columns::ID_LOG_NUM];

/// Link with the slot and port one output row refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkAddress {
    pub link: String,
    pub slot: String,
    pub port: String,
}

pub fn transform(
    records: Vec<Record>,
    file_name: &str,
    deriver: &IdentityDeriver,
) -> Result<Vec<Record>> {
    let datetime_key = identity::datetime_key(file_name)?;
    let total = records.len();
    let mut normalized = Vec::with_capacity(total);

    for mut record in records.into_iter().filter(is_reportable) {
        for column in DROPPED_COLUMNS {
            record.remove(column);
        }

        let mut record = stamp_identity(&record, deriver, datetime_key)?;

        let object = record.require(columns::OBJECT)?.to_string();
        let link = derive_link(&object)?;
        let (tid, far_end_tid) = derive_terminals(&object)?;
        let addresses = link_addresses(&link)?;

        record.insert(columns::LINK, link);
        record.insert(columns::TID, tid);
        record.insert(columns::FAR_END_TID, far_end_tid);

        normalized.extend(addresses.into_iter().map(|address| {
            let mut row = record.clone();
            row.insert(columns::SLOT, address.slot);
            row.insert(columns::PORT, address.port);
            row
        }));
    }

    debug!(file = %file_name, input = total, output = normalized.len(), "Radio link rows normalized");

    Ok(normalized)
}

/// Rows worth loading: reachable and without a reported failure
fn is_reportable(record: &Record) -> bool {
    if record.get(columns::OBJECT) == Some(UNREACHABLE_OBJECT) {
        return false;
    }

    match record.get(columns::FAILURE_DESCRIPTION) {
        Some(description) => description == NO_FAILURE,
        None => true,
    }
}

/// `LINK` from the first `_` segment of `Object`
///
/// - `a/b/1.2/c` style (contains `.`): last `/` piece left of the dot and
///   first `/` piece right of it, giving `1/2`
/// - three or more `/` pieces: the second and third, `x/1/2` gives `1/2`
/// - exactly two `/` pieces: already a link and kept as is
pub fn derive_link(object: &str) -> Result<String> {
    let segment = object.split('_').next().unwrap_or_default();

    if segment.contains('.') {
        let halves: Vec<&str> = segment.split('.').collect();
        if halves.len() != 2 {
            return Err(IngestError::malformed_object(
                object,
                "link segment has more than one '.'",
            ));
        }

        let left = halves[0].rsplit('/').next().unwrap_or_default();
        let right = halves[1].split('/').next().unwrap_or_default();
        if left.is_empty() || right.is_empty() {
            return Err(IngestError::malformed_object(
                object,
                "empty slot or port around '.'",
            ));
        }

        return Ok(format!("{}/{}", left, right));
    }

    let parts: Vec<&str> = segment.split('/').collect();
    match parts.len() {
        2 => Ok(segment.to_string()),
        n if n >= 3 => Ok(format!("{}/{}", parts[1], parts[2])),
        _ => Err(IngestError::malformed_object(
            object,
            "link segment has no '/' separated slot and port",
        )),
    }
}

/// Near-end and far-end terminal ids: the third and fifth `_` tokens
pub fn derive_terminals(object: &str) -> Result<(String, String)> {
    let tokens: Vec<&str> = object.split('_').collect();
    if tokens.len() < 5 {
        return Err(IngestError::malformed_object(
            object,
            "fewer than five '_' separated tokens",
        ));
    }

    Ok((tokens[2].to_string(), tokens[4].to_string()))
}

/// Split `slot/port` into addresses, one per slot of a `a+b` range
pub fn link_addresses(link: &str) -> Result<Vec<LinkAddress>> {
    let parts: Vec<&str> = link.split('/').collect();
    let [slots, port] = parts.as_slice() else {
        return Err(IngestError::malformed_object(link, "link is not 'slot/port'"));
    };

    let slots: Vec<&str> = if slots.contains('+') {
        let range: Vec<&str> = slots.split('+').collect();
        if range.len() != 2 {
            return Err(IngestError::malformed_object(
                link,
                "slot range must join exactly two slots",
            ));
        }
        range
    } else {
        vec![*slots]
    };

    if port.is_empty() || slots.iter().any(|slot| slot.is_empty()) {
        return Err(IngestError::malformed_object(link, "empty slot or port"));
    }

    Ok(slots
        .into_iter()
        .map(|slot| LinkAddress {
            link: link.to_string(),
            slot: slot.to_string(),
            port: port.to_string(),
        })
        .collect())
}
