//! RF input power rules

use tracing::debug;

use super::stamp_identity;
use crate::error::{IngestError, Result};
use crate::identity::{self, IdentityDeriver};
use crate::record::{columns, Record};

/// `FarEndTID` of a port without a configured far end
pub const NO_FAR_END: &str = "----";

const DROPPED_COLUMNS: [&str; 4] = [
    columns::POSITION,
    columns::MEAN_RX_LEVEL_1M,
    columns::ID_LOG_NUM,
    columns::FAILURE_DESCRIPTION,
];

pub fn transform(
    records: Vec<Record>,
    file_name: &str,
    deriver: &IdentityDeriver,
) -> Result<Vec<Record>> {
    let datetime_key = identity::datetime_key(file_name)?;
    let total = records.len();

    let normalized = records
        .into_iter()
        .filter(|record| record.get(columns::RF_FAR_END_TID) != Some(NO_FAR_END))
        .map(|mut record| -> Result<Record> {
            for column in DROPPED_COLUMNS {
                record.remove(column);
            }

            let mut record = stamp_identity(&record, deriver, datetime_key)?;
            let (slot, port) = slot_and_port(record.require(columns::OBJECT)?)?;
            record.insert(columns::SLOT, slot);
            record.insert(columns::PORT, port);
            Ok(record)
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(file = %file_name, input = total, output = normalized.len(), "RF input rows normalized");

    Ok(normalized)
}

/// `SLOT` and `PORT` from an object such as `3.1/RX`: `("3+", "1")`
pub fn slot_and_port(object: &str) -> Result<(String, String)> {
    let mut parts = object.split('.');
    let (Some(slot), Some(rest)) = (parts.next(), parts.next()) else {
        return Err(IngestError::malformed_object(object, "no '.' between slot and port"));
    };

    let port = rest.split('/').next().unwrap_or_default();
    if slot.is_empty() || port.is_empty() {
        return Err(IngestError::malformed_object(object, "empty slot or port"));
    }

    Ok((format!("{}+", slot), port.to_string()))
}
