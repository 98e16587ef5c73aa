//! Comma-delimited text protocol.
//!
//! `name,timestamp_ms,packet_id,channel_count,reserved,v0,v1,...`
//!
//! The name selects the slot. Only the first `channel_count` values are read;
//! extra trailing fields are ignored and a short line yields fewer channels.

use std::fmt::Write as _;
use std::str::FromStr;

use crate::drivers::{DecodeError, DecodedBatch, PacketMeta};
use crate::slots::SlotTable;

pub const MIN_FIELDS: usize = 6;
const FIRST_VALUE: usize = 5;

fn parse_field<T: FromStr>(field: &'static str, raw: &str) -> Result<T, DecodeError> {
    raw.parse().map_err(|_| DecodeError::BadField {
        field,
        value: raw.to_owned(),
    })
}

pub fn decode_text(bytes: &[u8], slots: &SlotTable) -> Result<DecodedBatch, DecodeError> {
    let line = std::str::from_utf8(bytes).map_err(|_| DecodeError::NotUtf8)?;
    let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
    if fields.len() < MIN_FIELDS {
        return Err(DecodeError::TooFewFields {
            found: fields.len(),
        });
    }
    let slot_index = slots
        .lookup(fields[0])
        .ok_or_else(|| DecodeError::UnknownSlot(fields[0].to_owned()))?;
    let timestamp_ms: f64 = parse_field("timestamp_ms", fields[1])?;
    let packet_id: u64 = parse_field("packet_id", fields[2])?;
    let channel_count: usize = parse_field("channel_count", fields[3])?;
    let _reserved: f64 = parse_field("reserved", fields[4])?;

    let values = fields[FIRST_VALUE..]
        .iter()
        .take(channel_count)
        .map(|raw| parse_field::<f64>("value", raw))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DecodedBatch {
        slot_index,
        channel_count: values.len(),
        values,
        meta: PacketMeta {
            sequence: packet_id,
            timestamp: timestamp_ms / 1000.0,
        },
    })
}

/// Builds one text packet, values printed with four decimals.
pub fn encode_text(name: &str, timestamp_ms: u64, packet_id: u64, values: &[f64]) -> String {
    let mut line = format!("{name},{timestamp_ms},{packet_id},{},0", values.len());
    for v in values {
        let _ = write!(line, ",{v:.4}");
    }
    line
}
