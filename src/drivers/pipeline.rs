use log::info;

use crate::config::WireFormat;
use crate::drivers::binary::{decode_binary, matches_binary_layout};
use crate::drivers::text::decode_text;
use crate::drivers::{ChannelBuffer, DecodeError, DecodedBatch};
use crate::slots::SlotTable;

/// Which decoder a datagram went through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    Text,
    Binary,
}

pub fn detect_protocol(bytes: &[u8], format: WireFormat) -> Protocol {
    match format {
        WireFormat::Text => Protocol::Text,
        WireFormat::Binary => Protocol::Binary,
        WireFormat::Auto if matches_binary_layout(bytes) => Protocol::Binary,
        WireFormat::Auto => Protocol::Text,
    }
}

pub fn decode_datagram(
    bytes: &[u8],
    protocol: Protocol,
    slots: &SlotTable,
) -> Result<DecodedBatch, DecodeError> {
    match protocol {
        Protocol::Text => decode_text(bytes, slots),
        Protocol::Binary => decode_binary(bytes),
    }
}

/// What one batch did to the table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub appended: usize,
    /// Samples addressed to FFT slots, which keep no history.
    pub skipped_fft: usize,
    /// Samples for channel indices above the per-slot ceiling.
    pub rejected: usize,
}

/// Per-(slot, channel) histories. Rows are pre-sized from declared channel
/// counts and grow on first use up to `max_channels`.
pub struct ChannelTable {
    rows: Vec<Vec<ChannelBuffer>>,
    capacities: Vec<usize>,
    max_channels: usize,
}

impl ChannelTable {
    pub fn new(slots: &SlotTable, retention_secs: f64, margin: usize, max_channels: usize) -> Self {
        let mut rows = Vec::with_capacity(slots.len());
        let mut capacities = Vec::with_capacity(slots.len());
        for slot in slots.iter() {
            let capacity = slot.buffer_capacity(retention_secs, margin);
            let preallocate = if slot.is_time_domain() {
                slot.declared_channels.min(max_channels)
            } else {
                0
            };
            info!(
                "{} max buffer size: {} points ({:.1} Hz, {} channels pre-sized)",
                slot.title, capacity, slot.effective_rate_hz, preallocate
            );
            rows.push(
                (0..preallocate)
                    .map(|_| ChannelBuffer::with_capacity(capacity))
                    .collect(),
            );
            capacities.push(capacity);
        }
        Self {
            rows,
            capacities,
            max_channels,
        }
    }

    pub fn apply(
        &mut self,
        batch: &DecodedBatch,
        slots: &SlotTable,
    ) -> Result<ApplyOutcome, DecodeError> {
        let slot = slots
            .get(batch.slot_index)
            .ok_or_else(|| DecodeError::UnknownSlot(format!("#{}", batch.slot_index)))?;
        let mut outcome = ApplyOutcome::default();
        if !slot.is_time_domain() {
            outcome.skipped_fft = batch.values.len();
            return Ok(outcome);
        }
        let capacity = self.capacities[slot.index];
        let row = &mut self.rows[slot.index];
        let samples = batch.sample_count();
        for channel in 0..batch.channel_count {
            if channel >= self.max_channels {
                outcome.rejected += samples;
                continue;
            }
            while row.len() <= channel {
                row.push(ChannelBuffer::with_capacity(capacity));
            }
            row[channel].append_many(batch.channel(channel));
            outcome.appended += samples;
        }
        Ok(outcome)
    }

    pub fn channels(&self, slot_index: usize) -> &[ChannelBuffer] {
        self.rows.get(slot_index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn channel(&self, slot_index: usize, channel: usize) -> Option<&ChannelBuffer> {
        self.channels(slot_index).get(channel)
    }

    pub fn capacity(&self, slot_index: usize) -> Option<usize> {
        self.capacities.get(slot_index).copied()
    }

    /// Total buffered samples across every channel.
    pub fn total_len(&self) -> usize {
        self.rows.iter().flatten().map(ChannelBuffer::len).sum()
    }
}
