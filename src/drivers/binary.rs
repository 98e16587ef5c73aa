//! Compact binary protocol, all fields big-endian.
//!
//! ```text
//! u32 seq_id | f64 timestamp | u16 samples (S) | u16 channels (C) | S*C x u32 code
//! ```
//!
//! Codes are sample-major. Only the low 24 bits carry the offset-binary ADC
//! reading; the top byte is a transport artifact. The stream has no slot id,
//! so every batch lands in slot 0.

use crate::drivers::{DecodeError, DecodedBatch, PacketMeta};

pub const HEADER_LEN: usize = 16;
pub const CODE_LEN: usize = 4;
pub const CODE_MASK: u32 = 0x00FF_FFFF;
pub const CODE_MIDSCALE: u32 = 0x0080_0000;
pub const FULL_SCALE_VOLTS: f64 = 10.0;
pub const BINARY_SLOT: usize = 0;

/// Size of one code step in volts (20 V over 2^24 codes).
pub const VOLTS_PER_CODE: f64 = 2.0 * FULL_SCALE_VOLTS / (1u32 << 24) as f64;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BinaryHeader {
    pub seq_id: u32,
    pub timestamp: f64,
    pub sample_count: u16,
    pub channel_count: u16,
}

fn be_u16(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

fn be_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

impl BinaryHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_LEN {
            return Err(DecodeError::TruncatedHeader { len: bytes.len() });
        }
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&bytes[4..12]);
        Ok(Self {
            seq_id: be_u32(&bytes[0..4]),
            timestamp: f64::from_be_bytes(ts),
            sample_count: be_u16(&bytes[12..14]),
            channel_count: be_u16(&bytes[14..16]),
        })
    }

    pub fn code_count(&self) -> usize {
        usize::from(self.sample_count) * usize::from(self.channel_count)
    }

    pub fn payload_len(&self) -> usize {
        self.code_count() * CODE_LEN
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.seq_id.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.sample_count.to_be_bytes());
        out.extend_from_slice(&self.channel_count.to_be_bytes());
    }
}

/// Offset-binary code to volts: 0x000000 -> -10 V, 0x800000 -> 0 V, 0xFFFFFF -> just under +10 V.
pub fn code_to_volts(code: u32) -> f64 {
    let code = code & CODE_MASK;
    (f64::from(code) - f64::from(CODE_MIDSCALE)) / f64::from(CODE_MIDSCALE) * FULL_SCALE_VOLTS
}

/// Nearest code for `volts`, clamped to the 24-bit range.
pub fn volts_to_code(volts: f64) -> u32 {
    let code = (volts / FULL_SCALE_VOLTS * f64::from(CODE_MIDSCALE) + f64::from(CODE_MIDSCALE)).round();
    code.clamp(0.0, f64::from(CODE_MASK)) as u32
}

/// True when the datagram length agrees with its own binary header.
pub fn matches_binary_layout(bytes: &[u8]) -> bool {
    BinaryHeader::parse(bytes)
        .map(|h| bytes.len() == HEADER_LEN + h.payload_len())
        .unwrap_or(false)
}

pub fn decode_binary(bytes: &[u8]) -> Result<DecodedBatch, DecodeError> {
    let header = BinaryHeader::parse(bytes)?;
    let payload = &bytes[HEADER_LEN..];
    let expected = header.payload_len();
    if payload.len() != expected {
        return Err(DecodeError::PayloadLength {
            expected,
            actual: payload.len(),
        });
    }
    let values = payload
        .chunks_exact(CODE_LEN)
        .map(|chunk| code_to_volts(be_u32(chunk)))
        .collect();
    Ok(DecodedBatch {
        slot_index: BINARY_SLOT,
        channel_count: usize::from(header.channel_count),
        values,
        meta: PacketMeta {
            sequence: u64::from(header.seq_id),
            timestamp: header.timestamp,
        },
    })
}

/// Serializes a batch; `codes` must hold `sample_count * channel_count` entries.
pub fn encode_binary(header: &BinaryHeader, codes: &[u32]) -> Vec<u8> {
    debug_assert_eq!(codes.len(), header.code_count());
    let mut out = Vec::with_capacity(HEADER_LEN + codes.len() * CODE_LEN);
    header.write_to(&mut out);
    for code in codes {
        out.extend_from_slice(&code.to_be_bytes());
    }
    out
}
