use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Why a single datagram was rejected. Never fatal to the pipeline.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("datagram is not valid UTF-8 text")]
    NotUtf8,
    #[error("text packet has {found} fields, need at least 6")]
    TooFewFields { found: usize },
    #[error("unknown slot reference `{0}`")]
    UnknownSlot(String),
    #[error("field `{field}` is not numeric: {value:?}")]
    BadField { field: &'static str, value: String },
    #[error("binary header truncated: {len} bytes, need 16")]
    TruncatedHeader { len: usize },
    #[error("binary payload length mismatch: expected {expected}, got {actual}")]
    PayloadLength { expected: usize, actual: usize },
}

impl DecodeError {
    /// Unknown slot names are counted separately from malformed packets.
    pub fn is_unknown_slot(&self) -> bool {
        matches!(self, DecodeError::UnknownSlot(_))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("settings file {path} not found")]
    Missing { path: PathBuf },
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("settings file {path} declares no active channels")]
    NoActiveSlots { path: PathBuf },
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("invalid monitor settings: {0}")]
    InvalidSettings(String),
    #[error("socket failure: {0}")]
    Socket(#[from] io::Error),
    #[error("ingest worker panicked")]
    WorkerPanicked,
    #[error("intake queue disconnected; ingest worker is gone")]
    IntakeClosed,
}
