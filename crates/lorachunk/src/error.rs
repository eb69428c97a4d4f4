/// Error types for the transfer protocol.
///
/// Per-frame problems (`DecodeError`, `ChecksumMismatch`, `ChunkFault`) are
/// recovered inside the managers. `TransferError` is what reaches the caller.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::reassembly::MissingChunks;

/// Numeric header field of a frame, used to name the offending field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    ChunkId,
    TotalChunks,
    Checksum,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::ChunkId => write!(f, "chunk_id"),
            Field::TotalChunks => write!(f, "total_chunks"),
            Field::Checksum => write!(f, "checksum"),
        }
    }
}

/// A message that cannot be parsed as a frame. Dropped without reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("message is not valid UTF-8 text")]
    NotText,
    #[error("expected 4 fields, found {found}")]
    FieldCount { found: usize },
    #[error("{field} field is empty")]
    EmptyField { field: Field },
    #[error("{field} is not a non-negative integer: {value:?}")]
    InvalidNumber { field: Field, value: String },
    #[error("checksum {value} is outside 0-255")]
    ChecksumOutOfRange { value: u32 },
    #[error("total_chunks is zero")]
    ZeroTotalChunks,
    #[error("chunk_id {chunk_id} is not below total_chunks {total_chunks}")]
    ChunkIdOutOfRange { chunk_id: u32, total_chunks: u32 },
    #[error("data field is not valid base64: {reason}")]
    InvalidData { reason: String },
}

/// A decodable frame whose data does not match its carried checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("checksum mismatch for chunk {chunk_id}: carried {carried}, computed {computed}")]
pub struct ChecksumMismatch {
    pub chunk_id: u32,
    pub carried: u8,
    pub computed: u8,
}

/// Why a single transmission attempt of a frame did not get acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkFault {
    /// No matching acknowledgement inside the ack window.
    AckTimeout,
    /// The receiver answered with a negative acknowledgement.
    Nacked,
    /// The transport refused the frame.
    Transport(String),
}

impl fmt::Display for ChunkFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkFault::AckTimeout => write!(f, "ack timeout"),
            ChunkFault::Nacked => write!(f, "negative acknowledgement"),
            ChunkFault::Transport(e) => write!(f, "transport error: {}", e),
        }
    }
}

/// Failure reported by a `Transport` implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not open")]
    NotOpen,
    #[error("link closed by peer")]
    Closed,
    #[error("no message pending")]
    Empty,
    #[error("message of {len} bytes exceeds link limit of {max}")]
    MessageTooLong { len: usize, max: usize },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Terminal error of a transfer, surfaced to the caller.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("payload of {len} bytes needs more than u32::MAX chunks")]
    PayloadTooLarge { len: usize },
    #[error("chunk {chunk_id} not acknowledged after {attempts} attempts (last: {last_fault})")]
    RetryBudgetExhausted {
        chunk_id: u32,
        attempts: u32,
        last_fault: ChunkFault,
    },
    #[error("incomplete transfer: {received_count} of {} chunks, missing {missing}", fmt_total(.total_chunks))]
    IncompleteTransfer {
        received_count: usize,
        total_chunks: Option<u32>,
        missing: MissingChunks,
    },
    #[error("no message within idle timeout")]
    IdleTimeout,
    #[error("transfer cancelled")]
    Cancelled,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

fn fmt_total(total: &Option<u32>) -> String {
    match total {
        Some(t) => t.to_string(),
        None => "unknown".into(),
    }
}
