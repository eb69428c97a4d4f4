/// Transfer logging trait for structured protocol events.
///
/// Sender and receiver report every state change through a `TransferLogger`
/// so deployments can route them to tracing, a test recorder, or nowhere.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::reassembly::MissingChunks;

/// Structured log entry for a transfer operation.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferLog {
    pub component: &'static str,
    pub event: TransferEvent,
}

/// Transfer events that can be logged.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// Sender: payload split into frames
    Fragmented {
        payload_len: usize,
        total_chunks: u32,
        chunk_size: usize,
    },
    /// Sender: frame put on the link
    FrameSent {
        chunk_id: u32,
        attempt: u32,
        len: usize,
    },
    /// Sender: positive acknowledgement matched
    Acked { chunk_id: u32, attempt: u32 },
    /// Sender: attempt failed, frame will be sent again
    Retrying {
        chunk_id: u32,
        attempt: u32,
        max_retries: u32,
        reason: String,
    },
    /// Sender: retry budget spent, transfer aborted
    ChunkFailed { chunk_id: u32, attempts: u32 },
    /// Sender: end-of-transfer sentinel transmitted
    SentinelSent { total_chunks: u32 },
    /// Receiver: frame validated and stored
    FrameStored {
        chunk_id: u32,
        total_chunks: u32,
        duplicate: bool,
    },
    /// Receiver: frame failed validation, ERR sent
    FrameRejected { chunk_id: u32, reason: String },
    /// Receiver: message did not decode, dropped
    MalformedDropped { len: usize, reason: String },
    /// Receiver: acknowledgement could not be transmitted
    AckSendFailed { chunk_id: u32, error: String },
    /// Receiver: sentinel arrived with every chunk present
    TransferComplete { total_bytes: usize, total_chunks: u32 },
    /// Receiver: sentinel arrived with chunks missing
    TransferIncomplete {
        received_count: usize,
        total_chunks: Option<u32>,
        missing: MissingChunks,
    },
    /// Either side: cancelled while waiting
    Cancelled,
}

impl fmt::Display for TransferEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fragmented { payload_len, total_chunks, chunk_size } => {
                write!(f, "fragmented bytes={} chunks={} chunk_size={}", payload_len, total_chunks, chunk_size)
            }
            Self::FrameSent { chunk_id, attempt, len } => {
                write!(f, "frame_sent id={} attempt={} len={}", chunk_id, attempt, len)
            }
            Self::Acked { chunk_id, attempt } => {
                write!(f, "acked id={} attempt={}", chunk_id, attempt)
            }
            Self::Retrying { chunk_id, attempt, max_retries, reason } => {
                write!(f, "retrying id={} attempt={}/{} reason={}", chunk_id, attempt, max_retries, reason)
            }
            Self::ChunkFailed { chunk_id, attempts } => {
                write!(f, "chunk_failed id={} attempts={}", chunk_id, attempts)
            }
            Self::SentinelSent { total_chunks } => {
                write!(f, "sentinel_sent chunks={}", total_chunks)
            }
            Self::FrameStored { chunk_id, total_chunks, duplicate } => {
                write!(f, "frame_stored id={}/{} duplicate={}", chunk_id, total_chunks, duplicate)
            }
            Self::FrameRejected { chunk_id, reason } => {
                write!(f, "frame_rejected id={} reason={}", chunk_id, reason)
            }
            Self::MalformedDropped { len, reason } => {
                write!(f, "malformed_dropped len={} reason={}", len, reason)
            }
            Self::AckSendFailed { chunk_id, error } => {
                write!(f, "ack_send_failed id={} error={}", chunk_id, error)
            }
            Self::TransferComplete { total_bytes, total_chunks } => {
                write!(f, "transfer_complete bytes={} chunks={}", total_bytes, total_chunks)
            }
            Self::TransferIncomplete { received_count, total_chunks, missing } => match total_chunks {
                Some(total) => write!(f, "transfer_incomplete received={}/{} missing={}", received_count, total, missing),
                None => write!(f, "transfer_incomplete received={} total=unknown", received_count),
            },
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Trait for transfer logging. Implementations can write to tracing,
/// collect entries, or discard them.
pub trait TransferLogger: Send + Sync {
    fn log(&self, entry: TransferLog);
}

/// Logger that uses the `tracing` crate.
pub struct TracingLogger;

impl TransferLogger for TracingLogger {
    fn log(&self, entry: TransferLog) {
        match &entry.event {
            TransferEvent::Fragmented { .. }
            | TransferEvent::SentinelSent { .. }
            | TransferEvent::TransferComplete { .. } => {
                tracing::info!(component = entry.component, "{}", entry.event);
            }
            TransferEvent::Retrying { .. }
            | TransferEvent::FrameRejected { .. }
            | TransferEvent::MalformedDropped { .. }
            | TransferEvent::AckSendFailed { .. } => {
                tracing::warn!(component = entry.component, "{}", entry.event);
            }
            TransferEvent::ChunkFailed { .. }
            | TransferEvent::TransferIncomplete { .. }
            | TransferEvent::Cancelled => {
                tracing::error!(component = entry.component, "{}", entry.event);
            }
            // Per-frame chatter
            _ => {
                tracing::debug!(component = entry.component, "{}", entry.event);
            }
        }
    }
}

/// No-op logger that discards all log entries.
pub struct NullLogger;

impl TransferLogger for NullLogger {
    fn log(&self, _entry: TransferLog) {}
}

/// Logger that keeps every entry in memory.
#[derive(Default)]
pub struct MemoryLogger {
    entries: Mutex<Vec<TransferLog>>,
}

impl MemoryLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<TransferEvent> {
        self.entries.lock().iter().map(|e| e.event.clone()).collect()
    }
}

impl TransferLogger for MemoryLogger {
    fn log(&self, entry: TransferLog) {
        self.entries.lock().push(entry);
    }
}

/// Send `event` to `logger` if one is configured.
pub(crate) fn emit(logger: &Option<Arc<dyn TransferLogger>>, component: &'static str, event: TransferEvent) {
    if let Some(logger) = logger {
        logger.log(TransferLog { component, event });
    }
}
