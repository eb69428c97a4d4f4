/// Sender transfer manager.
///
/// ```text
/// for each frame, in chunk_id order:
///   PREPARE -> SEND -> AWAIT_ACK -+-> ACK          -> next frame
///                ^                +-> ERR/timeout  -> SEND again (bounded)
///                |                                     |
///                +-------------------------------------+
///                                 budget spent -> FAILED (abort transfer)
/// all frames acked -> send EOF once -> Success
/// ```
///
/// One frame is in flight at a time and frames are never skipped or
/// reordered; the receiver relies on that to detect gaps.

use std::sync::Arc;
use std::time::Duration;

use crate::ack::{AckMatch, decode_ack};
use crate::cancel::CancelToken;
use crate::clock::{Clock, Deadline};
use crate::config::TransferConfig;
use crate::error::{ChunkFault, TransferError};
use crate::logging::{TransferEvent, TransferLogger, emit};
use crate::protocol::{Frame, SENTINEL, chunks_for_payload, encode_frame};
use crate::stats::SenderStats;
use crate::transport::{Transport, wait_for_message};

const COMPONENT: &str = "sender";

/// Configuration for the sender.
#[derive(Clone, Default)]
pub struct SenderConfig {
    pub transfer: TransferConfig,
    pub logger: Option<Arc<dyn TransferLogger>>,
    pub cancel: CancelToken,
}

/// Summary of a completed send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub total_chunks: u32,
    pub stats: SenderStats,
    pub elapsed: Duration,
}

/// Terminal result of `send_transfer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Every frame acknowledged and the sentinel sent.
    Success(SendReport),
    /// A frame was not acknowledged within the retry budget. Nothing after
    /// it was sent, and no sentinel.
    PartialFailure {
        failed_chunk_id: u32,
        attempts: u32,
        last_fault: ChunkFault,
        stats: SenderStats,
    },
}

impl SendOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SendOutcome::Success(_))
    }

    /// Turn a partial failure into `TransferError::RetryBudgetExhausted`.
    pub fn into_result(self) -> Result<SendReport, TransferError> {
        match self {
            SendOutcome::Success(report) => Ok(report),
            SendOutcome::PartialFailure {
                failed_chunk_id,
                attempts,
                last_fault,
                ..
            } => Err(TransferError::RetryBudgetExhausted {
                chunk_id: failed_chunk_id,
                attempts,
                last_fault,
            }),
        }
    }
}

/// Split `payload` into frames of at most `chunk_size` bytes, ids ascending.
///
/// An empty payload produces a single empty frame so the receiver still
/// learns `total_chunks` and can assemble it.
pub fn fragment(payload: &[u8], chunk_size: usize) -> Result<Vec<Frame>, TransferError> {
    if chunk_size == 0 {
        return Err(TransferError::InvalidConfig("chunk_size must be > 0".into()));
    }
    let total_chunks = u32::try_from(chunks_for_payload(payload.len(), chunk_size))
        .map_err(|_| TransferError::PayloadTooLarge { len: payload.len() })?;

    if payload.is_empty() {
        return Ok(vec![Frame::new(0, 1, Vec::new())]);
    }

    Ok(payload
        .chunks(chunk_size)
        .zip(0u32..)
        .map(|(data, chunk_id)| Frame::new(chunk_id, total_chunks, data.to_vec()))
        .collect())
}

/// Send `frames` in order with per-frame acknowledgement and bounded retry,
/// then the end-of-transfer sentinel.
///
/// Blocks until done. Returns `Err` for an invalid configuration, an empty
/// frame list, cancellation, or a failure to transmit the sentinel; an
/// unacknowledged frame is a `PartialFailure`.
pub fn send_transfer<T, C>(
    transport: &mut T,
    clock: &C,
    frames: &[Frame],
    config: &SenderConfig,
) -> Result<SendOutcome, TransferError>
where
    T: Transport + ?Sized,
    C: Clock + ?Sized,
{
    let tc = &config.transfer;
    tc.validate(transport.max_message_len())?;
    if frames.is_empty() {
        // Even an empty payload is one frame; nothing here means no transfer.
        return Err(TransferError::InvalidConfig("no frames to send".into()));
    }
    let start = clock.now();
    let mut stats = SenderStats::default();
    let total_chunks = frames.last().map(|f| f.total_chunks).unwrap_or(0);

    for frame in frames {
        let message = encode_frame(frame);
        let mut attempt: u32 = 0;
        let mut acked = false;
        let mut last_fault = ChunkFault::AckTimeout;

        while attempt < tc.max_retries {
            attempt += 1;
            stats.transmissions += 1;
            if attempt > 1 {
                stats.retransmits += 1;
            }

            let fault = match transport.send(&message) {
                Ok(()) => {
                    emit(&config.logger, COMPONENT, TransferEvent::FrameSent {
                        chunk_id: frame.chunk_id,
                        attempt,
                        len: message.len(),
                    });
                    match await_ack(transport, clock, frame.chunk_id, config, &mut stats)? {
                        None => {
                            acked = true;
                            break;
                        }
                        Some(fault) => fault,
                    }
                }
                Err(e) => {
                    // Treated like a lost frame: wait out the ack window before resending.
                    if attempt < tc.max_retries {
                        back_off(clock, config)?;
                    }
                    ChunkFault::Transport(e.to_string())
                }
            };

            if attempt < tc.max_retries {
                emit(&config.logger, COMPONENT, TransferEvent::Retrying {
                    chunk_id: frame.chunk_id,
                    attempt,
                    max_retries: tc.max_retries,
                    reason: fault.to_string(),
                });
            }
            last_fault = fault;
        }

        if !acked {
            emit(&config.logger, COMPONENT, TransferEvent::ChunkFailed {
                chunk_id: frame.chunk_id,
                attempts: attempt,
            });
            return Ok(SendOutcome::PartialFailure {
                failed_chunk_id: frame.chunk_id,
                attempts: attempt,
                last_fault,
                stats,
            });
        }

        emit(&config.logger, COMPONENT, TransferEvent::Acked {
            chunk_id: frame.chunk_id,
            attempt,
        });
        stats.frames_acked += 1;
        stats.bytes_acked += frame.data.len() as u64;
    }

    transport.send(SENTINEL)?;
    emit(&config.logger, COMPONENT, TransferEvent::SentinelSent { total_chunks });

    Ok(SendOutcome::Success(SendReport {
        total_chunks,
        stats,
        elapsed: clock.now().saturating_sub(start),
    }))
}

/// Fragment `payload` with the configured chunk size and send it.
pub fn run_sender<T, C>(
    transport: &mut T,
    clock: &C,
    payload: &[u8],
    config: &SenderConfig,
) -> Result<SendOutcome, TransferError>
where
    T: Transport + ?Sized,
    C: Clock + ?Sized,
{
    config.transfer.validate(transport.max_message_len())?;
    let frames = fragment(payload, config.transfer.chunk_size)?;
    emit(&config.logger, COMPONENT, TransferEvent::Fragmented {
        payload_len: payload.len(),
        total_chunks: frames.len() as u32,
        chunk_size: config.transfer.chunk_size,
    });
    send_transfer(transport, clock, &frames, config)
}

/// Sleep one ack window after a failed transmit, honouring cancellation.
fn back_off<C>(clock: &C, config: &SenderConfig) -> Result<(), TransferError>
where
    C: Clock + ?Sized,
{
    let tc = &config.transfer;
    let deadline = Deadline::after(clock, tc.ack_timeout);
    while !deadline.is_expired(clock) {
        if config.cancel.is_cancelled() {
            emit(&config.logger, COMPONENT, TransferEvent::Cancelled);
            return Err(TransferError::Cancelled);
        }
        clock.sleep(deadline.remaining(clock).min(tc.poll_interval));
    }
    Ok(())
}

/// Wait one ack window for the acknowledgement of `chunk_id`.
///
/// Returns `None` when acknowledged, otherwise why the attempt failed.
/// Messages for other chunks and noise are skipped without ending the window.
fn await_ack<T, C>(
    transport: &mut T,
    clock: &C,
    chunk_id: u32,
    config: &SenderConfig,
    stats: &mut SenderStats,
) -> Result<Option<ChunkFault>, TransferError>
where
    T: Transport + ?Sized,
    C: Clock + ?Sized,
{
    let tc = &config.transfer;
    let deadline = Deadline::after(clock, tc.ack_timeout);

    loop {
        let message = match wait_for_message(transport, clock, Some(deadline), tc.poll_interval, &config.cancel) {
            Ok(Some(message)) => message,
            Ok(None) => {
                stats.timeouts += 1;
                return Ok(Some(ChunkFault::AckTimeout));
            }
            Err(TransferError::Cancelled) => {
                emit(&config.logger, COMPONENT, TransferEvent::Cancelled);
                return Err(TransferError::Cancelled);
            }
            Err(e) => return Err(e),
        };

        match decode_ack(&message, chunk_id) {
            AckMatch::Matched(true) => return Ok(None),
            AckMatch::Matched(false) => {
                stats.nacks += 1;
                return Ok(Some(ChunkFault::Nacked));
            }
            AckMatch::Unmatched | AckMatch::NotAnAck => {
                stats.ignored += 1;
                tracing::trace!(
                    chunk_id,
                    message = %String::from_utf8_lossy(&message),
                    "ignoring message while awaiting ack"
                );
            }
        }
    }
}
