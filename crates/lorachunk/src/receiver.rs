/// Receiver transfer manager.
///
/// ```text
/// LISTENING --EOF--> DONE: assemble if every chunk is present
///     |
///     +--message--> decode --fail--> drop, no reply
///                      |
///                      +--checksum bad / total conflict--> ERR|id
///                      +--valid--> store (overwrite) --> ACK|id
///                                                           |
///     <-----------------------------------------------------+
/// ```
///
/// The reassembly buffer lives only inside one call; on cancellation or
/// failure it is dropped and nothing is handed out.

use std::sync::Arc;
use std::time::Duration;

use crate::ack::encode_ack;
use crate::cancel::CancelToken;
use crate::clock::{Clock, Deadline};
use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::logging::{TransferEvent, TransferLogger, emit};
use crate::protocol::{decode_frame, is_sentinel};
use crate::reassembly::{Insert, MissingChunks, ReassemblyBuffer};
use crate::stats::ReceiverStats;
use crate::transport::{Transport, wait_for_message};

const COMPONENT: &str = "receiver";

/// Configuration for the receiver.
#[derive(Clone, Default)]
pub struct ReceiverConfig {
    pub transfer: TransferConfig,
    pub logger: Option<Arc<dyn TransferLogger>>,
    pub cancel: CancelToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveReport {
    pub total_chunks: u32,
    pub stats: ReceiverStats,
    pub elapsed: Duration,
}

/// Terminal result of `receive_transfer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Sentinel seen with every chunk present.
    Assembled {
        payload: Vec<u8>,
        report: ReceiveReport,
    },
    /// Sentinel seen with chunks missing, or before any valid frame.
    Incomplete {
        received_count: usize,
        total_chunks: Option<u32>,
        missing: MissingChunks,
        stats: ReceiverStats,
    },
}

impl ReceiveOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, ReceiveOutcome::Assembled { .. })
    }

    /// Turn an incomplete transfer into `TransferError::IncompleteTransfer`.
    pub fn into_result(self) -> Result<(Vec<u8>, ReceiveReport), TransferError> {
        match self {
            ReceiveOutcome::Assembled { payload, report } => Ok((payload, report)),
            ReceiveOutcome::Incomplete {
                received_count,
                total_chunks,
                missing,
                ..
            } => Err(TransferError::IncompleteTransfer {
                received_count,
                total_chunks,
                missing,
            }),
        }
    }
}

/// Receive one transfer: acknowledge frames until the sentinel, then assemble.
///
/// Blocks until the sentinel arrives, the optional idle timeout expires, or
/// the cancel token fires.
pub fn receive_transfer<T, C>(
    transport: &mut T,
    clock: &C,
    config: &ReceiverConfig,
) -> Result<ReceiveOutcome, TransferError>
where
    T: Transport + ?Sized,
    C: Clock + ?Sized,
{
    let tc = &config.transfer;
    let start = clock.now();
    let mut buffer = ReassemblyBuffer::new();
    let mut stats = ReceiverStats::default();

    loop {
        let deadline = tc.idle_timeout.map(|t| Deadline::after(clock, t));
        let message = match wait_for_message(transport, clock, deadline, tc.poll_interval, &config.cancel) {
            Ok(Some(message)) => message,
            Ok(None) => return Err(TransferError::IdleTimeout),
            Err(TransferError::Cancelled) => {
                emit(&config.logger, COMPONENT, TransferEvent::Cancelled);
                return Err(TransferError::Cancelled);
            }
            Err(e) => return Err(e),
        };
        stats.messages += 1;

        if is_sentinel(&message) {
            break;
        }

        handle_message(transport, &message, &mut buffer, &mut stats, config);
    }

    Ok(finish(buffer, stats, clock.now().saturating_sub(start), config))
}

/// Validate one non-sentinel message, update the buffer, and acknowledge.
fn handle_message<T>(
    transport: &mut T,
    message: &[u8],
    buffer: &mut ReassemblyBuffer,
    stats: &mut ReceiverStats,
    config: &ReceiverConfig,
) where
    T: Transport + ?Sized,
{
    let frame = match decode_frame(message) {
        Ok(frame) => frame,
        Err(e) => {
            // No trustworthy chunk_id to answer; the sender's timeout recovers it.
            stats.malformed += 1;
            emit(&config.logger, COMPONENT, TransferEvent::MalformedDropped {
                len: message.len(),
                reason: e.to_string(),
            });
            return;
        }
    };
    let chunk_id = frame.chunk_id;
    let total_chunks = frame.total_chunks;

    let ok = match frame.verify() {
        Err(mismatch) => {
            emit(&config.logger, COMPONENT, TransferEvent::FrameRejected {
                chunk_id,
                reason: mismatch.to_string(),
            });
            false
        }
        Ok(()) => match buffer.insert(frame) {
            Insert::TotalMismatch { expected } => {
                emit(&config.logger, COMPONENT, TransferEvent::FrameRejected {
                    chunk_id,
                    reason: format!("total_chunks {} conflicts with {}", total_chunks, expected),
                });
                false
            }
            insert => {
                let duplicate = insert == Insert::Duplicate;
                stats.frames_stored += 1;
                if duplicate {
                    stats.duplicates += 1;
                }
                emit(&config.logger, COMPONENT, TransferEvent::FrameStored {
                    chunk_id,
                    total_chunks,
                    duplicate,
                });
                true
            }
        },
    };
    if !ok {
        stats.rejected += 1;
    }

    if let Err(e) = transport.send(&encode_ack(chunk_id, ok)) {
        stats.ack_send_failures += 1;
        emit(&config.logger, COMPONENT, TransferEvent::AckSendFailed {
            chunk_id,
            error: e.to_string(),
        });
    }
}

fn finish(
    buffer: ReassemblyBuffer,
    stats: ReceiverStats,
    elapsed: Duration,
    config: &ReceiverConfig,
) -> ReceiveOutcome {
    let total_chunks = buffer.total_chunks();
    let received_count = buffer.received();
    let missing = buffer.missing();

    match buffer.assemble() {
        Ok(payload) => {
            let total_chunks = total_chunks.unwrap_or_default();
            emit(&config.logger, COMPONENT, TransferEvent::TransferComplete {
                total_bytes: payload.len(),
                total_chunks,
            });
            ReceiveOutcome::Assembled {
                payload,
                report: ReceiveReport {
                    total_chunks,
                    stats,
                    elapsed,
                },
            }
        }
        Err(_) => {
            emit(&config.logger, COMPONENT, TransferEvent::TransferIncomplete {
                received_count,
                total_chunks,
                missing: missing.clone(),
            });
            ReceiveOutcome::Incomplete {
                received_count,
                total_chunks,
                missing,
                stats,
            }
        }
    }
}
