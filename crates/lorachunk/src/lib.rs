/// lorachunk: reliable chunked transfer over a half-duplex radio link.
///
/// Moves a byte payload across a link that carries only short text messages
/// and guarantees nothing:
/// - Fragmentation into sequence-numbered, checksummed frames
/// - Stop-and-wait delivery: one frame in flight, ACK/ERR per frame
/// - Bounded per-frame retry, abort on the first chunk that exhausts it
/// - `EOF` sentinel and receiver-side gap detection before reassembly
/// - Pluggable transports (in-memory, UDP, newline-delimited serial stream)
/// - Virtual clock so every timeout is testable without sleeping

pub mod ack;
pub mod cancel;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod reassembly;
pub mod receiver;
pub mod sender;
pub mod stats;
pub mod transport;

// Re-export key types for convenience.
pub use ack::{Ack, AckKind, AckMatch, decode_ack, encode_ack};
pub use cancel::CancelToken;
pub use clock::{Clock, Deadline, SystemClock, VirtualClock};
pub use config::TransferConfig;
pub use error::{ChecksumMismatch, ChunkFault, DecodeError, TransferError, TransportError};
pub use logging::{MemoryLogger, NullLogger, TracingLogger, TransferEvent, TransferLog, TransferLogger};
pub use protocol::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MAX_MESSAGE_LEN, Frame, SENTINEL, checksum, decode_frame,
    encode_frame, is_sentinel, max_encoded_len,
};
pub use reassembly::{MissingChunks, ReassemblyBuffer};
pub use receiver::{ReceiveOutcome, ReceiveReport, ReceiverConfig, receive_transfer};
pub use sender::{SendOutcome, SendReport, SenderConfig, fragment, run_sender, send_transfer};
pub use stats::{ReceiverStats, SenderStats};
pub use transport::{FaultProfile, MemoryLink, StreamTransport, Transport, UdpTransport, wait_for_message};
