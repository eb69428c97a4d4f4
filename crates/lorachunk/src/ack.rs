/// Acknowledgement messages, receiver → sender.
///
/// ```text
/// ACK|<chunk_id>   frame stored
/// ERR|<chunk_id>   frame decoded but failed validation, resend
/// ```

use crate::error::Field;
use crate::protocol::{DELIMITER, parse_field};

const ACK_TAG: &str = "ACK";
const ERR_TAG: &str = "ERR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    Ack,
    Err,
}

/// A parsed control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub kind: AckKind,
    pub chunk_id: u32,
}

impl Ack {
    pub fn is_positive(&self) -> bool {
        self.kind == AckKind::Ack
    }
}

/// Result of matching an incoming message against the frame in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMatch {
    /// Control message for the expected chunk; `true` for ACK, `false` for ERR.
    Matched(bool),
    /// Well-formed control message for some other chunk. Ignored.
    Unmatched,
    /// Not a control message at all.
    NotAnAck,
}

/// Render a positive or negative acknowledgement.
pub fn encode_ack(chunk_id: u32, ok: bool) -> Vec<u8> {
    let tag = if ok { ACK_TAG } else { ERR_TAG };
    format!("{}{}{}", tag, DELIMITER, chunk_id).into_bytes()
}

/// Parse a control message. Trailing whitespace is tolerated.
pub fn parse_ack(message: &[u8]) -> Option<Ack> {
    let text = std::str::from_utf8(message).ok()?.trim_end();
    let (tag, id) = text.split_once(DELIMITER)?;
    let kind = match tag {
        ACK_TAG => AckKind::Ack,
        ERR_TAG => AckKind::Err,
        _ => return None,
    };
    let chunk_id = parse_field(id, Field::ChunkId).ok()?;
    Some(Ack { kind, chunk_id })
}

/// Match `message` against the acknowledgement the sender is waiting for.
pub fn decode_ack(message: &[u8], expected_chunk_id: u32) -> AckMatch {
    match parse_ack(message) {
        Some(ack) if ack.chunk_id == expected_chunk_id => AckMatch::Matched(ack.is_positive()),
        Some(_) => AckMatch::Unmatched,
        None => AckMatch::NotAnAck,
    }
}
