/// Frame codec for the radio link.
///
/// ```text
/// <chunk_id>|<total_chunks>|<checksum>|<data>
///
/// chunk_id      decimal u32, 0 <= chunk_id < total_chunks
/// total_chunks  decimal u32, > 0
/// checksum      decimal 0-255, sum(data) mod 256
/// data          standard padded base64 of the raw chunk bytes
/// ```
///
/// Every field is ASCII and none can contain `|` or `\n`, so a frame fits any
/// text-only, line-oriented link. The sentinel `EOF` has no delimiter and can
/// never be mistaken for a frame.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{ChecksumMismatch, DecodeError, Field};

/// Field delimiter.
pub const DELIMITER: char = '|';

/// End-of-transfer sentinel.
pub const SENTINEL: &[u8] = b"EOF";

/// Default bytes of payload per frame.
pub const DEFAULT_CHUNK_SIZE: usize = 128;

/// Default link message bound (E220 sub-packet size).
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 200;

/// Worst-case header: "4294967295|4294967295|255|".
pub const MAX_HEADER_LEN: usize = 10 + 1 + 10 + 1 + 3 + 1;

/// One fragment of a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub chunk_id: u32,
    pub total_chunks: u32,
    pub checksum: u8,
    pub data: Vec<u8>,
}

impl Frame {
    /// Build a frame, computing the checksum over `data`.
    pub fn new(chunk_id: u32, total_chunks: u32, data: Vec<u8>) -> Self {
        Self {
            chunk_id,
            total_chunks,
            checksum: checksum(&data),
            data,
        }
    }

    /// Recompute the checksum and compare it with the carried one.
    pub fn verify(&self) -> Result<(), ChecksumMismatch> {
        let computed = checksum(&self.data);
        if computed != self.checksum {
            return Err(ChecksumMismatch {
                chunk_id: self.chunk_id,
                carried: self.checksum,
                computed,
            });
        }
        Ok(())
    }
}

/// Sum of all bytes modulo 256. Detects any single-byte change, not reorderings.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Render a frame as a link message.
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let mut out = format!(
        "{}{d}{}{d}{}{d}",
        frame.chunk_id,
        frame.total_chunks,
        frame.checksum,
        d = DELIMITER
    );
    STANDARD.encode_string(&frame.data, &mut out);
    out.into_bytes()
}

/// Parse a link message as a frame.
///
/// The carried checksum is range-checked but not verified; use
/// [`Frame::verify`] so a corrupted frame can still be negatively acknowledged.
pub fn decode_frame(message: &[u8]) -> Result<Frame, DecodeError> {
    let text = std::str::from_utf8(message).map_err(|_| DecodeError::NotText)?;

    let parts: Vec<&str> = text.split(DELIMITER).collect();
    if parts.len() != 4 {
        return Err(DecodeError::FieldCount { found: parts.len() });
    }

    let chunk_id = parse_field(parts[0], Field::ChunkId)?;
    let total_chunks = parse_field(parts[1], Field::TotalChunks)?;
    let raw_checksum = parse_field(parts[2], Field::Checksum)?;

    let checksum = u8::try_from(raw_checksum)
        .map_err(|_| DecodeError::ChecksumOutOfRange { value: raw_checksum })?;
    if total_chunks == 0 {
        return Err(DecodeError::ZeroTotalChunks);
    }
    if chunk_id >= total_chunks {
        return Err(DecodeError::ChunkIdOutOfRange {
            chunk_id,
            total_chunks,
        });
    }

    let data = STANDARD
        .decode(parts[3])
        .map_err(|e| DecodeError::InvalidData {
            reason: e.to_string(),
        })?;

    Ok(Frame {
        chunk_id,
        total_chunks,
        checksum,
        data,
    })
}

/// Strict decimal parse: ASCII digits only, no sign, no whitespace.
pub(crate) fn parse_field(value: &str, field: Field) -> Result<u32, DecodeError> {
    if value.is_empty() {
        return Err(DecodeError::EmptyField { field });
    }
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::InvalidNumber {
            field,
            value: value.to_string(),
        });
    }
    value.parse::<u32>().map_err(|_| DecodeError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// True if `message` is the end-of-transfer sentinel (surrounding whitespace allowed).
pub fn is_sentinel(message: &[u8]) -> bool {
    message.trim_ascii() == SENTINEL
}

/// Encoded length of `data_len` bytes of frame data.
pub fn encoded_data_len(data_len: usize) -> usize {
    data_len.div_ceil(3) * 4
}

/// Worst-case message length for frames carrying up to `chunk_size` bytes.
pub fn max_encoded_len(chunk_size: usize) -> usize {
    MAX_HEADER_LEN + encoded_data_len(chunk_size)
}

/// Number of frames needed for a payload. An empty payload still takes one frame.
pub fn chunks_for_payload(payload_len: usize, chunk_size: usize) -> usize {
    if payload_len == 0 {
        1
    } else {
        payload_len.div_ceil(chunk_size)
    }
}
