/// Per-transfer counters, returned with the outcome of each side.

use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    /// Payload bytes covered by acknowledged frames.
    pub bytes_acked: u64,
    /// Frames acknowledged.
    pub frames_acked: u64,
    /// Transmissions, first attempts and retransmissions together.
    pub transmissions: u64,
    /// Transmissions beyond the first per frame.
    pub retransmits: u64,
    /// Negative acknowledgements received.
    pub nacks: u64,
    /// Ack windows that expired.
    pub timeouts: u64,
    /// Messages ignored while waiting (stale acks, noise).
    pub ignored: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    /// Messages taken off the link, sentinel included.
    pub messages: u64,
    /// Frames stored, duplicates included.
    pub frames_stored: u64,
    /// Frames that overwrote an already stored chunk.
    pub duplicates: u64,
    /// Frames answered with ERR.
    pub rejected: u64,
    /// Messages dropped because they did not decode.
    pub malformed: u64,
    /// Acknowledgements the transport refused.
    pub ack_send_failures: u64,
}

impl SenderStats {
    /// Throughput in payload bytes per second over `elapsed`.
    pub fn throughput_bps(&self, elapsed: Duration) -> u64 {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0;
        }
        (self.bytes_acked as f64 / secs) as u64
    }
}
