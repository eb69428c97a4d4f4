/// Transfer tuning shared by sender and receiver.

use std::time::Duration;

use crate::error::TransferError;
use crate::protocol::{DEFAULT_CHUNK_SIZE, max_encoded_len};

/// Default wait for an acknowledgement.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Default transmissions per frame before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default transport poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Payload bytes per frame.
    pub chunk_size: usize,
    /// How long the sender waits for a matching acknowledgement.
    pub ack_timeout: Duration,
    /// Total transmissions allowed per frame, first one included.
    pub max_retries: u32,
    /// Sleep between transport polls while waiting.
    pub poll_interval: Duration,
    /// Receiver gives up after this long without any message. `None` waits forever.
    pub idle_timeout: Option<Duration>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            poll_interval: DEFAULT_POLL_INTERVAL,
            idle_timeout: None,
        }
    }
}

impl TransferConfig {
    /// Check the settings against a link that carries at most `max_message_len` bytes.
    pub fn validate(&self, max_message_len: usize) -> Result<(), TransferError> {
        if self.chunk_size == 0 {
            return Err(TransferError::InvalidConfig("chunk_size must be > 0".into()));
        }
        if self.max_retries == 0 {
            return Err(TransferError::InvalidConfig("max_retries must be > 0".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(TransferError::InvalidConfig(
                "poll_interval must be > 0".into(),
            ));
        }
        let needed = max_encoded_len(self.chunk_size);
        if needed > max_message_len {
            return Err(TransferError::InvalidConfig(format!(
                "chunk_size {} encodes to up to {} bytes, link carries {}",
                self.chunk_size, needed, max_message_len
            )));
        }
        Ok(())
    }
}
