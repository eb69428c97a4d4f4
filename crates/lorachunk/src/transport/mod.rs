/// Message transport the protocol runs over.
///
/// A transport carries whole, bounded, text-safe messages and offers no
/// delivery guarantee. Receiving is a non-blocking poll; blocking with a
/// deadline is layered on top by [`wait_for_message`].

pub mod memory;
pub mod stream;
pub mod udp;

#[cfg(test)]
pub(crate) mod script;

use std::time::Duration;

use crate::cancel::CancelToken;
use crate::clock::{Clock, Deadline};
use crate::error::{TransferError, TransportError};

pub use memory::{FaultProfile, MemoryLink};
pub use stream::StreamTransport;
pub use udp::UdpTransport;

pub trait Transport {
    /// Acquire the underlying link. Must be called before `send`/`receive`.
    fn open(&mut self) -> Result<(), TransportError>;

    /// Release the link. Further sends fail with `NotOpen`.
    fn close(&mut self) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;

    /// Non-blocking check for a pending inbound message.
    fn available(&mut self) -> bool;

    /// Best-effort transmit of one message.
    fn send(&mut self, message: &[u8]) -> Result<(), TransportError>;

    /// Non-blocking poll. An error means "no message yet", never an empty message.
    fn receive(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Largest message the link carries.
    fn max_message_len(&self) -> usize;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn open(&mut self) -> Result<(), TransportError> {
        (**self).open()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn available(&mut self) -> bool {
        (**self).available()
    }

    fn send(&mut self, message: &[u8]) -> Result<(), TransportError> {
        (**self).send(message)
    }

    fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        (**self).receive()
    }

    fn max_message_len(&self) -> usize {
        (**self).max_message_len()
    }
}

/// Poll `transport` until a message arrives, `deadline` passes, or `cancel` fires.
///
/// Returns `Ok(None)` on deadline. With no deadline this blocks until a
/// message or cancellation. Sleeps go through `clock`, never more than
/// `poll_interval` at a time.
pub fn wait_for_message<T, C>(
    transport: &mut T,
    clock: &C,
    deadline: Option<Deadline>,
    poll_interval: Duration,
    cancel: &CancelToken,
) -> Result<Option<Vec<u8>>, TransferError>
where
    T: Transport + ?Sized,
    C: Clock + ?Sized,
{
    loop {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        if transport.available() {
            match transport.receive() {
                Ok(message) => return Ok(Some(message)),
                Err(e) => tracing::trace!(error = %e, "receive returned no message"),
            }
        }

        let nap = match deadline {
            Some(deadline) => {
                if deadline.is_expired(clock) {
                    return Ok(None);
                }
                deadline.remaining(clock).min(poll_interval)
            }
            None => poll_interval,
        };
        clock.sleep(nap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::transport::script::ScriptedTransport;

    const POLL: Duration = Duration::from_millis(100);

    #[test]
    fn returns_pending_message_immediately() {
        let clock = VirtualClock::new();
        let mut link = ScriptedTransport::new();
        link.push_inbound(b"ACK|0");
        let deadline = Deadline::after(&clock, Duration::from_secs(2));

        let msg = wait_for_message(&mut link, &clock, Some(deadline), POLL, &CancelToken::new()).unwrap();
        assert_eq!(msg.as_deref(), Some(&b"ACK|0"[..]));
        assert_eq!(clock.now(), Duration::ZERO);
    }

    #[test]
    fn times_out_on_silent_link() {
        let clock = VirtualClock::new();
        let mut link = ScriptedTransport::new();
        let deadline = Deadline::after(&clock, Duration::from_millis(250));

        let msg = wait_for_message(&mut link, &clock, Some(deadline), POLL, &CancelToken::new()).unwrap();
        assert!(msg.is_none());
        assert_eq!(clock.now(), Duration::from_millis(250));
    }

    #[test]
    fn receive_errors_are_not_messages() {
        let clock = VirtualClock::new();
        let mut link = ScriptedTransport::new();
        link.fail_receives(3);
        link.push_inbound(b"EOF");

        let msg = wait_for_message(&mut link, &clock, None, POLL, &CancelToken::new()).unwrap();
        assert_eq!(msg.as_deref(), Some(&b"EOF"[..]));
        assert_eq!(clock.now(), Duration::from_millis(300));
    }

    #[test]
    fn cancellation_interrupts_unbounded_wait() {
        let clock = VirtualClock::new();
        let mut link = ScriptedTransport::new();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = wait_for_message(&mut link, &clock, None, POLL, &cancel).unwrap_err();
        assert!(matches!(err, TransferError::Cancelled));
    }
}
