/// Single-threaded scripted transport for unit tests.
///
/// Inbound messages come from a queue; an optional responder turns each sent
/// message into replies so a whole exchange runs on one thread with a virtual
/// clock.

use std::collections::VecDeque;

use crate::error::TransportError;
use crate::protocol::DEFAULT_MAX_MESSAGE_LEN;
use crate::transport::Transport;

type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>>>;

pub(crate) struct ScriptedTransport {
    inbound: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    responder: Option<Responder>,
    failing_receives: usize,
    failing_sends: usize,
    open: bool,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self {
            inbound: VecDeque::new(),
            sent: Vec::new(),
            responder: None,
            failing_receives: 0,
            failing_sends: 0,
            open: true,
        }
    }

    pub(crate) fn with_responder(
        responder: impl FnMut(&[u8]) -> Vec<Vec<u8>> + 'static,
    ) -> Self {
        let mut link = Self::new();
        link.responder = Some(Box::new(responder));
        link
    }

    pub(crate) fn push_inbound(&mut self, message: &[u8]) {
        self.inbound.push_back(message.to_vec());
    }

    pub(crate) fn fail_receives(&mut self, count: usize) {
        self.failing_receives = count;
    }

    pub(crate) fn fail_sends(&mut self, count: usize) {
        self.failing_sends = count;
    }

    pub(crate) fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }
}

impl Transport for ScriptedTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn available(&mut self) -> bool {
        !self.inbound.is_empty()
    }

    fn send(&mut self, message: &[u8]) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        if self.failing_sends > 0 {
            self.failing_sends -= 1;
            return Err(TransportError::Io(std::io::Error::other("radio busy")));
        }
        self.sent.push(message.to_vec());
        if let Some(responder) = self.responder.as_mut() {
            self.inbound.extend(responder(message));
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        if self.failing_receives > 0 {
            self.failing_receives -= 1;
            return Err(TransportError::Io(std::io::Error::other("status error")));
        }
        self.inbound.pop_front().ok_or(TransportError::Empty)
    }

    fn max_message_len(&self) -> usize {
        DEFAULT_MAX_MESSAGE_LEN
    }
}
