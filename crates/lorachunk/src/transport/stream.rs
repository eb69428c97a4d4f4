/// Newline-delimited message link over a byte stream.
///
/// Meant for a radio module in transparent mode behind a serial device that
/// was configured out of band. Frames, acks and the sentinel never contain
/// `\n`, so one line is one message.
///
/// ```text
/// [device] --read_until('\n')--> [reader thread] --channel--> receive()
/// send() --write_all(msg + '\n')--> [device]
/// ```

use std::io::{BufRead, BufReader, Read, Write};

use crossbeam_channel::{Receiver, TryRecvError, bounded};

use crate::error::TransportError;
use crate::transport::Transport;

/// Lines buffered between the reader thread and the protocol.
const LINE_QUEUE: usize = 64;

pub struct StreamTransport<R, W> {
    reader: Option<R>,
    writer: W,
    max_len: usize,
    lines: Option<Receiver<Vec<u8>>>,
}

impl<R, W> StreamTransport<R, W>
where
    R: Read + Send + 'static,
    W: Write,
{
    pub fn new(reader: R, writer: W, max_len: usize) -> Self {
        Self {
            reader: Some(reader),
            writer,
            max_len,
            lines: None,
        }
    }
}

impl<R, W> Transport for StreamTransport<R, W>
where
    R: Read + Send + 'static,
    W: Write,
{
    fn open(&mut self) -> Result<(), TransportError> {
        if self.lines.is_some() {
            return Ok(());
        }
        // The reader moves into its thread; a closed stream link cannot reopen.
        let reader = self.reader.take().ok_or(TransportError::Closed)?;
        let (tx, rx) = bounded::<Vec<u8>>(LINE_QUEUE);
        let max_len = self.max_len;

        std::thread::Builder::new()
            .name("lorachunk-line-reader".into())
            .spawn(move || {
                let mut reader = BufReader::new(reader);
                let mut line = Vec::with_capacity(max_len + 2);
                loop {
                    line.clear();
                    match reader.read_until(b'\n', &mut line) {
                        Ok(0) => {
                            tracing::debug!("stream link reached end of input");
                            break;
                        }
                        Ok(_) => {
                            let msg = line.trim_ascii_end();
                            if msg.is_empty() {
                                continue;
                            }
                            if msg.len() > max_len {
                                tracing::debug!(len = msg.len(), max = max_len, "dropping oversized line");
                                continue;
                            }
                            if tx.send(msg.to_vec()).is_err() {
                                // Transport closed.
                                break;
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                        Err(e) => {
                            tracing::warn!(error = %e, "stream link read failed");
                            break;
                        }
                    }
                }
            })?;

        self.lines = Some(rx);
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        // The reader thread may be blocked in read; it exits on its next line.
        self.lines = None;
        self.writer.flush()?;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.lines.is_some()
    }

    fn available(&mut self) -> bool {
        self.lines.as_ref().is_some_and(|rx| !rx.is_empty())
    }

    fn send(&mut self, message: &[u8]) -> Result<(), TransportError> {
        if self.lines.is_none() {
            return Err(TransportError::NotOpen);
        }
        if message.len() > self.max_len {
            return Err(TransportError::MessageTooLong {
                len: message.len(),
                max: self.max_len,
            });
        }
        self.writer.write_all(message)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        let rx = self.lines.as_ref().ok_or(TransportError::NotOpen)?;
        rx.try_recv().map_err(|e| match e {
            TryRecvError::Empty => TransportError::Empty,
            TryRecvError::Disconnected => TransportError::Closed,
        })
    }

    fn max_message_len(&self) -> usize {
        self.max_len
    }
}
