/// UDP datagram link: one datagram per message, fixed peer.
///
/// Useful for bench runs between two hosts, or a radio bridge that exposes
/// its air interface as datagrams.

use std::io;
use std::net::{SocketAddr, UdpSocket};

use crate::error::TransportError;
use crate::transport::Transport;

pub struct UdpTransport {
    bind_addr: SocketAddr,
    peer_addr: SocketAddr,
    max_len: usize,
    socket: Option<UdpSocket>,
    pending: Option<Vec<u8>>,
    recv_buf: Vec<u8>,
}

impl UdpTransport {
    pub fn new(bind_addr: SocketAddr, peer_addr: SocketAddr, max_len: usize) -> Self {
        Self {
            bind_addr,
            peer_addr,
            max_len,
            socket: None,
            pending: None,
            // Room to detect oversized datagrams instead of silently truncating.
            recv_buf: vec![0u8; max_len + 1],
        }
    }

    /// Local address once open; useful when bound to port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Change the peer address.
    pub fn set_peer(&mut self, peer_addr: SocketAddr) {
        self.peer_addr = peer_addr;
    }

    /// Pull one datagram from the peer into `pending`, if any.
    fn fill_pending(&mut self) -> Result<(), TransportError> {
        if self.pending.is_some() {
            return Ok(());
        }
        let socket = self.socket.as_ref().ok_or(TransportError::NotOpen)?;
        loop {
            match socket.recv_from(&mut self.recv_buf) {
                Ok((len, from)) => {
                    if from != self.peer_addr {
                        tracing::trace!(%from, "ignoring datagram from unknown peer");
                        continue;
                    }
                    if len > self.max_len {
                        tracing::debug!(len, max = self.max_len, "dropping oversized datagram");
                        continue;
                    }
                    self.pending = Some(self.recv_buf[..len].to_vec());
                    return Ok(());
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Err(TransportError::Empty);
                }
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
    }
}

impl Transport for UdpTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        if self.socket.is_some() {
            return Ok(());
        }
        let socket = create_udp_socket(self.bind_addr)?;
        tracing::debug!(
            local = ?socket.local_addr().ok(),
            peer = %self.peer_addr,
            "udp link open"
        );
        self.socket = Some(socket);
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.socket = None;
        self.pending = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn available(&mut self) -> bool {
        self.fill_pending().is_ok()
    }

    fn send(&mut self, message: &[u8]) -> Result<(), TransportError> {
        let socket = self.socket.as_ref().ok_or(TransportError::NotOpen)?;
        if message.len() > self.max_len {
            return Err(TransportError::MessageTooLong {
                len: message.len(),
                max: self.max_len,
            });
        }
        socket.send_to(message, self.peer_addr)?;
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        self.fill_pending()?;
        self.pending.take().ok_or(TransportError::Empty)
    }

    fn max_message_len(&self) -> usize {
        self.max_len
    }
}

/// Create a non-blocking UDP socket bound to `addr`.
fn create_udp_socket(addr: SocketAddr) -> io::Result<UdpSocket> {
    use socket2::{Domain, Protocol, Socket, Type};

    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;

    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn wait_available(link: &mut UdpTransport) -> bool {
        for _ in 0..200 {
            if link.available() {
                return true;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn exchanges_datagrams() {
        let mut a = UdpTransport::new(loopback(), loopback(), 64);
        let mut b = UdpTransport::new(loopback(), loopback(), 64);
        a.open().unwrap();
        b.open().unwrap();
        let a_addr = a.local_addr().unwrap();
        let b_addr = b.local_addr().unwrap();
        a.set_peer(b_addr);
        b.set_peer(a_addr);

        a.send(b"0|1|0|").unwrap();
        assert!(wait_available(&mut b));
        assert_eq!(b.receive().unwrap(), b"0|1|0|");

        b.send(b"ACK|0").unwrap();
        assert!(wait_available(&mut a));
        assert_eq!(a.receive().unwrap(), b"ACK|0");
        assert!(matches!(a.receive(), Err(TransportError::Empty)));
    }

    #[test]
    fn send_requires_open() {
        let mut a = UdpTransport::new(loopback(), loopback(), 64);
        assert!(matches!(a.send(b"x"), Err(TransportError::NotOpen)));
        a.open().unwrap();
        assert!(matches!(
            a.send(&[0u8; 65]),
            Err(TransportError::MessageTooLong { len: 65, max: 64 })
        ));
        a.close().unwrap();
        assert!(!a.is_open());
    }
}
