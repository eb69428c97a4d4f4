/// In-process link between two endpoints over crossbeam channels.
///
/// Each endpoint owns the sending half towards its peer and the receiving
/// half from it. An optional `FaultProfile` drops or corrupts outbound
/// messages with a seeded RNG so lossy-link runs are reproducible.

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::TransportError;
use crate::transport::Transport;

/// Outbound impairments applied by a `MemoryLink` endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultProfile {
    /// Probability a message is silently lost.
    pub drop_rate: f64,
    /// Probability one byte of a delivered message is altered.
    pub corrupt_rate: f64,
    pub seed: u64,
}

impl FaultProfile {
    pub fn lossy(drop_rate: f64, seed: u64) -> Self {
        Self {
            drop_rate,
            corrupt_rate: 0.0,
            seed,
        }
    }
}

struct Faults {
    profile: FaultProfile,
    rng: StdRng,
}

impl Faults {
    fn new(profile: FaultProfile) -> Self {
        Self {
            rng: StdRng::seed_from_u64(profile.seed),
            profile,
        }
    }

    /// Returns `None` if the message is lost.
    fn apply(&mut self, message: &[u8]) -> Option<Vec<u8>> {
        if self.rng.random_bool(self.profile.drop_rate.clamp(0.0, 1.0)) {
            return None;
        }
        let mut out = message.to_vec();
        if !out.is_empty() && self.rng.random_bool(self.profile.corrupt_rate.clamp(0.0, 1.0)) {
            let idx = self.rng.random_range(0..out.len());
            let mask: u8 = self.rng.random_range(1..=u8::MAX);
            out[idx] ^= mask;
        }
        Some(out)
    }
}

pub struct MemoryLink {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    max_len: usize,
    open: bool,
    faults: Option<Faults>,
}

impl MemoryLink {
    /// Two connected endpoints carrying messages of up to `max_len` bytes.
    /// Both start closed.
    pub fn pair(max_len: usize) -> (Self, Self) {
        let (a_tx, b_rx) = unbounded();
        let (b_tx, a_rx) = unbounded();
        (
            Self::endpoint(a_tx, a_rx, max_len),
            Self::endpoint(b_tx, b_rx, max_len),
        )
    }

    fn endpoint(tx: Sender<Vec<u8>>, rx: Receiver<Vec<u8>>, max_len: usize) -> Self {
        Self {
            tx,
            rx,
            max_len,
            open: false,
            faults: None,
        }
    }

    /// Impair everything this endpoint sends.
    pub fn with_faults(mut self, profile: FaultProfile) -> Self {
        self.faults = Some(Faults::new(profile));
        self
    }
}

impl Transport for MemoryLink {
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
        self.open && !self.rx.is_empty()
    }

    fn send(&mut self, message: &[u8]) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        if message.len() > self.max_len {
            return Err(TransportError::MessageTooLong {
                len: message.len(),
                max: self.max_len,
            });
        }
        let delivered = match self.faults.as_mut() {
            Some(faults) => faults.apply(message),
            None => Some(message.to_vec()),
        };
        match delivered {
            Some(msg) => self.tx.send(msg).map_err(|_| TransportError::Closed),
            // Lost in the air; the radio cannot tell.
            None => Ok(()),
        }
    }

    fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        self.rx.try_recv().map_err(|e| match e {
            TryRecvError::Empty => TransportError::Empty,
            TryRecvError::Disconnected => TransportError::Closed,
        })
    }

    fn max_message_len(&self) -> usize {
        self.max_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_pair() -> (MemoryLink, MemoryLink) {
        let (mut a, mut b) = MemoryLink::pair(16);
        a.open().unwrap();
        b.open().unwrap();
        (a, b)
    }

    #[test]
    fn delivers_in_both_directions() {
        let (mut a, mut b) = open_pair();
        assert!(!b.available());
        a.send(b"hello").unwrap();
        assert!(b.available());
        assert_eq!(b.receive().unwrap(), b"hello");
        b.send(b"ACK|0").unwrap();
        assert_eq!(a.receive().unwrap(), b"ACK|0");
        assert!(matches!(a.receive(), Err(TransportError::Empty)));
    }

    #[test]
    fn closed_endpoint_refuses_io() {
        let (mut a, mut b) = MemoryLink::pair(16);
        assert!(matches!(a.send(b"x"), Err(TransportError::NotOpen)));
        b.open().unwrap();
        b.close().unwrap();
        assert!(!b.is_open());
        assert!(matches!(b.receive(), Err(TransportError::NotOpen)));
    }

    #[test]
    fn enforces_message_bound() {
        let (mut a, _b) = open_pair();
        let err = a.send(&[b'x'; 17]).unwrap_err();
        assert!(matches!(err, TransportError::MessageTooLong { len: 17, max: 16 }));
    }

    #[test]
    fn dropped_peer_reports_closed() {
        let (mut a, b) = open_pair();
        drop(b);
        assert!(matches!(a.send(b"x"), Err(TransportError::Closed)));
        assert!(matches!(a.receive(), Err(TransportError::Closed)));
    }

    #[test]
    fn total_loss_delivers_nothing() {
        let (a, mut b) = open_pair();
        let mut a = a.with_faults(FaultProfile::lossy(1.0, 7));
        for _ in 0..10 {
            a.send(b"frame").unwrap();
        }
        assert!(!b.available());
    }

    #[test]
    fn corruption_alters_exactly_one_byte() {
        let (a, mut b) = open_pair();
        let mut a = a.with_faults(FaultProfile {
            drop_rate: 0.0,
            corrupt_rate: 1.0,
            seed: 42,
        });
        a.send(b"0|1|97|YQ==").unwrap();
        let got = b.receive().unwrap();
        let diff = got.iter().zip(b"0|1|97|YQ==").filter(|(x, y)| x != y).count();
        assert_eq!(diff, 1);
    }

    #[test]
    fn same_seed_same_losses() {
        let run = |seed| {
            let (a, mut b) = open_pair();
            let mut a = a.with_faults(FaultProfile::lossy(0.5, seed));
            (0..32u8)
                .map(|i| {
                    a.send(&[i]).unwrap();
                    b.receive().is_ok()
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(run(3), run(3));
    }
}
