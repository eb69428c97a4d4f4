/// Integration test: run sender and receiver on two threads over a link and
/// verify the payload arrives intact.
///
/// Uses the real clock with short timeouts so retransmission paths run for
/// real against thread scheduling.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use lorachunk::transport::Transport;
use lorachunk::{
    FaultProfile, Frame, MemoryLink, MemoryLogger, ReceiveOutcome, ReceiverConfig, SendOutcome,
    SenderConfig, SystemClock, TransferConfig, TransferError, TransferEvent, TransportError,
    UdpTransport, DEFAULT_MAX_MESSAGE_LEN, decode_frame, encode_frame, is_sentinel,
    receive_transfer, run_sender,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn fast_config() -> TransferConfig {
    TransferConfig {
        ack_timeout: Duration::from_millis(50),
        poll_interval: Duration::from_millis(1),
        max_retries: 20,
        idle_timeout: Some(Duration::from_secs(10)),
        ..Default::default()
    }
}

fn test_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Run one transfer between `tx` and `rx` and return both outcomes.
fn run_pair<T, R>(
    mut tx: T,
    mut rx: R,
    payload: Vec<u8>,
    transfer: TransferConfig,
) -> (SendOutcome, ReceiveOutcome)
where
    T: Transport + Send + 'static,
    R: Transport + Send + 'static,
{
    init_tracing();
    let recv_cfg = ReceiverConfig {
        transfer: transfer.clone(),
        ..Default::default()
    };
    let receiver = thread::spawn(move || {
        rx.open().unwrap();
        let outcome = receive_transfer(&mut rx, &SystemClock::new(), &recv_cfg);
        rx.close().unwrap();
        outcome
    });

    let send_cfg = SenderConfig {
        transfer,
        ..Default::default()
    };
    tx.open().unwrap();
    let sent = run_sender(&mut tx, &SystemClock::new(), &payload, &send_cfg).unwrap();
    tx.close().unwrap();

    let received = receiver.join().unwrap().unwrap();
    (sent, received)
}

fn open_memory_pair() -> (MemoryLink, MemoryLink) {
    MemoryLink::pair(DEFAULT_MAX_MESSAGE_LEN)
}

#[test]
fn memory_link_300_bytes() {
    let payload = test_payload(300);
    let (a, b) = open_memory_pair();
    let (sent, received) = run_pair(a, b, payload.clone(), fast_config());

    let report = sent.into_result().unwrap();
    assert_eq!(report.total_chunks, 3);
    assert_eq!(report.stats.retransmits, 0);

    let (got, recv_report) = received.into_result().unwrap();
    assert_eq!(got, payload);
    assert_eq!(recv_report.total_chunks, 3);
}

#[test]
fn memory_link_sizes_and_chunk_sizes() {
    for &chunk_size in &[1usize, 7, 64, 128] {
        for &len in &[0usize, 1, chunk_size, chunk_size + 1, 3 * chunk_size, 1000] {
            let payload = test_payload(len);
            let (a, b) = open_memory_pair();
            let transfer = TransferConfig {
                chunk_size,
                ..fast_config()
            };
            let (sent, received) = run_pair(a, b, payload.clone(), transfer);
            assert!(sent.is_success(), "send failed len={} chunk={}", len, chunk_size);
            let (got, _) = received.into_result().unwrap();
            assert_eq!(got, payload, "len={} chunk={}", len, chunk_size);
        }
    }
}

#[test]
fn lossy_ack_path_recovers() {
    let payload = test_payload(4000);
    let (a, b) = open_memory_pair();
    // Receiver's acks are lost or mangled; data path is clean so EOF always lands.
    let b = b.with_faults(FaultProfile {
        drop_rate: 0.25,
        corrupt_rate: 0.15,
        seed: 0x5EED,
    });
    let (sent, received) = run_pair(a, b, payload.clone(), fast_config());

    let report = sent.into_result().unwrap();
    assert!(report.stats.retransmits > 0);

    let (got, recv_report) = received.into_result().unwrap();
    assert_eq!(got, payload);
    assert!(recv_report.stats.duplicates > 0);
}

#[test]
fn corrupted_data_path_always_terminates_with_a_value() {
    init_tracing();
    for seed in [1u64, 7, 42, 0xC0FFEE] {
        let payload = test_payload(1500);
        let (a, b) = open_memory_pair();
        // Header bytes get hit too, including the sentinel.
        let mut a = a.with_faults(FaultProfile {
            drop_rate: 0.05,
            corrupt_rate: 0.2,
            seed,
        });
        let mut b = b;
        a.open().unwrap();
        b.open().unwrap();
        let transfer = TransferConfig {
            max_retries: 8,
            idle_timeout: Some(Duration::from_millis(500)),
            ..fast_config()
        };

        let recv_cfg = ReceiverConfig {
            transfer: transfer.clone(),
            ..Default::default()
        };
        let receiver = thread::spawn(move || receive_transfer(&mut b, &SystemClock::new(), &recv_cfg));
        let send_cfg = SenderConfig {
            transfer,
            ..Default::default()
        };
        let sent = run_sender(&mut a, &SystemClock::new(), &payload, &send_cfg).unwrap();
        let received = receiver.join().unwrap();

        match received {
            Ok(ReceiveOutcome::Assembled { .. }) => {}
            Ok(ReceiveOutcome::Incomplete {
                received_count,
                missing,
                ..
            }) => {
                // One range per gap between stored chunks, at most.
                assert!(missing.ranges().len() <= received_count + 1, "seed={}", seed);
            }
            Err(TransferError::IdleTimeout) => {}
            Err(other) => panic!("seed={} unexpected receiver error: {}", seed, other),
        }
        if let SendOutcome::PartialFailure { attempts, .. } = sent {
            assert_eq!(attempts, 8, "seed={}", seed);
        }
    }
}

/// Wraps a transport and spoils the checksum of each frame's first transmission.
struct CorruptFirstAttempt<T> {
    inner: T,
    seen: HashSet<u32>,
}

impl<T: Transport> Transport for CorruptFirstAttempt<T> {
    fn open(&mut self) -> Result<(), TransportError> {
        self.inner.open()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.inner.close()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn available(&mut self) -> bool {
        self.inner.available()
    }

    fn send(&mut self, message: &[u8]) -> Result<(), TransportError> {
        match decode_frame(message) {
            Ok(frame) if self.seen.insert(frame.chunk_id) => {
                let spoiled = Frame {
                    checksum: frame.checksum.wrapping_add(1),
                    ..frame
                };
                self.inner.send(&encode_frame(&spoiled))
            }
            _ => self.inner.send(message),
        }
    }

    fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        self.inner.receive()
    }

    fn max_message_len(&self) -> usize {
        self.inner.max_message_len()
    }
}

#[test]
fn corrupted_frames_are_nacked_and_resent() {
    let payload = test_payload(500);
    let (a, b) = open_memory_pair();
    let a = CorruptFirstAttempt {
        inner: a,
        seen: HashSet::new(),
    };
    let (sent, received) = run_pair(a, b, payload.clone(), fast_config());

    let report = sent.into_result().unwrap();
    assert_eq!(report.total_chunks, 4);
    assert_eq!(report.stats.nacks, 4);
    assert_eq!(report.stats.retransmits, 4);

    let (got, recv_report) = received.into_result().unwrap();
    assert_eq!(got, payload);
    assert_eq!(recv_report.stats.rejected, 4);
}

#[test]
fn silent_receiver_fails_on_first_chunk() {
    init_tracing();
    let (mut a, mut b) = open_memory_pair();
    a.open().unwrap();
    b.open().unwrap();
    let logger = MemoryLogger::new();
    let cfg = SenderConfig {
        transfer: TransferConfig {
            ack_timeout: Duration::from_millis(10),
            poll_interval: Duration::from_millis(1),
            max_retries: 3,
            ..Default::default()
        },
        logger: Some(logger.clone()),
        ..Default::default()
    };

    let outcome = run_sender(&mut a, &SystemClock::new(), &test_payload(300), &cfg).unwrap();

    let err = outcome.into_result().unwrap_err();
    assert!(matches!(
        err,
        TransferError::RetryBudgetExhausted { chunk_id: 0, attempts: 3, .. }
    ));

    // Three copies of chunk 0 on the air, nothing else.
    let mut on_air = Vec::new();
    while let Ok(msg) = b.receive() {
        on_air.push(msg);
    }
    assert_eq!(on_air.len(), 3);
    assert!(on_air.iter().all(|m| decode_frame(m).map(|f| f.chunk_id) == Ok(0)));
    assert!(!on_air.iter().any(|m| is_sentinel(m)));
    assert!(logger.events().contains(&TransferEvent::ChunkFailed {
        chunk_id: 0,
        attempts: 3
    }));
}

#[test]
fn receiver_cancelled_from_another_thread() {
    init_tracing();
    let (_a, mut b) = open_memory_pair();
    b.open().unwrap();
    let cfg = ReceiverConfig {
        transfer: TransferConfig {
            poll_interval: Duration::from_millis(1),
            ..Default::default()
        },
        ..Default::default()
    };
    let cancel = cfg.cancel.clone();

    let handle = thread::spawn(move || receive_transfer(&mut b, &SystemClock::new(), &cfg));
    thread::sleep(Duration::from_millis(20));
    cancel.cancel();

    let result = handle.join().unwrap();
    assert!(matches!(result, Err(TransferError::Cancelled)));
}

#[test]
fn udp_loopback_transfer() {
    let loopback: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let mut a = UdpTransport::new(loopback, loopback, DEFAULT_MAX_MESSAGE_LEN);
    let mut b = UdpTransport::new(loopback, loopback, DEFAULT_MAX_MESSAGE_LEN);
    a.open().unwrap();
    b.open().unwrap();
    let a_addr = a.local_addr().unwrap();
    let b_addr = b.local_addr().unwrap();
    a.set_peer(b_addr);
    b.set_peer(a_addr);

    let payload = test_payload(2048);
    let (sent, received) = run_pair(a, b, payload.clone(), fast_config());

    assert!(sent.is_success());
    let (got, _) = received.into_result().unwrap();
    assert_eq!(got, payload);
}

#[test]
fn tracing_logger_smoke() {
    init_tracing();
    let (a, b) = open_memory_pair();
    let mut transfer = fast_config();
    transfer.chunk_size = 16;
    let payload = test_payload(40);

    let mut b = b;
    let mut a = a;
    a.open().unwrap();
    b.open().unwrap();
    let recv_cfg = ReceiverConfig {
        transfer: transfer.clone(),
        logger: Some(Arc::new(lorachunk::TracingLogger)),
        ..Default::default()
    };
    let receiver = thread::spawn(move || receive_transfer(&mut b, &SystemClock::new(), &recv_cfg));
    let send_cfg = SenderConfig {
        transfer,
        logger: Some(Arc::new(lorachunk::TracingLogger)),
        ..Default::default()
    };
    assert!(run_sender(&mut a, &SystemClock::new(), &payload, &send_cfg)
        .unwrap()
        .is_success());
    let (got, _) = receiver.join().unwrap().unwrap().into_result().unwrap();
    assert_eq!(got, payload);
}
