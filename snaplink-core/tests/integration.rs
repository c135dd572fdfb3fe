//! Integration tests: sender → receiver over a real TCP connection on
//! localhost, reconnects, baseline policies and error scenarios.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

use snaplink_core::{
    AsyncSender, AsyncSenderConfig, BaselinePolicy, CodecConfig, FrameVariant, LinkError,
    Receiver, ReceiverConfig, SyncSender,
};

// ── Helpers ──────────────────────────────────────────────────────

fn listen(variant: FrameVariant) -> Receiver {
    Receiver::listen(
        "127.0.0.1:0",
        CodecConfig::default(),
        ReceiverConfig {
            variant,
            ..ReceiverConfig::default()
        },
    )
    .unwrap()
}

/// Wait until the accept thread has installed a peer.
fn wait_for_peer(receiver: &Receiver) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !receiver.is_connected() {
        assert!(Instant::now() < deadline, "no peer accepted");
        thread::sleep(Duration::from_millis(5));
    }
}

/// Receive one snapshot, failing instead of hanging when nothing comes.
fn recv(receiver: &mut Receiver) -> Result<Vec<u8>, LinkError> {
    wait_for_peer(receiver);
    assert!(
        receiver.poll_ready(Duration::from_secs(5)),
        "timed out waiting for a frame"
    );
    receiver.receive().map(<[u8]>::to_vec)
}

/// A 4000-byte snapshot whose bytes 0..count are bumped by `step`.
fn telemetry(step: u8, count: usize) -> Vec<u8> {
    let mut s: Vec<u8> = (0..4000u32).map(|i| (i % 251) as u8).collect();
    for b in s.iter_mut().take(count) {
        *b = b.wrapping_add(step);
    }
    s
}

// ── Ordering ─────────────────────────────────────────────────────

#[test]
fn sync_sender_snapshots_arrive_in_order() {
    let mut receiver = listen(FrameVariant::Paired);
    let addr = receiver.local_addr();

    let snapshots: Vec<Vec<u8>> = (0..40u8)
        .map(|i| if i % 5 == 0 { vec![i; 800] } else { telemetry(i, 10) })
        .collect();

    let expected = snapshots.clone();
    let producer = thread::spawn(move || {
        let mut sender = SyncSender::new(CodecConfig::default());
        sender.connect(addr).unwrap();
        for s in &snapshots {
            sender.send(s).unwrap();
        }
        sender
    });

    for want in &expected {
        assert_eq!(&recv(&mut receiver).unwrap(), want);
    }
    let sender = producer.join().unwrap();
    assert_eq!(sender.stats().report().frames, 40);
    assert_eq!(receiver.stats().report().frames, 40);
}

#[test]
fn async_sender_to_single_length_receiver() {
    let mut receiver = listen(FrameVariant::Single);
    let addr = receiver.local_addr();

    let mut current = vec![0u8; 3072];
    let snapshots: Vec<Vec<u8>> = (0..100usize)
        .map(|i| {
            current[(i * 31) % 3072] ^= 0x5A;
            current.clone()
        })
        .collect();

    let mut sender = AsyncSender::new(CodecConfig::default(), AsyncSenderConfig::default());
    sender.connect(addr).unwrap();
    for s in &snapshots {
        sender.send(s).unwrap();
    }

    for want in &snapshots {
        assert_eq!(&recv(&mut receiver).unwrap(), want);
    }
    sender.close();

    let report = receiver.stats().report();
    assert_eq!(report.frames, 100);
    assert!(report.compressed_frames > 90);
    assert!(report.wire_bytes < report.snapshot_bytes / 4);
}

// ── Compression behaviour ────────────────────────────────────────

#[test]
fn small_change_compresses_and_small_snapshot_stays_raw() {
    let mut receiver = listen(FrameVariant::Paired);
    let mut sender = SyncSender::new(CodecConfig::default());
    sender.connect(receiver.local_addr()).unwrap();

    let first = telemetry(0, 0);
    let second = telemetry(1, 10);
    let small = vec![0x42u8; 800];

    sender.send(&first).unwrap();
    assert_eq!(recv(&mut receiver).unwrap(), first);
    let after_first = sender.stats().report().wire_bytes;

    sender.send(&second).unwrap();
    assert_eq!(recv(&mut receiver).unwrap(), second);
    let second_wire = sender.stats().report().wire_bytes - after_first;
    assert!(second_wire < 100, "delta frame was {second_wire} bytes");

    sender.send(&small).unwrap();
    assert_eq!(recv(&mut receiver).unwrap(), small);
    let report = sender.stats().report();
    assert_eq!(report.wire_bytes - after_first - second_wire, 808);
    assert_eq!(report.compressed_frames, 2);
}

#[test]
fn compressed_only_policy_diverges_after_raw_fallback() {
    let run = |policy: BaselinePolicy| -> (Vec<u8>, Vec<u8>) {
        let mut receiver = listen(FrameVariant::Paired);
        let mut sender = SyncSender::new(CodecConfig {
            baseline_policy: policy,
            ..CodecConfig::default()
        });
        sender.connect(receiver.local_addr()).unwrap();

        let a = telemetry(0, 0);
        let b = telemetry(3, 16);
        sender.send(&a).unwrap();
        recv(&mut receiver).unwrap();
        sender.send(&[0x99u8; 800]).unwrap();
        recv(&mut receiver).unwrap();
        sender.send(&b).unwrap();
        (b, recv(&mut receiver).unwrap())
    };

    let (sent, got) = run(BaselinePolicy::AlwaysResync);
    assert_eq!(got, sent);

    let (sent, got) = run(BaselinePolicy::CompressedOnly);
    assert_eq!(got.len(), sent.len());
    assert_ne!(got, sent);
}

// ── Connection lifecycle ─────────────────────────────────────────

#[test]
fn receiver_accepts_next_peer_after_disconnect() {
    let mut receiver = listen(FrameVariant::Paired);
    let addr = receiver.local_addr();

    let mut first = SyncSender::new(CodecConfig::default());
    first.connect(addr).unwrap();
    first.send(&telemetry(1, 50)).unwrap();
    assert_eq!(recv(&mut receiver).unwrap(), telemetry(1, 50));
    let first_peer = receiver.peer_addr();
    first.close();

    assert!(matches!(recv(&mut receiver), Err(LinkError::Disconnected)));
    assert!(!receiver.is_connected());

    // Fresh sender, fresh baseline: the receiver must reset too.
    let mut second = SyncSender::new(CodecConfig::default());
    second.connect(addr).unwrap();
    second.send(&telemetry(2, 10)).unwrap();
    assert_eq!(recv(&mut receiver).unwrap(), telemetry(2, 10));
    assert_ne!(receiver.peer_addr(), first_peer);
}

#[test]
fn sender_reconnect_resets_baseline() {
    let mut receiver = listen(FrameVariant::Paired);
    let addr = receiver.local_addr();

    let mut sender = SyncSender::new(CodecConfig::default());
    sender.connect(addr).unwrap();
    sender.send(&telemetry(1, 10)).unwrap();
    recv(&mut receiver).unwrap();
    sender.close();
    assert!(recv(&mut receiver).is_err());

    sender.connect(addr).unwrap();
    sender.send(&telemetry(2, 10)).unwrap();
    assert_eq!(recv(&mut receiver).unwrap(), telemetry(2, 10));
}

#[test]
fn second_peer_waits_while_slot_is_occupied() {
    let mut receiver = listen(FrameVariant::Paired);
    let addr = receiver.local_addr();

    let mut first = SyncSender::new(CodecConfig::default());
    first.connect(addr).unwrap();
    wait_for_peer(&receiver);
    let first_peer = receiver.peer_addr();

    let mut second = SyncSender::new(CodecConfig::default());
    second.connect(addr).unwrap();
    second.send(&[2u8; 64]).unwrap();
    thread::sleep(Duration::from_millis(250));
    assert_eq!(receiver.peer_addr(), first_peer);

    first.send(&[1u8; 64]).unwrap();
    assert_eq!(recv(&mut receiver).unwrap(), vec![1u8; 64]);
    first.close();
    assert!(recv(&mut receiver).is_err());

    // The queued connection is picked up from the backlog.
    assert_eq!(recv(&mut receiver).unwrap(), vec![2u8; 64]);
}

// ── Error scenarios ──────────────────────────────────────────────

#[test]
fn corrupt_frame_drops_the_peer() {
    let mut receiver = listen(FrameVariant::Paired);
    let mut raw = TcpStream::connect(receiver.local_addr()).unwrap();

    let mut frame = Vec::new();
    frame.extend_from_slice(&6i32.to_le_bytes());
    frame.extend_from_slice(&4000i32.to_le_bytes());
    frame.extend_from_slice(b"bogus!");
    raw.write_all(&frame).unwrap();

    assert!(matches!(recv(&mut receiver), Err(LinkError::Decode(_))));
    assert!(!receiver.is_connected());

    raw.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut buf = [0u8; 1];
    assert_eq!(raw.read(&mut buf).unwrap_or(0), 0);
}

#[test]
fn negative_length_is_rejected() {
    let mut receiver = listen(FrameVariant::Paired);
    let mut raw = TcpStream::connect(receiver.local_addr()).unwrap();
    raw.write_all(&(-1i32).to_le_bytes()).unwrap();
    raw.write_all(&8i32.to_le_bytes()).unwrap();

    assert!(matches!(
        recv(&mut receiver),
        Err(LinkError::InvalidLength(-1))
    ));
    assert!(!receiver.is_connected());
}

#[test]
fn partial_header_then_close_is_disconnect() {
    let mut receiver = listen(FrameVariant::Paired);
    let mut raw = TcpStream::connect(receiver.local_addr()).unwrap();
    raw.write_all(&[1, 0, 0]).unwrap();
    drop(raw);

    assert!(matches!(recv(&mut receiver), Err(LinkError::Disconnected)));
}
