//! Listening snapshot receiver.
//!
//! A background accept thread fills a single peer slot; the caller
//! thread reads frames from whoever occupies it. The slot is a
//! `Mutex<Option<Peer>>` tagged with a generation number:
//!
//! - the accept thread only installs a peer into an empty slot;
//! - `receive` clones the peer's `Arc<TcpStream>` under the lock and
//!   reads without holding it, so the socket stays open for the whole
//!   read even if the slot is cleared meanwhile;
//! - on disconnect, `receive` clears the slot only if it still holds the
//!   same generation it was reading from.

use std::fmt;
use std::io::{self, Read};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::codec::DeltaDecoder;
use crate::config::{CodecConfig, ReceiverConfig};
use crate::error::LinkError;
use crate::frame::{FrameVariant, MAX_HEADER_LEN};
use crate::stats::LinkStats;
use crate::transport::{self, ReadOutcome};

// ── SnapshotReader ───────────────────────────────────────────────

/// Reads and decodes frames for one direction of a channel.
///
/// Works on any [`Read`], so fragmented delivery can be exercised
/// without a socket.
pub struct SnapshotReader {
    variant: FrameVariant,
    snapshot_len: usize,
    max_frame: usize,
    header: [u8; MAX_HEADER_LEN],
    /// Payload scratch; grows, never shrinks.
    scratch: Vec<u8>,
    decoder: DeltaDecoder,
    stats: Arc<LinkStats>,
}

impl SnapshotReader {
    pub fn new(variant: FrameVariant, codec: &CodecConfig, stats: Arc<LinkStats>) -> Self {
        Self {
            variant,
            snapshot_len: codec.snapshot_len,
            max_frame: codec.max_frame_size,
            header: [0u8; MAX_HEADER_LEN],
            scratch: Vec::new(),
            decoder: DeltaDecoder::from_config(codec),
            stats,
        }
    }

    /// Read exactly one frame and decode it.
    ///
    /// The decoded snapshot is available from
    /// [`snapshot`](Self::snapshot) until the next call.
    pub fn read_frame<R: Read + ?Sized>(&mut self, reader: &mut R) -> Result<(), LinkError> {
        let header_len = self.variant.header_len();
        if let ReadOutcome::Disconnected { read } =
            transport::read_full(reader, &mut self.header[..header_len])
        {
            debug!("stream ended after {read}/{header_len} header bytes");
            return Err(LinkError::Disconnected);
        }

        let header =
            self.variant
                .parse_header(&self.header[..header_len], self.snapshot_len, self.max_frame)?;

        let payload_len = header.payload_len;
        if self.scratch.len() < payload_len {
            self.scratch.resize(payload_len, 0);
        }
        if let ReadOutcome::Disconnected { read } =
            transport::read_full(reader, &mut self.scratch[..payload_len])
        {
            debug!("stream ended after {read}/{payload_len} payload bytes");
            return Err(LinkError::Disconnected);
        }

        self.decoder
            .decode(&self.scratch[..payload_len], header.original_len)?;
        self.stats.record_frame(
            self.decoder.output().len(),
            header_len + payload_len,
            header.is_compressed(),
        );
        Ok(())
    }

    /// The most recently decoded snapshot.
    pub fn snapshot(&self) -> &[u8] {
        self.decoder.output()
    }

    pub fn reset_baseline(&mut self) {
        self.decoder.reset();
    }
}

// ── Peer slot ────────────────────────────────────────────────────

struct Peer {
    stream: Arc<TcpStream>,
    addr: SocketAddr,
    generation: u64,
}

#[derive(Default)]
struct Slot {
    peer: Option<Peer>,
    generation: u64,
}

struct Shared {
    slot: Mutex<Slot>,
    running: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn has_peer(&self) -> bool {
        self.lock().peer.is_some()
    }

    /// Put a freshly accepted stream into the slot, closing any stale
    /// occupant.
    fn install(&self, stream: TcpStream, addr: SocketAddr) {
        let mut slot = self.lock();
        if let Some(old) = slot.peer.take() {
            let _ = old.stream.shutdown(Shutdown::Both);
        }
        slot.generation += 1;
        let generation = slot.generation;
        slot.peer = Some(Peer {
            stream: Arc::new(stream),
            addr,
            generation,
        });
    }

    /// Clear the slot if it still holds `generation`.
    fn evict(&self, generation: u64) -> Option<SocketAddr> {
        let mut slot = self.lock();
        match &slot.peer {
            Some(peer) if peer.generation == generation => {
                let peer = slot.peer.take()?;
                let _ = peer.stream.shutdown(Shutdown::Both);
                Some(peer.addr)
            }
            _ => None,
        }
    }
}

// ── Receiver ─────────────────────────────────────────────────────

/// Listens for one peer at a time and decodes its snapshot stream.
///
/// Dropping the receiver stops the accept thread and closes the peer.
pub struct Receiver {
    shared: Arc<Shared>,
    local_addr: SocketAddr,
    accept_thread: Option<JoinHandle<()>>,
    reader: SnapshotReader,
    /// Generation the reader's baseline belongs to.
    generation: u64,
    reset_on_reconnect: bool,
    stats: Arc<LinkStats>,
}

impl Receiver {
    /// Bind `addr` and start accepting.
    pub fn listen<A>(addr: A, codec: CodecConfig, config: ReceiverConfig) -> Result<Self, LinkError>
    where
        A: ToSocketAddrs + fmt::Debug,
    {
        let listener = TcpListener::bind(&addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        info!("receiver listening on {local_addr} ({:?} frames)", config.variant);

        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot::default()),
            running: AtomicBool::new(true),
        });

        let accept_shared = Arc::clone(&shared);
        let accept_thread = thread::Builder::new()
            .name("snaplink-accept".into())
            .spawn(move || accept_loop(listener, accept_shared, config))?;

        let stats = Arc::new(LinkStats::new());
        Ok(Self {
            shared,
            local_addr,
            accept_thread: Some(accept_thread),
            reader: SnapshotReader::new(config.variant, &codec, Arc::clone(&stats)),
            generation: 0,
            reset_on_reconnect: codec.reset_baseline_on_reconnect,
            stats,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_connected(&self) -> bool {
        self.shared.has_peer()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared.lock().peer.as_ref().map(|p| p.addr)
    }

    pub fn stats(&self) -> Arc<LinkStats> {
        Arc::clone(&self.stats)
    }

    /// Whether a subsequent [`receive`](Self::receive) has data (or a
    /// disconnect) to report, waiting up to `timeout`.
    ///
    /// Always `false` without a peer. Changes the socket's blocking mode
    /// briefly, so it should be called from the thread that receives.
    /// A peer whose socket cannot be put back into blocking mode is
    /// dropped.
    pub fn poll_ready(&self, timeout: Duration) -> bool {
        let Some((stream, generation)) = self.current_stream() else {
            return false;
        };

        let mut probe = [0u8; 1];
        let (peeked, restored) = if timeout.is_zero() {
            let result = stream
                .set_nonblocking(true)
                .and_then(|()| stream.peek(&mut probe));
            (result, stream.set_nonblocking(false))
        } else {
            let result = stream
                .set_read_timeout(Some(timeout))
                .and_then(|()| stream.peek(&mut probe));
            (result, stream.set_read_timeout(None))
        };

        if let Err(e) = restored {
            self.drop_unusable(generation, &e);
            return false;
        }

        match peeked {
            Ok(_) => true,
            Err(e) if is_timeout(&e) => false,
            // Hard errors surface on the next receive.
            Err(_) => true,
        }
    }

    /// Block until one snapshot arrives and return it.
    ///
    /// The slice borrows an internal buffer and is valid until the next
    /// call. A disconnect clears the peer slot so the accept thread can
    /// take the next peer; a decode error does the same, since the
    /// baseline can no longer be trusted.
    pub fn receive(&mut self) -> Result<&[u8], LinkError> {
        let Some((stream, generation)) = self.current_stream() else {
            return Err(LinkError::NotConnected);
        };

        if generation != self.generation {
            if self.reset_on_reconnect {
                self.reader.reset_baseline();
            }
            self.generation = generation;
        }

        let mut source: &TcpStream = &stream;
        if let Err(e) = self.reader.read_frame(&mut source) {
            if let Some(addr) = self.shared.evict(generation) {
                match &e {
                    LinkError::Disconnected => info!("peer {addr} disconnected"),
                    other => warn!("dropping peer {addr}: {other}"),
                }
            }
            return Err(e);
        }
        Ok(self.reader.snapshot())
    }

    /// Evict a peer whose socket is left in a state `receive` cannot use.
    fn drop_unusable(&self, generation: u64, e: &io::Error) {
        if let Some(addr) = self.shared.evict(generation) {
            warn!("dropping peer {addr}: cannot restore blocking reads: {e}");
        }
    }

    fn current_stream(&self) -> Option<(Arc<TcpStream>, u64)> {
        self.shared
            .lock()
            .peer
            .as_ref()
            .map(|p| (Arc::clone(&p.stream), p.generation))
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.accept_thread.take() {
            if handle.join().is_err() {
                warn!("accept thread panicked");
            }
        }
        if let Some(peer) = self.shared.lock().peer.take() {
            let _ = peer.stream.shutdown(Shutdown::Both);
        }
        info!("receiver on {} stopped", self.local_addr);
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

// ── Accept loop ──────────────────────────────────────────────────

fn accept_loop(listener: TcpListener, shared: Arc<Shared>, config: ReceiverConfig) {
    while shared.running.load(Ordering::SeqCst) {
        if shared.has_peer() {
            thread::sleep(config.occupied_backoff());
            continue;
        }

        match listener.accept() {
            Ok((stream, addr)) => {
                if let Err(e) = prepare(&stream) {
                    warn!("rejecting {addr}: {e}");
                    continue;
                }
                shared.install(stream, addr);
                info!("accepted {addr} (TCP_NODELAY)");
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(config.accept_poll());
            }
            Err(e) => {
                warn!("accept error: {e}");
                thread::sleep(config.accept_poll());
            }
        }
    }
    debug!("accept loop stopped");
}

/// Accepted sockets may inherit the listener's non-blocking mode.
fn prepare(stream: &TcpStream) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    transport::tune_low_latency(stream)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DeltaEncoder;
    use crate::sender::SnapshotWriter;
    use std::io::Cursor;
    use std::time::Instant;

    /// Yields between one and three bytes per read.
    struct Trickle {
        inner: Cursor<Vec<u8>>,
        calls: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.calls += 1;
            let n = buf.len().min(1 + self.calls % 3);
            self.inner.read(&mut buf[..n])
        }
    }

    fn sample_snapshots() -> Vec<Vec<u8>> {
        let mut current = vec![0u8; 4000];
        let mut out = Vec::new();
        for step in 0..8usize {
            current[step * 100] = step as u8 + 1;
            out.push(current.clone());
            out.push(vec![step as u8; 800]);
        }
        out
    }

    fn encode_stream(variant: FrameVariant, snapshots: &[Vec<u8>]) -> Vec<u8> {
        let codec = CodecConfig::default();
        let encoder = match variant {
            FrameVariant::Paired => DeltaEncoder::above_threshold(&codec),
            FrameVariant::Single => DeltaEncoder::exact_size(&codec),
        };
        let mut writer = SnapshotWriter::new(variant, encoder, Arc::new(LinkStats::new()));
        let mut wire = Vec::new();
        for s in snapshots {
            writer.write(&mut wire, s).unwrap();
        }
        wire
    }

    fn decode_stream<R: Read>(variant: FrameVariant, mut source: R, count: usize) -> Vec<Vec<u8>> {
        let mut reader =
            SnapshotReader::new(variant, &CodecConfig::default(), Arc::new(LinkStats::new()));
        (0..count)
            .map(|_| {
                reader.read_frame(&mut source).unwrap();
                reader.snapshot().to_vec()
            })
            .collect()
    }

    #[test]
    fn fragmented_delivery_matches_single_shot() {
        let snapshots = sample_snapshots();
        let wire = encode_stream(FrameVariant::Paired, &snapshots);

        let whole = decode_stream(FrameVariant::Paired, Cursor::new(wire.clone()), snapshots.len());
        let trickled = decode_stream(
            FrameVariant::Paired,
            Trickle {
                inner: Cursor::new(wire),
                calls: 0,
            },
            snapshots.len(),
        );
        assert_eq!(whole, snapshots);
        assert_eq!(trickled, snapshots);
    }

    #[test]
    fn single_variant_stream_decodes() {
        let mut snapshots = Vec::new();
        let mut current = vec![0u8; 3072];
        for step in 0..5usize {
            current[step * 7] ^= 0xFF;
            snapshots.push(current.clone());
        }
        snapshots.push(vec![9u8; 5000]);

        let wire = encode_stream(FrameVariant::Single, &snapshots);
        let decoded = decode_stream(FrameVariant::Single, Cursor::new(wire), snapshots.len());
        assert_eq!(decoded, snapshots);
    }

    #[test]
    fn truncated_header_is_disconnect() {
        let wire = encode_stream(FrameVariant::Paired, &[vec![1u8; 100]]);
        let mut reader =
            SnapshotReader::new(FrameVariant::Paired, &CodecConfig::default(), Arc::new(LinkStats::new()));
        let err = reader.read_frame(&mut Cursor::new(&wire[..5])).unwrap_err();
        assert!(matches!(err, LinkError::Disconnected));
    }

    #[test]
    fn truncated_payload_is_disconnect() {
        let wire = encode_stream(FrameVariant::Paired, &[vec![1u8; 100]]);
        let mut reader =
            SnapshotReader::new(FrameVariant::Paired, &CodecConfig::default(), Arc::new(LinkStats::new()));
        let mut source = Cursor::new(&wire[..50]);
        let err = reader.read_frame(&mut source).unwrap_err();
        assert!(matches!(err, LinkError::Disconnected));
        assert_eq!(source.position(), 50);
    }

    #[test]
    fn corrupt_payload_is_decode_error() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&4i32.to_le_bytes());
        wire.extend_from_slice(&4000i32.to_le_bytes());
        wire.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);

        let mut reader =
            SnapshotReader::new(FrameVariant::Paired, &CodecConfig::default(), Arc::new(LinkStats::new()));
        let err = reader.read_frame(&mut Cursor::new(wire)).unwrap_err();
        assert!(matches!(err, LinkError::Decode(_)));
    }

    #[test]
    fn scratch_grows_but_never_shrinks() {
        let wire = encode_stream(
            FrameVariant::Paired,
            &[vec![1u8; 1000], vec![2u8; 10]],
        );
        let mut reader =
            SnapshotReader::new(FrameVariant::Paired, &CodecConfig::default(), Arc::new(LinkStats::new()));
        let mut source = Cursor::new(wire);
        reader.read_frame(&mut source).unwrap();
        reader.read_frame(&mut source).unwrap();
        assert_eq!(reader.snapshot(), &[2u8; 10]);
        assert_eq!(reader.scratch.len(), 1000);
    }

    #[test]
    fn receive_without_peer_is_not_connected() {
        let mut receiver = Receiver::listen(
            "127.0.0.1:0",
            CodecConfig::default(),
            ReceiverConfig::default(),
        )
        .unwrap();
        assert!(!receiver.is_connected());
        assert!(!receiver.poll_ready(Duration::ZERO));
        assert!(matches!(receiver.receive(), Err(LinkError::NotConnected)));
    }

    #[test]
    fn accepts_and_reports_peer() {
        let receiver = Receiver::listen(
            "127.0.0.1:0",
            CodecConfig::default(),
            ReceiverConfig::default(),
        )
        .unwrap();
        let _client = TcpStream::connect(receiver.local_addr()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !receiver.is_connected() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(receiver.is_connected());
        assert!(receiver.peer_addr().is_some());
        assert!(!receiver.poll_ready(Duration::from_millis(20)));
    }

    #[test]
    fn unusable_socket_evicts_peer() {
        let mut receiver = Receiver::listen(
            "127.0.0.1:0",
            CodecConfig::default(),
            ReceiverConfig::default(),
        )
        .unwrap();
        let mut client = TcpStream::connect(receiver.local_addr()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !receiver.is_connected() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let (_, generation) = receiver.current_stream().unwrap();

        // A stale generation leaves the current peer alone.
        receiver.drop_unusable(generation + 1, &io::Error::other("stale"));
        assert!(receiver.is_connected());

        receiver.drop_unusable(generation, &io::Error::other("setsockopt failed"));
        assert!(!receiver.is_connected());
        assert!(matches!(receiver.receive(), Err(LinkError::NotConnected)));

        // The evicted socket is shut down, so the client sees EOF.
        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).unwrap(), 0);
    }
}
