//! Queued snapshot sender.
//!
//! `send` copies the snapshot into a bounded FIFO and returns; a single
//! drain thread pops entries in order, runs the delta codec and writes
//! single-length frames. Encoding on the drain thread keeps the encoder
//! baseline in step with what actually reaches the wire, so discarding
//! queued entries never desynchronizes the peer.
//!
//! ```text
//! caller ──send──► [queue] ──drain thread──► encode ──► socket
//! ```
//!
//! Shutdown: [`close`](AsyncSender::close) lets the thread finish the
//! queue before it exits, for at most `close_timeout_ms`;
//! [`abort`](AsyncSender::abort) discards it and shuts the socket down
//! at once. Either way the socket is cut before joining, so a peer that
//! stopped reading cannot hold the caller.

use std::collections::VecDeque;
use std::fmt;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::codec::DeltaEncoder;
use crate::config::{AsyncSenderConfig, CodecConfig, OverflowPolicy};
use crate::error::LinkError;
use crate::frame::FrameVariant;
use crate::sender::SnapshotWriter;
use crate::stats::LinkStats;
use crate::transport;

// ── Shared state ─────────────────────────────────────────────────

struct QueueState {
    entries: VecDeque<Vec<u8>>,
    /// Cleared to ask the drain thread to exit once the queue is empty.
    running: bool,
    /// Set by the drain thread just before it returns.
    finished: bool,
}

struct Shared {
    queue: Mutex<QueueState>,
    /// Signalled when an entry is pushed or shutdown is requested.
    available: Condvar,
    /// Signalled when an entry is popped, the connection dies or the
    /// drain thread finishes.
    space: Condvar,
    connected: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── AsyncSender ──────────────────────────────────────────────────

/// Sender whose `send` only enqueues; I/O happens on a background
/// thread.
///
/// Only snapshots of exactly `snapshot_len` bytes are delta-coded.
/// Dropping the sender is equivalent to [`close`](Self::close).
pub struct AsyncSender {
    codec: CodecConfig,
    config: AsyncSenderConfig,
    shared: Arc<Shared>,
    /// The drain thread hands its writer back on exit so the baseline
    /// can outlive a connection.
    worker: Option<JoinHandle<SnapshotWriter>>,
    writer: Option<SnapshotWriter>,
    /// Second handle on the drain thread's socket, used to unblock it.
    control: Option<TcpStream>,
    stats: Arc<LinkStats>,
}

impl AsyncSender {
    pub fn new(codec: CodecConfig, config: AsyncSenderConfig) -> Self {
        Self {
            codec,
            config,
            shared: Arc::new(Shared {
                queue: Mutex::new(QueueState {
                    entries: VecDeque::with_capacity(config.queue_capacity),
                    running: false,
                    finished: false,
                }),
                available: Condvar::new(),
                space: Condvar::new(),
                connected: AtomicBool::new(false),
            }),
            worker: None,
            writer: None,
            control: None,
            stats: Arc::new(LinkStats::new()),
        }
    }

    /// Connect to `addr` and start the drain thread.
    ///
    /// An existing connection is closed (and drained) first. The
    /// baseline is zeroed unless `reset_baseline_on_reconnect` is off.
    pub fn connect<A>(&mut self, addr: A) -> Result<(), LinkError>
    where
        A: ToSocketAddrs + fmt::Debug,
    {
        self.close();
        let stream = transport::connect(addr)?;
        self.start(stream)
    }

    /// Start draining into an already-connected stream.
    pub fn attach(&mut self, stream: TcpStream) -> Result<(), LinkError> {
        self.close();
        transport::tune_low_latency(&stream)?;
        self.start(stream)
    }

    fn start(&mut self, stream: TcpStream) -> Result<(), LinkError> {
        let control = stream.try_clone().map_err(LinkError::Connection)?;
        {
            let mut state = self.shared.lock();
            state.entries.clear();
            state.running = true;
            state.finished = false;
        }
        self.shared.connected.store(true, Ordering::SeqCst);

        let writer = match self.writer.take() {
            Some(mut writer) => {
                if self.codec.reset_baseline_on_reconnect {
                    writer.reset_baseline();
                }
                writer
            }
            None => SnapshotWriter::new(
                FrameVariant::Single,
                DeltaEncoder::exact_size(&self.codec),
                Arc::clone(&self.stats),
            ),
        };
        let shared = Arc::clone(&self.shared);
        let stats = Arc::clone(&self.stats);
        let spawned = thread::Builder::new()
            .name("snaplink-drain".into())
            .spawn(move || drain(shared, stream, writer, stats));

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                self.control = Some(control);
                Ok(())
            }
            Err(e) => {
                self.shared.connected.store(false, Ordering::SeqCst);
                self.shared.lock().running = false;
                Err(LinkError::Connection(e))
            }
        }
    }

    /// Queue one snapshot for transmission.
    ///
    /// Returns as soon as the snapshot is queued. When the queue is
    /// full the configured [`OverflowPolicy`] applies. Empty snapshots
    /// are accepted and ignored.
    pub fn send(&self, snapshot: &[u8]) -> Result<(), LinkError> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        if snapshot.is_empty() {
            return Ok(());
        }

        let capacity = self.config.queue_capacity.max(1);
        let mut state = self.shared.lock();
        loop {
            if !state.running {
                return Err(LinkError::Closed);
            }
            if !self.is_connected() {
                return Err(LinkError::NotConnected);
            }
            if state.entries.len() < capacity {
                break;
            }
            match self.config.overflow {
                OverflowPolicy::Block => {
                    state = self
                        .shared
                        .space
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                OverflowPolicy::DropOldest => {
                    state.entries.pop_front();
                    self.stats.record_drop();
                    debug!("send queue full; dropped oldest snapshot");
                }
                OverflowPolicy::Reject => {
                    self.stats.record_drop();
                    return Err(LinkError::QueueFull(capacity));
                }
            }
        }

        state.entries.push_back(snapshot.to_vec());
        self.shared.available.notify_one();
        Ok(())
    }

    /// Whether the drain thread still holds a live connection.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Snapshots waiting for the drain thread.
    pub fn queued(&self) -> usize {
        self.shared.lock().entries.len()
    }

    pub fn stats(&self) -> Arc<LinkStats> {
        Arc::clone(&self.stats)
    }

    /// Stop accepting snapshots, send everything already queued, then
    /// close the connection and join the drain thread.
    ///
    /// Draining is bounded by `close_timeout_ms`; past it the socket is
    /// shut down and the rest of the queue counts as dropped.
    pub fn close(&mut self) {
        self.stop(false);
    }

    /// Like [`close`](Self::close) but discards queued snapshots and
    /// shuts the socket down without waiting.
    pub fn abort(&mut self) {
        self.stop(true);
    }

    fn stop(&mut self, discard: bool) {
        let mut state = self.shared.lock();
        if discard {
            discard_queued(&mut state, &self.stats);
        }
        state.running = false;
        self.shared.available.notify_all();
        self.shared.space.notify_all();

        if !discard && self.worker.is_some() {
            let deadline = Instant::now() + self.config.close_timeout();
            while !state.finished {
                let now = Instant::now();
                if now >= deadline {
                    warn!(
                        queued = state.entries.len(),
                        "close timed out; cutting the connection"
                    );
                    discard_queued(&mut state, &self.stats);
                    break;
                }
                state = self
                    .shared
                    .space
                    .wait_timeout(state, deadline - now)
                    .map(|(guard, _)| guard)
                    .unwrap_or_else(|e| e.into_inner().0);
            }
        }
        drop(state);

        // Unblocks a drain thread stuck writing to a peer that stopped
        // reading. A no-op once the thread has shut the socket itself.
        if let Some(control) = self.control.take() {
            let _ = control.shutdown(Shutdown::Both);
        }

        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok(writer) => self.writer = Some(writer),
                Err(_) => warn!("drain thread panicked"),
            }
        }
        self.shared.connected.store(false, Ordering::SeqCst);
    }
}

fn discard_queued(state: &mut QueueState, stats: &LinkStats) {
    for _ in state.entries.drain(..) {
        stats.record_drop();
    }
}

impl Drop for AsyncSender {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Drain thread ─────────────────────────────────────────────────

fn drain(
    shared: Arc<Shared>,
    mut stream: TcpStream,
    mut writer: SnapshotWriter,
    stats: Arc<LinkStats>,
) -> SnapshotWriter {
    debug!("drain thread started");
    loop {
        let entry = {
            let mut state = shared.lock();
            while state.entries.is_empty() && state.running {
                state = shared
                    .available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            // Empty here means shutdown was requested.
            let Some(entry) = state.entries.pop_front() else {
                break;
            };
            shared.space.notify_one();
            entry
        };

        if let Err(e) = writer.write(&mut stream, &entry) {
            warn!("async send failed, connection dropped: {e}");
            shared.connected.store(false, Ordering::SeqCst);
            // The entry in flight is lost along with the queue.
            stats.record_drop();
            let mut state = shared.lock();
            discard_queued(&mut state, &stats);
            shared.space.notify_all();
            break;
        }
    }

    shared.connected.store(false, Ordering::SeqCst);
    let _ = stream.shutdown(Shutdown::Both);
    shared.lock().finished = true;
    shared.space.notify_all();
    info!("drain thread stopped");
    writer
}

// ── Tests ────────────────────────────────────────────────────────
