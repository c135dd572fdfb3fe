//! Sender service core logic.
//!
//! Pulls snapshots from the configured source at a fixed rate and pushes
//! them through a sync or async sender, reconnecting whenever the link
//! drops. Runs on a plain thread; the binary drives it from
//! `spawn_blocking`.

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use snaplink_core::{AsyncSender, LinkError, LinkStats, SyncSender, Throughput};

use crate::config::{SenderAppConfig, SenderMode};
use crate::source;

pub type ServiceResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Granularity of interruptible sleeps.
const STOP_POLL: Duration = Duration::from_millis(50);

// ── Link ─────────────────────────────────────────────────────────

/// Either sender flavour behind one interface.
enum Link {
    Sync(SyncSender),
    Async(AsyncSender),
}

impl Link {
    fn new(config: &SenderAppConfig) -> Self {
        match config.sender.mode {
            SenderMode::Sync => Link::Sync(SyncSender::new(config.codec)),
            SenderMode::Async => Link::Async(AsyncSender::new(config.codec, config.queue)),
        }
    }

    fn connect(&mut self, peer: &str) -> Result<(), LinkError> {
        match self {
            Link::Sync(s) => s.connect(peer),
            Link::Async(s) => s.connect(peer),
        }
    }

    fn send(&mut self, snapshot: &[u8]) -> Result<(), LinkError> {
        match self {
            Link::Sync(s) => s.send(snapshot),
            Link::Async(s) => s.send(snapshot),
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            Link::Sync(s) => s.is_connected(),
            Link::Async(s) => s.is_connected(),
        }
    }

    fn stats(&self) -> Arc<LinkStats> {
        match self {
            Link::Sync(s) => s.stats(),
            Link::Async(s) => s.stats(),
        }
    }

    fn close(&mut self) {
        match self {
            Link::Sync(s) => s.close(),
            Link::Async(s) => s.close(),
        }
    }
}

// ── SenderService ────────────────────────────────────────────────

/// The top-level sender service.
pub struct SenderService {
    config: SenderAppConfig,
    running: Arc<AtomicBool>,
}

impl SenderService {
    /// The service starts armed: clearing the stop handle before `run`
    /// makes `run` return at once.
    pub fn new(config: SenderAppConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Handle that stops the service when set to `false`.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run until stopped, the source runs dry or `max_snapshots` have
    /// been sent. Returns the number of snapshots handed to the link.
    pub fn run(&self) -> ServiceResult<u64> {
        let mut source = source::from_config(&self.config.source)?;
        let mut link = Link::new(&self.config);
        let stats = link.stats();
        let peer = self.config.network.peer.as_str();
        let reconnect = Duration::from_millis(self.config.network.reconnect_ms);
        let interval = match self.config.sender.rate_hz {
            0 => None,
            hz => Some(Duration::from_secs_f64(1.0 / f64::from(hz))),
        };
        let report_every = Duration::from_secs(self.config.sender.report_interval_secs);
        let max = self.config.sender.max_snapshots;

        let mut sent = 0u64;
        let mut throughput = Throughput::new();
        let mut next_tick = Instant::now();
        let mut last_report = Instant::now();

        while self.is_running() {
            if !link.is_connected() {
                if let Err(e) = link.connect(peer) {
                    warn!("connect to {peer} failed: {e}; retrying in {reconnect:?}");
                    self.sleep_while_running(reconnect);
                    continue;
                }
                next_tick = Instant::now();
            }

            let Some(snapshot) = source.next_snapshot()? else {
                info!("source exhausted");
                break;
            };
            match link.send(snapshot) {
                Ok(()) => {
                    sent += 1;
                    throughput.record(snapshot.len() as u64);
                }
                Err(e) => warn!("snapshot lost: {e}"),
            }
            if max > 0 && sent >= max {
                break;
            }

            if !report_every.is_zero() && last_report.elapsed() >= report_every {
                let report = stats.report();
                info!(
                    sent,
                    wire_bytes = report.wire_bytes,
                    ratio = report.compression_ratio(),
                    snapshot_rate = throughput.bytes_per_sec(),
                    dropped = report.dropped_frames,
                    "sender stats"
                );
                last_report = Instant::now();
            }

            if let Some(interval) = interval {
                next_tick += interval;
                let now = Instant::now();
                if next_tick > now {
                    thread::sleep(next_tick - now);
                } else {
                    // Fell behind; do not burst to catch up.
                    next_tick = now;
                }
            }
        }

        link.close();
        self.running.store(false, Ordering::SeqCst);
        let report = stats.report();
        info!(
            sent,
            frames = report.frames,
            compressed = report.compressed_frames,
            wire_bytes = report.wire_bytes,
            "sender service stopped"
        );
        Ok(sent)
    }

    fn sleep_while_running(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while self.is_running() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(STOP_POLL.min(deadline - now));
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
