//! Channel counters and throughput estimation.
//!
//! [`LinkStats`] is shared (`Arc`) between a channel and whoever wants
//! to observe it, including the async sender's drain thread, so all
//! counters are atomics. [`Throughput`] tracks bytes over a rolling
//! window and derives bytes/second.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

// ── LinkStats ────────────────────────────────────────────────────

/// Cumulative counters for one channel.
#[derive(Debug, Default)]
pub struct LinkStats {
    frames: AtomicU64,
    compressed_frames: AtomicU64,
    snapshot_bytes: AtomicU64,
    wire_bytes: AtomicU64,
    dropped_frames: AtomicU64,
}

impl LinkStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one frame: `snapshot_len` bytes of state carried in
    /// `wire_len` bytes of header and payload.
    pub fn record_frame(&self, snapshot_len: usize, wire_len: usize, compressed: bool) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        if compressed {
            self.compressed_frames.fetch_add(1, Ordering::Relaxed);
        }
        self.snapshot_bytes
            .fetch_add(snapshot_len as u64, Ordering::Relaxed);
        self.wire_bytes.fetch_add(wire_len as u64, Ordering::Relaxed);
    }

    /// Record a snapshot discarded before reaching the wire.
    pub fn record_drop(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn report(&self) -> StatsReport {
        StatsReport {
            frames: self.frames.load(Ordering::Relaxed),
            compressed_frames: self.compressed_frames.load(Ordering::Relaxed),
            snapshot_bytes: self.snapshot_bytes.load(Ordering::Relaxed),
            wire_bytes: self.wire_bytes.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`LinkStats`] counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsReport {
    pub frames: u64,
    pub compressed_frames: u64,
    pub snapshot_bytes: u64,
    pub wire_bytes: u64,
    pub dropped_frames: u64,
}

impl StatsReport {
    /// Wire bytes per snapshot byte (lower is better). 1.0 when idle.
    pub fn compression_ratio(&self) -> f64 {
        if self.snapshot_bytes == 0 {
            return 1.0;
        }
        self.wire_bytes as f64 / self.snapshot_bytes as f64
    }
}

// ── Throughput ───────────────────────────────────────────────────

/// Rolling-window throughput estimator.
///
/// Records `(timestamp, bytes)` samples and computes the average rate
/// over the most recent `window`.
pub struct Throughput {
    samples: VecDeque<(Instant, u64)>,
    window: Duration,
    total_bytes: u64,
}

impl Throughput {
    /// Estimator with a 1-second window.
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(1))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(256),
            window,
            total_bytes: 0,
        }
    }

    pub fn record(&mut self, bytes: u64) {
        self.record_at(Instant::now(), bytes);
    }

    /// Record with an explicit timestamp (useful for testing).
    pub fn record_at(&mut self, when: Instant, bytes: u64) {
        self.samples.push_back((when, bytes));
        self.total_bytes += bytes;
        self.evict(when);
    }

    /// Estimated bytes/second over the window.
    ///
    /// The first sample only opens the interval; its bytes arrived
    /// before the window's start and are not counted.
    pub fn bytes_per_sec(&self) -> u64 {
        if self.samples.len() < 2 {
            return 0;
        }
        let (Some(&(first, opening)), Some(&(last, _))) =
            (self.samples.front(), self.samples.back())
        else {
            return 0;
        };
        let elapsed = last.duration_since(first).max(Duration::from_millis(1));
        let bytes = self.total_bytes.saturating_sub(opening);
        (bytes as f64 / elapsed.as_secs_f64()) as u64
    }

    /// Samples currently inside the window.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&(ts, bytes)) = self.samples.front() {
            if now.duration_since(ts) > self.window {
                self.samples.pop_front();
                self.total_bytes = self.total_bytes.saturating_sub(bytes);
            } else {
                break;
            }
        }
    }
}

impl Default for Throughput {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────
