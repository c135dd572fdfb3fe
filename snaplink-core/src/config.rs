//! Tunables for codec, senders and receiver.
//!
//! Every struct is `#[serde(default)]`, so the binaries can embed them
//! in their TOML files and only override what they need.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::Compression;
use crate::frame::FrameVariant;

// ── Constants ────────────────────────────────────────────────────

/// Snapshots up to this size go out raw on the threshold-gated path.
pub const DEFAULT_COMPRESS_THRESHOLD: usize = 1500;

/// Agreed snapshot size for the exact-size gate and single-length frames.
pub const DEFAULT_SNAPSHOT_LEN: usize = 3072;

/// Largest snapshot a baseline retains.
pub const DEFAULT_BASELINE_CAPACITY: usize = 8192;

/// Upper bound on any length field read from the wire.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// How long `close` waits for the queue to drain before cutting the socket.
pub const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 2000;

// ── BaselinePolicy ───────────────────────────────────────────────

/// When the encoder advances its baseline.
///
/// The decoder always resyncs on every frame. With `CompressedOnly` the
/// encoder skips raw frames, so any raw frame between two compressed
/// ones leaves the peers on different baselines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselinePolicy {
    /// Every frame that fits the baseline becomes the new baseline.
    #[default]
    AlwaysResync,
    /// Only compressed frames advance the encoder baseline.
    CompressedOnly,
}

// ── OverflowPolicy ───────────────────────────────────────────────

/// What [`AsyncSender::send`](crate::AsyncSender::send) does when the
/// queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for the drain thread to make room.
    #[default]
    Block,
    /// Discard the oldest queued snapshot.
    DropOldest,
    /// Fail the send with `QueueFull`.
    Reject,
}

// ── CodecConfig ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Threshold-gated encoders compress snapshots strictly above this.
    pub compress_threshold: usize,
    /// Exact-size encoders compress only this length; single-length
    /// frames carry snapshots of this length.
    pub snapshot_len: usize,
    /// Baseline buffer size; must cover the largest snapshot compressed.
    pub baseline_capacity: usize,
    pub baseline_policy: BaselinePolicy,
    /// Zero both baselines whenever a new connection is made.
    pub reset_baseline_on_reconnect: bool,
    pub max_frame_size: usize,
    /// Kept last: it serializes as a TOML sub-table.
    pub compression: Compression,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            compress_threshold: DEFAULT_COMPRESS_THRESHOLD,
            snapshot_len: DEFAULT_SNAPSHOT_LEN,
            baseline_capacity: DEFAULT_BASELINE_CAPACITY,
            baseline_policy: BaselinePolicy::default(),
            reset_baseline_on_reconnect: true,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            compression: Compression::default(),
        }
    }
}

// ── AsyncSenderConfig ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsyncSenderConfig {
    /// Maximum snapshots waiting for the drain thread.
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
    /// Upper bound on a draining close. After it the socket is shut
    /// down and whatever is still queued is dropped.
    pub close_timeout_ms: u64,
}

impl Default for AsyncSenderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow: OverflowPolicy::default(),
            close_timeout_ms: DEFAULT_CLOSE_TIMEOUT_MS,
        }
    }
}

impl AsyncSenderConfig {
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

// ── ReceiverConfig ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Frame layout expected from the peer.
    pub variant: FrameVariant,
    /// Sleep between accept attempts while no peer is pending.
    pub accept_poll_ms: u64,
    /// Sleep between slot checks while a peer is connected.
    pub occupied_backoff_ms: u64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            variant: FrameVariant::Paired,
            accept_poll_ms: 16,
            occupied_backoff_ms: 100,
        }
    }
}

impl ReceiverConfig {
    pub fn accept_poll(&self) -> Duration {
        Duration::from_millis(self.accept_poll_ms.max(1))
    }

    pub fn occupied_backoff(&self) -> Duration {
        Duration::from_millis(self.occupied_backoff_ms.max(1))
    }
}
