//! Error types for the snaplink transport.
//!
//! All fallible operations return `Result<T, LinkError>`.
//! Malformed input from the wire never panics; it surfaces as a typed error.

use thiserror::Error;

/// The canonical error type for a snapshot channel.
#[derive(Debug, Error)]
pub enum LinkError {
    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error (connect, bind, write, ...).
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The peer address did not resolve to any socket address.
    #[error("could not resolve address: {0}")]
    Resolve(String),

    /// The operation needs a live connection and there is none.
    #[error("not connected")]
    NotConnected,

    /// The peer closed the stream or a read failed mid-message.
    #[error("peer disconnected")]
    Disconnected,

    // ── Protocol Errors ──────────────────────────────────────────
    /// A frame header carried a length that cannot be valid.
    #[error("invalid frame length: {0}")]
    InvalidLength(i32),

    /// A frame exceeded the configured size limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The compressed payload could not be turned back into a snapshot.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    // ── Queue Errors ─────────────────────────────────────────────
    /// The async send queue is full and the overflow policy rejects.
    #[error("send queue full ({0} entries)")]
    QueueFull(usize),

    /// The channel was closed and no longer accepts work.
    #[error("channel closed")]
    Closed,
}

// ── DecodeError ───────────────────────────────────────────────────

/// Failure to reconstruct a snapshot from a compressed payload.
///
/// Distinct from a disconnect: this indicates corrupted data or a
/// desynchronized baseline, and the stream cannot be trusted afterwards.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The decompressor rejected the payload.
    #[error("decompression failed: {0}")]
    Decompress(String),

    /// The decompressed delta had the wrong size.
    #[error("decompressed length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// The snapshot would not fit in the retained baseline.
    #[error("snapshot of {len} bytes exceeds baseline capacity {capacity}")]
    CapacityExceeded { len: usize, capacity: usize },
}

impl LinkError {
    /// Whether this error means the peer went away (as opposed to a
    /// protocol or decode failure).
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            LinkError::Disconnected | LinkError::NotConnected | LinkError::Connection(_)
        )
    }
}
