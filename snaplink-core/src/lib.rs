//! # snaplink-core
//!
//! Low-latency one-way transport for fixed-layout state snapshots over TCP.
//!
//! This crate contains:
//! - **Codec**: XOR delta against a retained baseline, then zlib or zstd
//! - **Frame**: little-endian length-prefixed framing (paired or single length)
//! - **Senders**: `SyncSender` (blocking) and `AsyncSender` (queued, drain thread)
//! - **Receiver**: single-peer listener with a background accept thread
//! - **Capture**: length-prefixed snapshot recording files
//! - **Stats**: per-channel counters and a rolling throughput estimator
//! - **Error**: `LinkError` / `DecodeError`, `thiserror`-based

pub mod async_sender;
pub mod capture;
pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod receiver;
pub mod sender;
pub mod stats;
pub mod transport;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use async_sender::AsyncSender;
pub use capture::{CaptureReader, CaptureWriter};
pub use codec::{Compression, DeltaDecoder, DeltaEncoder, match_ratio};
pub use config::{AsyncSenderConfig, BaselinePolicy, CodecConfig, OverflowPolicy, ReceiverConfig};
pub use error::{DecodeError, LinkError};
pub use frame::FrameVariant;
pub use receiver::{Receiver, SnapshotReader};
pub use sender::{SnapshotWriter, SyncSender};
pub use stats::{LinkStats, StatsReport, Throughput};
