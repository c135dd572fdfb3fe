//! # snaplink-sender
//!
//! Produces snapshots and streams them to a snaplink receiver.
//!
//! ## Sources
//!
//! - **Synthetic**: a fixed-size buffer with a few bytes changed per tick,
//!   the shape of typical telemetry state.
//! - **File**: replays a capture file recorded by `snaplink-receiver`,
//!   looping at end of file.
//!
//! Either the blocking `SyncSender` or the queued `AsyncSender` carries
//! the snapshots, selected by `sender.mode`.

pub mod config;
pub mod service;
pub mod source;
