//! # snaplink-receiver
//!
//! Listens for one snaplink sender at a time, decodes its snapshot
//! stream and reports throughput. Received snapshots can be recorded
//! to a capture file for later replay with `snaplink-sender`.

pub mod config;
pub mod service;
