//! Receiver service core logic.
//!
//! Wraps a [`Receiver`] in a polling loop that survives peer churn,
//! keeps throughput figures and optionally records every snapshot.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use snaplink_core::{CaptureWriter, Receiver, Throughput, match_ratio};

use crate::config::ReceiverAppConfig;

pub type ServiceResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// The top-level receiver service.
pub struct ReceiverService {
    config: ReceiverAppConfig,
    receiver: Receiver,
    running: Arc<AtomicBool>,
}

impl ReceiverService {
    /// Bind the listener. Accepting starts immediately, and the service
    /// is armed: clearing the stop handle before `run` makes `run`
    /// return at once.
    pub fn bind(config: ReceiverAppConfig) -> ServiceResult<Self> {
        let receiver = Receiver::listen(
            config.network.listen.as_str(),
            config.codec,
            config.receiver,
        )?;
        Ok(Self {
            config,
            receiver,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.receiver.local_addr()
    }

    /// Handle that stops the service when set to `false`.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Receive until stopped or `max_snapshots` have arrived. Returns
    /// the number of snapshots received.
    pub fn run(&mut self) -> ServiceResult<u64> {
        let mut recorder = match self.config.record_path() {
            Some(path) => Some(CaptureWriter::create(path)?),
            None => None,
        };
        let poll = Duration::from_millis(self.config.network.poll_ms.max(1));
        let report_every = Duration::from_secs(self.config.output.report_interval_secs);
        let max = self.config.output.max_snapshots;
        let stats = self.receiver.stats();

        let mut received = 0u64;
        let mut throughput = Throughput::new();
        let mut previous: Vec<u8> = Vec::new();
        let mut last_report = Instant::now();

        while self.is_running() {
            if !self.receiver.is_connected() {
                thread::sleep(poll);
            } else if self.receiver.poll_ready(poll) {
                match self.receiver.receive() {
                    Ok(snapshot) => {
                        received += 1;
                        throughput.record(snapshot.len() as u64);
                        if let Some(recorder) = recorder.as_mut() {
                            recorder.write_record(snapshot)?;
                        }
                        debug!(
                            len = snapshot.len(),
                            similarity = match_ratio(&previous, snapshot),
                            "snapshot received"
                        );
                        previous.clear();
                        previous.extend_from_slice(snapshot);
                    }
                    Err(e) if e.is_disconnect() => {
                        info!("sender gone ({e}); waiting for the next one");
                    }
                    Err(e) => warn!("sender dropped: {e}"),
                }
                if max > 0 && received >= max {
                    break;
                }
            }

            if !report_every.is_zero() && last_report.elapsed() >= report_every {
                let report = stats.report();
                info!(
                    received,
                    peer = ?self.receiver.peer_addr(),
                    bytes_per_sec = throughput.bytes_per_sec(),
                    wire_bytes = report.wire_bytes,
                    ratio = report.compression_ratio(),
                    "receiver stats"
                );
                last_report = Instant::now();
            }
        }

        if let Some(mut recorder) = recorder {
            recorder.flush()?;
            info!("recorded {} snapshots", recorder.records());
        }
        self.running.store(false, Ordering::SeqCst);
        info!(received, "receiver service stopped");
        Ok(received)
    }
}

// ── Tests ────────────────────────────────────────────────────────
