//! Blocking snapshot sender.
//!
//! [`SnapshotWriter`] turns snapshots into frames (codec + header in
//! one contiguous buffer) and is shared by both sender flavours.
//! [`SyncSender`] drives it on the caller's thread: `send` returns once
//! the kernel has accepted the whole frame.

use std::fmt;
use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;

use bytes::BytesMut;
use tracing::{debug, info, warn};

use crate::codec::DeltaEncoder;
use crate::config::{CodecConfig, DEFAULT_BASELINE_CAPACITY};
use crate::error::LinkError;
use crate::frame::{FrameVariant, MAX_HEADER_LEN};
use crate::stats::LinkStats;
use crate::transport;

// ── SnapshotWriter ───────────────────────────────────────────────

/// Encodes snapshots and frames them for one direction of a channel.
pub struct SnapshotWriter {
    variant: FrameVariant,
    encoder: DeltaEncoder,
    buf: BytesMut,
    stats: Arc<LinkStats>,
}

impl SnapshotWriter {
    pub fn new(variant: FrameVariant, encoder: DeltaEncoder, stats: Arc<LinkStats>) -> Self {
        Self {
            variant,
            encoder,
            buf: BytesMut::with_capacity(MAX_HEADER_LEN + DEFAULT_BASELINE_CAPACITY),
            stats,
        }
    }

    pub fn variant(&self) -> FrameVariant {
        self.variant
    }

    /// Zero the encoder baseline (new peer).
    pub fn reset_baseline(&mut self) {
        self.encoder.reset();
    }

    /// Encode, frame and write one snapshot with a single whole-write.
    ///
    /// Returns the number of bytes put on the wire.
    pub fn write<W: Write + ?Sized>(
        &mut self,
        out: &mut W,
        snapshot: &[u8],
    ) -> Result<usize, LinkError> {
        let encoded = self.encoder.encode(snapshot);
        let compressed = encoded.is_compressed();
        self.buf.clear();
        self.variant
            .write_frame(encoded.payload(), snapshot.len(), &mut self.buf)?;

        out.write_all(&self.buf)?;
        self.stats
            .record_frame(snapshot.len(), self.buf.len(), compressed);
        debug!(
            len = snapshot.len(),
            wire = self.buf.len(),
            compressed,
            "frame sent"
        );
        Ok(self.buf.len())
    }
}

// ── SyncSender ───────────────────────────────────────────────────

/// Sender that writes each snapshot on the calling thread.
///
/// Snapshots longer than the compression threshold go through the
/// delta codec; frames use the paired-length header.
pub struct SyncSender {
    config: CodecConfig,
    stream: Option<TcpStream>,
    writer: SnapshotWriter,
    stats: Arc<LinkStats>,
}

impl SyncSender {
    /// A disconnected sender. Call [`connect`](Self::connect) before
    /// sending.
    pub fn new(config: CodecConfig) -> Self {
        let stats = Arc::new(LinkStats::new());
        let writer = SnapshotWriter::new(
            FrameVariant::Paired,
            DeltaEncoder::above_threshold(&config),
            Arc::clone(&stats),
        );
        Self {
            config,
            stream: None,
            writer,
            stats,
        }
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: TcpStream, config: CodecConfig) -> Result<Self, LinkError> {
        transport::tune_low_latency(&stream)?;
        let mut sender = Self::new(config);
        sender.stream = Some(stream);
        Ok(sender)
    }

    /// Connect to `addr`, replacing any existing connection.
    pub fn connect<A>(&mut self, addr: A) -> Result<(), LinkError>
    where
        A: ToSocketAddrs + fmt::Debug,
    {
        self.close();
        let stream = transport::connect(addr)?;
        if self.config.reset_baseline_on_reconnect {
            self.writer.reset_baseline();
        }
        self.stream = Some(stream);
        Ok(())
    }

    /// Send one snapshot, blocking until every byte is written.
    ///
    /// A failed write drops the connection; later calls return
    /// [`LinkError::NotConnected`].
    pub fn send(&mut self, snapshot: &[u8]) -> Result<(), LinkError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(LinkError::NotConnected);
        };
        if let Err(e) = self.writer.write(stream, snapshot) {
            warn!("send failed, dropping connection: {e}");
            self.close();
            return Err(e);
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Shared counters for this sender.
    pub fn stats(&self) -> Arc<LinkStats> {
        Arc::clone(&self.stats)
    }

    /// Close the connection, if any. The baseline is kept.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            info!("sender connection closed");
        }
    }
}

impl Drop for SyncSender {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Tests ────────────────────────────────────────────────────────
