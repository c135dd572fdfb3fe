//! Snapshot producers.

use std::io;

use snaplink_core::CaptureReader;
use tracing::info;

use crate::config::{SourceConfig, SourceKind};

/// Something that yields one snapshot per tick.
pub trait SnapshotSource: Send {
    /// The next snapshot, or `None` when the source has nothing to give.
    fn next_snapshot(&mut self) -> io::Result<Option<&[u8]>>;
}

/// Build the source described by `config`.
pub fn from_config(config: &SourceConfig) -> io::Result<Box<dyn SnapshotSource>> {
    match config.kind {
        SourceKind::Synthetic => Ok(Box::new(SyntheticSource::new(
            config.snapshot_len,
            config.changed_bytes,
            config.seed,
        ))),
        SourceKind::File => {
            info!("replaying capture {}", config.path.display());
            Ok(Box::new(FileSource::new(CaptureReader::open(&config.path)?)))
        }
    }
}

// ── SyntheticSource ──────────────────────────────────────────────

/// Fixed-size snapshot where `changed` bytes move each tick.
pub struct SyntheticSource {
    current: Vec<u8>,
    changed: usize,
    rng: u64,
}

impl SyntheticSource {
    pub fn new(len: usize, changed: usize, seed: u64) -> Self {
        Self {
            current: (0..len).map(|i| (i % 251) as u8).collect(),
            changed,
            // xorshift must not start at zero.
            rng: seed | 1,
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng = x;
        x
    }
}

impl SnapshotSource for SyntheticSource {
    fn next_snapshot(&mut self) -> io::Result<Option<&[u8]>> {
        let len = self.current.len();
        if len > 0 {
            for _ in 0..self.changed {
                let r = self.next_u64();
                let pos = (r % len as u64) as usize;
                self.current[pos] = (r >> 32) as u8;
            }
        }
        Ok(Some(&self.current))
    }
}

// ── FileSource ───────────────────────────────────────────────────

/// Replays a capture file, looping back to the start at end of file.
pub struct FileSource<R = std::io::BufReader<std::fs::File>>
where
    R: io::Read + io::Seek,
{
    reader: CaptureReader<R>,
}

impl<R: io::Read + io::Seek> FileSource<R> {
    pub fn new(reader: CaptureReader<R>) -> Self {
        Self { reader }
    }
}

impl<R: io::Read + io::Seek + Send> SnapshotSource for FileSource<R> {
    fn next_snapshot(&mut self) -> io::Result<Option<&[u8]>> {
        if self.reader.next_record()?.is_none() {
            self.reader.rewind()?;
            if self.reader.next_record()?.is_none() {
                return Ok(None);
            }
        }
        Ok(Some(self.reader.record()))
    }
}

// ── Tests ────────────────────────────────────────────────────────
