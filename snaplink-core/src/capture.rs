//! Snapshot capture files.
//!
//! A capture is a flat sequence of records, each a little-endian `u32`
//! length followed by that many snapshot bytes. No file header.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::info;

/// Largest record accepted when reading, so a corrupt length cannot
/// trigger a huge allocation.
pub const MAX_RECORD_LEN: usize = 16 * 1024 * 1024;

/// Appends snapshots to a capture file.
pub struct CaptureWriter<W: Write = BufWriter<File>> {
    inner: W,
    records: u64,
}

impl CaptureWriter {
    /// Create (or truncate) `path`.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        info!("recording snapshots to {}", path.display());
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> CaptureWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, records: 0 }
    }

    pub fn write_record(&mut self, snapshot: &[u8]) -> io::Result<()> {
        let len = u32::try_from(snapshot.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "record too large"))?;
        self.inner.write_all(&len.to_le_bytes())?;
        self.inner.write_all(snapshot)?;
        self.records += 1;
        Ok(())
    }

    /// Records written so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn into_inner(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Reads snapshots back from a capture file.
pub struct CaptureReader<R: Read = BufReader<File>> {
    inner: R,
    buf: Vec<u8>,
}

impl CaptureReader {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read> CaptureReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
        }
    }

    /// Next record, or `None` at a clean end of file.
    ///
    /// A file that ends inside a record is an `UnexpectedEof` error.
    pub fn next_record(&mut self) -> io::Result<Option<&[u8]>> {
        let mut len = [0u8; 4];
        let mut filled = 0;
        while filled < len.len() {
            match self.inner.read(&mut len[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        let len = u32::from_le_bytes(len) as usize;
        if len > MAX_RECORD_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("record of {len} bytes exceeds {MAX_RECORD_LEN}"),
            ));
        }
        self.buf.resize(len, 0);
        self.inner.read_exact(&mut self.buf)?;
        Ok(Some(&self.buf))
    }

    /// The record returned by the last successful
    /// [`next_record`](Self::next_record).
    pub fn record(&self) -> &[u8] {
        &self.buf
    }
}

impl<R: Read + Seek> CaptureReader<R> {
    /// Seek back to the first record.
    pub fn rewind(&mut self) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(0)).map(|_| ())
    }
}

// ── Tests ────────────────────────────────────────────────────────
