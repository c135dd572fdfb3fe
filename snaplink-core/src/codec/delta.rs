//! XOR-against-baseline delta coding.
//!
//! Consecutive snapshots differ in few bytes. XOR-ing the current
//! snapshot against the last one turns the unchanged bytes into zeros,
//! which the entropy coder then collapses. Each side keeps exactly one
//! baseline, and the two baselines must advance in lockstep: a missed
//! update on either end silently corrupts every later snapshot.

use tracing::{debug, warn};

use crate::codec::compress::Compression;
use crate::config::{BaselinePolicy, CodecConfig};
use crate::error::DecodeError;

// ── DeltaState ───────────────────────────────────────────────────

/// The retained "last snapshot" for one direction of one channel.
///
/// The buffer is allocated once at full capacity. Bytes past the last
/// stored snapshot are always zero, so a longer snapshot XORs against
/// zeros in its tail.
#[derive(Debug, Clone)]
pub struct DeltaState {
    baseline: Vec<u8>,
    len: usize,
}

impl DeltaState {
    /// A zeroed baseline able to hold snapshots up to `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            baseline: vec![0u8; capacity],
            len: 0,
        }
    }

    /// Largest snapshot the baseline can retain.
    pub fn capacity(&self) -> usize {
        self.baseline.len()
    }

    /// Length of the most recently stored snapshot.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The most recently stored snapshot.
    pub fn as_slice(&self) -> &[u8] {
        &self.baseline[..self.len]
    }

    /// Replace the baseline with `snapshot`.
    pub fn store(&mut self, snapshot: &[u8]) -> Result<(), DecodeError> {
        if snapshot.len() > self.capacity() {
            return Err(DecodeError::CapacityExceeded {
                len: snapshot.len(),
                capacity: self.capacity(),
            });
        }
        self.baseline[..snapshot.len()].copy_from_slice(snapshot);
        if snapshot.len() < self.len {
            self.baseline[snapshot.len()..self.len].fill(0);
        }
        self.len = snapshot.len();
        Ok(())
    }

    /// Zero the baseline, as at channel construction.
    pub fn reset(&mut self) {
        self.baseline[..self.len].fill(0);
        self.len = 0;
    }

    /// `out[i] = data[i] ^ baseline[i]` for every byte of `data`.
    ///
    /// `data` must not be longer than the capacity.
    fn xor_into(&self, data: &[u8], out: &mut Vec<u8>) {
        out.clear();
        out.extend(
            data.iter()
                .zip(&self.baseline[..data.len()])
                .map(|(d, b)| d ^ b),
        );
    }
}

// ── CompressTrigger ──────────────────────────────────────────────

/// Which snapshot sizes are worth running through the delta coder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressTrigger {
    /// Compress anything strictly longer than this many bytes.
    Above(usize),
    /// Compress only snapshots of exactly this length.
    Exactly(usize),
}

impl CompressTrigger {
    pub fn applies(self, len: usize) -> bool {
        match self {
            CompressTrigger::Above(threshold) => len > threshold,
            CompressTrigger::Exactly(size) => len == size,
        }
    }
}

// ── Encoded ──────────────────────────────────────────────────────

/// Output of [`DeltaEncoder::encode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoded<'a> {
    /// The snapshot travels unmodified.
    Raw(&'a [u8]),
    /// The snapshot travels as a compressed XOR delta.
    Compressed(&'a [u8]),
}

impl<'a> Encoded<'a> {
    /// Bytes to put on the wire.
    pub fn payload(&self) -> &'a [u8] {
        match *self {
            Encoded::Raw(p) | Encoded::Compressed(p) => p,
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, Encoded::Compressed(_))
    }
}

// ── DeltaEncoder ─────────────────────────────────────────────────

/// Sending half of the delta codec.
pub struct DeltaEncoder {
    state: DeltaState,
    trigger: CompressTrigger,
    policy: BaselinePolicy,
    compression: Compression,
    delta: Vec<u8>,
    compressed: Vec<u8>,
}

impl DeltaEncoder {
    pub fn new(
        trigger: CompressTrigger,
        capacity: usize,
        policy: BaselinePolicy,
        compression: Compression,
    ) -> Self {
        Self {
            state: DeltaState::new(capacity),
            trigger,
            policy,
            compression,
            delta: Vec::with_capacity(capacity),
            compressed: Vec::with_capacity(capacity),
        }
    }

    /// Encoder that compresses anything above `config.compress_threshold`.
    pub fn above_threshold(config: &CodecConfig) -> Self {
        Self::new(
            CompressTrigger::Above(config.compress_threshold),
            config.baseline_capacity,
            config.baseline_policy,
            config.compression,
        )
    }

    /// Encoder that compresses only snapshots of `config.snapshot_len`.
    pub fn exact_size(config: &CodecConfig) -> Self {
        Self::new(
            CompressTrigger::Exactly(config.snapshot_len),
            config.baseline_capacity,
            config.baseline_policy,
            config.compression,
        )
    }

    pub fn baseline(&self) -> &DeltaState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }

    /// Encode one snapshot, advancing the baseline when required.
    ///
    /// Falls back to [`Encoded::Raw`] when the size does not trigger
    /// compression, when the snapshot exceeds the baseline capacity, or
    /// when the compressed form is not strictly smaller.
    pub fn encode<'a>(&'a mut self, snapshot: &'a [u8]) -> Encoded<'a> {
        let len = snapshot.len();
        if !self.trigger.applies(len) || len > self.state.capacity() {
            return self.raw(snapshot);
        }

        self.state.xor_into(snapshot, &mut self.delta);
        let compression = self.compression;
        match compression.compress(&self.delta, &mut self.compressed) {
            Ok(()) if self.compressed.len() < len => {
                // Cannot fail: capacity was checked above.
                let _ = self.state.store(snapshot);
                Encoded::Compressed(&self.compressed)
            }
            Ok(()) => {
                debug!(len, compressed = self.compressed.len(), "delta not smaller; sending raw");
                self.raw(snapshot)
            }
            Err(e) => {
                warn!("delta compression failed: {e}; sending raw");
                self.raw(snapshot)
            }
        }
    }

    fn raw<'a>(&mut self, snapshot: &'a [u8]) -> Encoded<'a> {
        if self.policy == BaselinePolicy::AlwaysResync && snapshot.len() <= self.state.capacity() {
            let _ = self.state.store(snapshot);
        }
        Encoded::Raw(snapshot)
    }
}

// ── DeltaDecoder ─────────────────────────────────────────────────

/// Receiving half of the delta codec.
///
/// The baseline is resynchronized on every message, raw or compressed.
pub struct DeltaDecoder {
    state: DeltaState,
    compression: Compression,
    inflated: Vec<u8>,
    output: Vec<u8>,
}

impl DeltaDecoder {
    pub fn new(capacity: usize, compression: Compression) -> Self {
        Self {
            state: DeltaState::new(capacity),
            compression,
            inflated: Vec::with_capacity(capacity),
            output: Vec::with_capacity(capacity),
        }
    }

    pub fn from_config(config: &CodecConfig) -> Self {
        Self::new(config.baseline_capacity, config.compression)
    }

    pub fn baseline(&self) -> &DeltaState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }

    /// The most recently decoded snapshot.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Decode a payload carrying a snapshot of `original_len` bytes.
    ///
    /// A payload shorter than `original_len` is a compressed delta;
    /// anything else is the raw snapshot itself.
    pub fn decode(&mut self, payload: &[u8], original_len: usize) -> Result<&[u8], DecodeError> {
        if payload.len() < original_len {
            self.decode_compressed(payload, original_len)
        } else {
            Ok(self.decode_raw(payload))
        }
    }

    /// Accept a raw snapshot and resync the baseline to it.
    pub fn decode_raw(&mut self, payload: &[u8]) -> &[u8] {
        self.output.clear();
        self.output.extend_from_slice(payload);
        if payload.len() <= self.state.capacity() {
            let _ = self.state.store(payload);
        }
        &self.output
    }

    /// Inflate a delta to `original_len` bytes and undo the XOR.
    pub fn decode_compressed(
        &mut self,
        payload: &[u8],
        original_len: usize,
    ) -> Result<&[u8], DecodeError> {
        if original_len > self.state.capacity() {
            return Err(DecodeError::CapacityExceeded {
                len: original_len,
                capacity: self.state.capacity(),
            });
        }
        self.compression
            .decompress(payload, original_len, &mut self.inflated)?;
        self.state.xor_into(&self.inflated, &mut self.output);
        self.state.store(&self.output)?;
        Ok(&self.output)
    }
}

// ── Diagnostics ──────────────────────────────────────────────────

/// Fraction (0.0 – 1.0) of positions where `previous` and `current`
/// hold the same byte. Bytes past the shorter buffer count as changed.
pub fn match_ratio(previous: &[u8], current: &[u8]) -> f64 {
    if current.is_empty() {
        return 1.0;
    }
    let matching = previous
        .iter()
        .zip(current)
        .filter(|(a, b)| a == b)
        .count();
    matching as f64 / current.len().max(previous.len()) as f64
}

// ── Tests ────────────────────────────────────────────────────────
