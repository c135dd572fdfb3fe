//! Entropy-coder backends applied to XOR deltas.
//!
//! - **Zlib**: deflate with zlib framing via `flate2`. This is the wire
//!   default; peers built against a plain zlib `compress()` can decode it.
//! - **Zstd**: faster at comparable ratios, but only understood by peers
//!   configured for it. The frame format does not identify the backend.

use std::io::{self, Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Default zlib level (zlib's own `Z_DEFAULT_COMPRESSION`).
pub const DEFAULT_ZLIB_LEVEL: u32 = 6;

/// Default zstd level. Favours speed.
pub const DEFAULT_ZSTD_LEVEL: i32 = 1;

/// Which compressor turns deltas into payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum Compression {
    /// zlib stream (deflate + zlib header + adler32).
    Zlib { level: u32 },
    /// zstd frame.
    Zstd { level: i32 },
}

impl Default for Compression {
    fn default() -> Self {
        Compression::Zlib {
            level: DEFAULT_ZLIB_LEVEL,
        }
    }
}

impl Compression {
    /// Compress `data`, replacing the contents of `out`.
    ///
    /// `out` is reused across calls to avoid reallocating on the hot path.
    pub fn compress(&self, data: &[u8], out: &mut Vec<u8>) -> io::Result<()> {
        out.clear();
        match *self {
            Compression::Zlib { level } => {
                let mut encoder =
                    ZlibEncoder::new(std::mem::take(out), flate2::Compression::new(level.min(9)));
                encoder.write_all(data)?;
                *out = encoder.finish()?;
            }
            Compression::Zstd { level } => {
                let mut encoder = zstd::stream::write::Encoder::new(std::mem::take(out), level)?;
                encoder.write_all(data)?;
                *out = encoder.finish()?;
            }
        }
        Ok(())
    }

    /// Decompress `data` into `out`, which must end up exactly `expected`
    /// bytes long.
    ///
    /// At most `expected + 1` bytes are inflated, so a hostile payload
    /// cannot balloon memory.
    pub fn decompress(
        &self,
        data: &[u8],
        expected: usize,
        out: &mut Vec<u8>,
    ) -> Result<(), DecodeError> {
        out.clear();
        let limit = expected as u64 + 1;
        let result = match *self {
            Compression::Zlib { .. } => ZlibDecoder::new(data).take(limit).read_to_end(out),
            Compression::Zstd { .. } => zstd::stream::read::Decoder::new(data)
                .and_then(|decoder| decoder.take(limit).read_to_end(out)),
        };
        result.map_err(|e| DecodeError::Decompress(e.to_string()))?;

        if out.len() != expected {
            return Err(DecodeError::LengthMismatch {
                expected,
                actual: out.len(),
            });
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zlib_roundtrip() {
        let data = vec![7u8; 4000];
        let mut packed = Vec::new();
        Compression::default().compress(&data, &mut packed).unwrap();
        assert!(packed.len() < 100);

        let mut unpacked = Vec::new();
        Compression::default()
            .decompress(&packed, data.len(), &mut unpacked)
            .unwrap();
        assert_eq!(unpacked, data);
    }

    #[test]
    fn zlib_output_is_plain_zlib_stream() {
        let mut packed = Vec::new();
        Compression::default().compress(&[0u8; 64], &mut packed).unwrap();
        // CMF byte for deflate with a 32K window.
        assert_eq!(packed[0], 0x78);
    }

    #[test]
    fn zstd_roundtrip() {
        let backend = Compression::Zstd { level: 3 };
        let data: Vec<u8> = (0..3072u32).map(|i| (i % 7) as u8).collect();
        let mut packed = Vec::new();
        backend.compress(&data, &mut packed).unwrap();

        let mut unpacked = Vec::new();
        backend.decompress(&packed, data.len(), &mut unpacked).unwrap();
        assert_eq!(unpacked, data);
    }

    #[test]
    fn length_mismatch_is_reported() {
        let mut packed = Vec::new();
        Compression::default().compress(&[1u8; 100], &mut packed).unwrap();

        let mut out = Vec::new();
        let err = Compression::default()
            .decompress(&packed, 200, &mut out)
            .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::LengthMismatch {
                expected: 200,
                actual: 100
            }
        ));

        let err = Compression::default()
            .decompress(&packed, 50, &mut out)
            .unwrap_err();
        assert!(matches!(err, DecodeError::LengthMismatch { actual: 51, .. }));
    }

    #[test]
    fn garbage_is_rejected() {
        let mut out = Vec::new();
        let err = Compression::default()
            .decompress(&[0xde, 0xad, 0xbe, 0xef], 16, &mut out)
            .unwrap_err();
        assert!(matches!(err, DecodeError::Decompress(_)));
    }

    #[test]
    fn backend_serde_shape() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            compression: Compression,
        }
        let text = toml::to_string(&Wrapper {
            compression: Compression::Zstd { level: 2 },
        })
        .unwrap();
        assert!(text.contains("backend = \"zstd\""));
        let parsed: Wrapper = toml::from_str(&text).unwrap();
        assert_eq!(parsed.compression, Compression::Zstd { level: 2 });
    }
}
