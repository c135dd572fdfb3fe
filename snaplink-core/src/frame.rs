//! Wire framing for snapshot messages.
//!
//! Two header shapes exist and a socket carries exactly one of them.
//!
//! **Paired** (8 bytes), written by [`SyncSender`](crate::SyncSender):
//! ```text
//! compressed_len: i32  (4)
//! original_len:   i32  (4)
//! payload:        [u8] (compressed_len)
//! ```
//!
//! **Single** (4 bytes), written by [`AsyncSender`](crate::AsyncSender):
//! ```text
//! payload_len:    i32  (4)
//! payload:        [u8] (payload_len)
//! ```
//! The original length is not on the wire; both ends agree on a fixed
//! snapshot length out of band. A payload at least that long is raw,
//! anything shorter is a compressed delta of exactly that length.
//!
//! All integers are little-endian.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::LinkError;

/// Size of the paired-length header.
pub const PAIRED_HEADER_LEN: usize = 8;

/// Size of the single-length header.
pub const SINGLE_HEADER_LEN: usize = 4;

/// Largest header of either variant.
pub const MAX_HEADER_LEN: usize = PAIRED_HEADER_LEN;

// ── FrameVariant ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameVariant {
    /// `[compressed_len][original_len][payload]`
    #[default]
    Paired,
    /// `[payload_len][payload]`, original length agreed out of band.
    Single,
}

/// Lengths decoded from a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Bytes of payload following the header.
    pub payload_len: usize,
    /// Length of the snapshot the payload decodes to (when compressed).
    pub original_len: usize,
}

impl FrameHeader {
    /// Whether the payload is a compressed delta rather than the raw
    /// snapshot.
    pub fn is_compressed(&self) -> bool {
        self.payload_len < self.original_len
    }
}

impl FrameVariant {
    pub const fn header_len(self) -> usize {
        match self {
            FrameVariant::Paired => PAIRED_HEADER_LEN,
            FrameVariant::Single => SINGLE_HEADER_LEN,
        }
    }

    /// Append one complete frame (header and payload) to `dst`.
    ///
    /// `original_len` is dropped for [`FrameVariant::Single`].
    pub fn write_frame(
        self,
        payload: &[u8],
        original_len: usize,
        dst: &mut BytesMut,
    ) -> Result<(), LinkError> {
        let payload_len = wire_len(payload.len())?;
        dst.reserve(self.header_len() + payload.len());
        dst.put_i32_le(payload_len);
        if self == FrameVariant::Paired {
            dst.put_i32_le(wire_len(original_len)?);
        }
        dst.put_slice(payload);
        Ok(())
    }

    /// Parse a header of exactly [`header_len`](Self::header_len) bytes.
    ///
    /// `snapshot_len` supplies the original length for single-length
    /// frames. Negative lengths and lengths above `max_frame` are
    /// rejected.
    pub fn parse_header(
        self,
        mut bytes: &[u8],
        snapshot_len: usize,
        max_frame: usize,
    ) -> Result<FrameHeader, LinkError> {
        if bytes.len() < self.header_len() {
            return Err(LinkError::Disconnected);
        }
        let payload_len = checked_len(bytes.get_i32_le(), max_frame)?;
        let original_len = match self {
            FrameVariant::Paired => checked_len(bytes.get_i32_le(), max_frame)?,
            FrameVariant::Single => snapshot_len,
        };
        Ok(FrameHeader {
            payload_len,
            original_len,
        })
    }
}

fn wire_len(len: usize) -> Result<i32, LinkError> {
    i32::try_from(len).map_err(|_| LinkError::FrameTooLarge {
        size: len,
        max: i32::MAX as usize,
    })
}

fn checked_len(raw: i32, max_frame: usize) -> Result<usize, LinkError> {
    let len = usize::try_from(raw).map_err(|_| LinkError::InvalidLength(raw))?;
    if len > max_frame {
        return Err(LinkError::FrameTooLarge {
            size: len,
            max: max_frame,
        });
    }
    Ok(len)
}

// ── Tests ────────────────────────────────────────────────────────
