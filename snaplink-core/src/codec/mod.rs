//! Snapshot codec: XOR delta against the previous snapshot, then a
//! general-purpose compressor.
//!
//! | Module     | Purpose                                        |
//! |------------|------------------------------------------------|
//! | `delta`    | Baseline state, encoder and decoder halves     |
//! | `compress` | zlib / zstd backends applied to the XOR delta  |

pub mod compress;
pub mod delta;

pub use compress::Compression;
pub use delta::{
    CompressTrigger, DeltaDecoder, DeltaEncoder, DeltaState, Encoded, match_ratio,
};
