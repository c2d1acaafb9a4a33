//! Frame chunking: flat producer output to per-zone RGB triples.
//!
//! The producer emits one frame as a flat sequence of channel values,
//! `[r0, g0, b0, r1, g1, b1, ...]`, one triple per light zone.  The bridge
//! expects `[(r0, g0, b0), (r1, g1, b1), ...]`.
//!
//! A frame whose length is not a multiple of three is rejected with
//! [`FrameError::Malformed`]; a trailing partial triple is never truncated
//! away.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of channel values per light zone.
pub const CHANNELS_PER_ZONE: usize = 3;

/// Error type for frame chunking.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The frame length is not divisible by [`CHANNELS_PER_ZONE`].
    #[error("malformed frame: {len} channel values is not a multiple of 3")]
    Malformed { len: usize },
}

/// One zone's colour.  Serializes as a `[r, g, b]` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ColorTriple(pub u8, pub u8, pub u8);

impl From<[u8; 3]> for ColorTriple {
    fn from([r, g, b]: [u8; 3]) -> Self {
        ColorTriple(r, g, b)
    }
}

impl From<ColorTriple> for [u8; 3] {
    fn from(c: ColorTriple) -> Self {
        [c.0, c.1, c.2]
    }
}

/// Groups `values` into ordered triples.
///
/// Triple `i` is `(values[3i], values[3i + 1], values[3i + 2])`.  An empty
/// frame yields an empty triple list.
///
/// # Errors
///
/// Returns [`FrameError::Malformed`] if `values.len()` is not a multiple of 3.
///
/// # Example
///
/// ```rust
/// use huesync_core::{chunk_frame, ColorTriple};
///
/// let triples = chunk_frame(&[1, 2, 3, 4, 5, 6]).unwrap();
/// assert_eq!(triples, vec![ColorTriple(1, 2, 3), ColorTriple(4, 5, 6)]);
/// assert!(chunk_frame(&[1, 2, 3, 4, 5, 6, 7]).is_err());
/// ```
pub fn chunk_frame(values: &[u8]) -> Result<Vec<ColorTriple>, FrameError> {
    if values.len() % CHANNELS_PER_ZONE != 0 {
        return Err(FrameError::Malformed { len: values.len() });
    }

    Ok(values
        .chunks_exact(CHANNELS_PER_ZONE)
        .map(|c| ColorTriple(c[0], c[1], c[2]))
        .collect())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
