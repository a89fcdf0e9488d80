//! Stereo PCM16 frames and their little-endian byte layout.

/// Bytes occupied by one interleaved stereo frame (two 16-bit samples).
pub const FRAME_BYTES: usize = 4;

/// One stereo sample pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StereoFrame {
    pub left: i16,
    pub right: i16,
}

impl StereoFrame {
    pub const SILENCE: StereoFrame = StereoFrame { left: 0, right: 0 };

    pub fn new(left: i16, right: i16) -> Self {
        Self { left, right }
    }

    /// Write the frame as `left, right` little-endian samples.
    ///
    /// `out` must be exactly `FRAME_BYTES` long.
    #[inline(always)]
    pub fn write_le(&self, out: &mut [u8]) {
        out[..2].copy_from_slice(&self.left.to_le_bytes());
        out[2..FRAME_BYTES].copy_from_slice(&self.right.to_le_bytes());
    }

    #[inline(always)]
    pub fn read_le(bytes: &[u8]) -> Self {
        Self {
            left: i16::from_le_bytes([bytes[0], bytes[1]]),
            right: i16::from_le_bytes([bytes[2], bytes[3]]),
        }
    }

    /// Decode a whole byte buffer into frames. Trailing bytes that do not
    /// form a complete frame are ignored.
    pub fn decode_all(bytes: &[u8]) -> Vec<StereoFrame> {
        bytes.chunks_exact(FRAME_BYTES).map(Self::read_le).collect()
    }
}
