//! Packs pulled frames into the interleaved PCM16 bytes a device asks for.

use thiserror::Error;
use vibra_core::{FRAME_BYTES, StereoFrame};

/// Anything that can hand out stereo frames one at a time.
///
/// `None` means the source has run dry; the adapter writes silence for it.
pub trait FrameSource: Send + 'static {
    fn pull_frame(&mut self) -> Option<StereoFrame>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FillError {
    #[error("requested {requested} bytes, which is not a multiple of the {frame_bytes}-byte frame")]
    UnalignedRequest { requested: usize, frame_bytes: usize },
}

/// Pull-side adapter between a [`FrameSource`] and a byte-oriented device.
///
/// The scratch buffer grows to twice the request whenever a request outgrows
/// it and never shrinks.
pub struct BufferFillAdapter<S: FrameSource> {
    source: S,
    buffer: Vec<u8>,
    allocations: usize,
    silent_frames: u64,
}

impl<S: FrameSource> BufferFillAdapter<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            buffer: Vec::new(),
            allocations: 0,
            silent_frames: 0,
        }
    }

    /// Start with `bytes` of scratch space so the first callbacks don't allocate.
    pub fn with_capacity(source: S, bytes: usize) -> Self {
        let mut adapter = Self::new(source);
        if bytes > 0 {
            adapter.buffer = vec![0; bytes];
            adapter.allocations = 1;
        }
        adapter
    }

    /// Produce exactly `requested` bytes of interleaved little-endian frames.
    ///
    /// The returned slice borrows the scratch buffer and is only valid until
    /// the next call.
    pub fn fill(&mut self, requested: usize) -> Result<&[u8], FillError> {
        if requested % FRAME_BYTES != 0 {
            return Err(FillError::UnalignedRequest {
                requested,
                frame_bytes: FRAME_BYTES,
            });
        }

        if self.buffer.len() < requested {
            self.buffer = vec![0; requested * 2];
            self.allocations += 1;
        }

        let out = &mut self.buffer[..requested];
        for slot in out.chunks_exact_mut(FRAME_BYTES) {
            let frame = match self.source.pull_frame() {
                Some(frame) => frame,
                None => {
                    self.silent_frames += 1;
                    StereoFrame::SILENCE
                }
            };
            frame.write_le(slot);
        }

        Ok(&self.buffer[..requested])
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Number of times the scratch buffer has been (re)allocated.
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    /// Frames written as silence because the source had nothing to give.
    pub fn silent_frames(&self) -> u64 {
        self.silent_frames
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}
