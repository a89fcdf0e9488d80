//! Lock-conscious slot that serves device fill requests.
//!
//! Design goals:
//! - One generator shared by every stream the controller opens, so the tone
//!   stays phase-continuous across reopen.
//! - No OS mutex in the audio callback: the adapter sits behind a spinning
//!   lock taken with `try_lock`.
//! - If another stream's callback holds the adapter (an old stream still
//!   draining while a new one starts), answer with silence instead of waiting.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;
use vibra_core::FRAME_BYTES;

use crate::audio_device::host::{FillCallback, FillRequest, StreamSink};
use crate::rt_processing::fill::{BufferFillAdapter, FrameSource};
use crate::rt_processing::performance::{PerformanceMonitor, PerformanceSnapshot};

const SILENCE: [u8; 1024] = [0; 1024];

/// Shared entry point for fill callbacks. Cloning shares the same adapter.
pub struct FillSlot<S: FrameSource> {
    adapter: Arc<Mutex<BufferFillAdapter<S>>>,
    monitor: Arc<PerformanceMonitor>,
    /// Frames handed to devices, silence included.
    frame_clock: Arc<AtomicU64>,
    sample_rate: u32,
}

impl<S: FrameSource> Clone for FillSlot<S> {
    fn clone(&self) -> Self {
        Self {
            adapter: Arc::clone(&self.adapter),
            monitor: Arc::clone(&self.monitor),
            frame_clock: Arc::clone(&self.frame_clock),
            sample_rate: self.sample_rate,
        }
    }
}

impl<S: FrameSource> FillSlot<S> {
    pub fn new(adapter: BufferFillAdapter<S>, sample_rate: u32) -> Self {
        Self {
            adapter: Arc::new(Mutex::new(adapter)),
            monitor: Arc::new(PerformanceMonitor::new(sample_rate, 0.1)),
            frame_clock: Arc::new(AtomicU64::new(0)),
            sample_rate,
        }
    }

    /// Answer one device request. Called from the audio thread.
    ///
    /// Unaligned requests are refused: nothing is submitted and the refusal is
    /// counted. Performs no allocation once the adapter's buffer has grown to
    /// the device's steady-state request size.
    pub fn serve(&self, request: FillRequest, sink: &mut dyn StreamSink) {
        let _timing = self.monitor.scoped_callback();
        let requested = request.additional_bytes;

        let Some(mut adapter) = self.adapter.try_lock() else {
            if requested % FRAME_BYTES != 0 {
                self.monitor.increment_rejected_count();
                return;
            }
            submit_silence(sink, requested);
            self.monitor.increment_underrun_count();
            self.account(requested);
            return;
        };

        match adapter.fill(requested) {
            Ok(bytes) => {
                sink.submit(bytes);
                self.account(requested);
            }
            Err(_) => self.monitor.increment_rejected_count(),
        }
    }

    /// A boxed callback for registering with a host stream.
    pub fn callback(&self) -> FillCallback {
        let slot = self.clone();
        Box::new(move |request, sink| slot.serve(request, sink))
    }

    /// Run `f` against the adapter, spinning until it is free. Not for the
    /// audio thread.
    pub fn with_adapter<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut BufferFillAdapter<S>) -> R,
    {
        let mut guard = self.adapter.lock();
        f(&mut guard)
    }

    pub fn frames_served(&self) -> u64 {
        self.frame_clock.load(Ordering::Relaxed)
    }

    /// Seconds of audio handed out so far.
    pub fn playback_time(&self) -> f64 {
        self.frames_served() as f64 / self.sample_rate as f64
    }

    pub fn stats(&self) -> PerformanceSnapshot {
        self.monitor.snapshot()
    }

    fn account(&self, bytes: usize) {
        let frames = (bytes / FRAME_BYTES) as u64;
        self.frame_clock.fetch_add(frames, Ordering::Relaxed);
        self.monitor.add_frames_processed(frames);
        self.monitor.add_bytes_submitted(bytes as u64);
    }
}

fn submit_silence(sink: &mut dyn StreamSink, mut remaining: usize) {
    while remaining > 0 {
        let chunk = remaining.min(SILENCE.len());
        sink.submit(&SILENCE[..chunk]);
        remaining -= chunk;
    }
}
