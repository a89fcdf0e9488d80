//! In-process host with no audio hardware behind it.
//!
//! Streams are driven by calling [`LoopbackHost::pump_bytes`] or
//! [`LoopbackHost::pump_samples`], which play the role of the device's audio
//! thread. Every successful call is recorded, and any operation can be made to
//! fail once with [`LoopbackHost::fail_next`].

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use vibra_core::OutputFormat;

use crate::audio_device::host::{
    AudioHost, FillCallback, HostError, HostOp, HostResult, StreamHandle, StreamQueue,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCall {
    InitSubsystem,
    ShutdownSubsystem,
    Open(StreamHandle),
    Pause(StreamHandle),
    Resume(StreamHandle),
    Close(StreamHandle),
}

struct LoopbackStream {
    queue: StreamQueue,
    format: OutputFormat,
    running: bool,
}

#[derive(Default)]
struct LoopbackState {
    initialized: bool,
    next_id: u64,
    streams: BTreeMap<StreamHandle, LoopbackStream>,
    calls: Vec<HostCall>,
    pending_failures: Vec<HostOp>,
}

impl LoopbackState {
    fn take_failure(&mut self, op: HostOp) -> HostResult<()> {
        match self.pending_failures.iter().position(|pending| *pending == op) {
            Some(index) => {
                self.pending_failures.remove(index);
                Err(HostError::Injected(op))
            }
            None => Ok(()),
        }
    }

    fn stream_mut(&mut self, handle: StreamHandle) -> HostResult<&mut LoopbackStream> {
        if !self.initialized {
            return Err(HostError::NotInitialized);
        }
        self.streams.get_mut(&handle).ok_or(HostError::UnknownStream(handle))
    }
}

/// Cloning shares the same host state, so a test can keep a handle while the
/// controller owns another.
#[derive(Clone, Default)]
pub struct LoopbackHost {
    inner: Arc<Mutex<LoopbackState>>,
}

impl LoopbackHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `op` fail with [`HostError::Injected`].
    pub fn fail_next(&self, op: HostOp) {
        self.inner.lock().pending_failures.push(op);
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.inner.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.lock().initialized
    }

    /// Streams opened and not yet closed, in opening order.
    pub fn live_streams(&self) -> Vec<StreamHandle> {
        self.inner.lock().streams.keys().copied().collect()
    }

    pub fn is_running(&self, handle: StreamHandle) -> Option<bool> {
        self.inner.lock().streams.get(&handle).map(|s| s.running)
    }

    pub fn stream_format(&self, handle: StreamHandle) -> Option<OutputFormat> {
        self.inner.lock().streams.get(&handle).map(|s| s.format.clone())
    }

    /// Read `len` bytes from a running stream as its device would. Returns
    /// `None` if the stream is unknown or paused.
    pub fn pump_bytes(&self, handle: StreamHandle, len: usize) -> Option<Vec<u8>> {
        let mut state = self.inner.lock();
        let stream = state.streams.get_mut(&handle).filter(|s| s.running)?;
        Some(stream.queue.read_bytes(len))
    }

    /// Fill `out` from a running stream. Returns `false` and leaves `out`
    /// untouched if the stream is unknown or paused.
    pub fn pump_samples(&self, handle: StreamHandle, out: &mut [i16]) -> bool {
        let mut state = self.inner.lock();
        match state.streams.get_mut(&handle).filter(|s| s.running) {
            Some(stream) => {
                stream.queue.read_samples(out);
                true
            }
            None => false,
        }
    }
}

impl AudioHost for LoopbackHost {
    fn init_subsystem(&mut self) -> HostResult<()> {
        let mut state = self.inner.lock();
        state.take_failure(HostOp::InitSubsystem)?;
        state.initialized = true;
        state.calls.push(HostCall::InitSubsystem);
        Ok(())
    }

    fn shutdown_subsystem(&mut self) {
        let mut state = self.inner.lock();
        state.streams.clear();
        state.initialized = false;
        state.calls.push(HostCall::ShutdownSubsystem);
    }

    fn open_output_stream(
        &mut self,
        format: &OutputFormat,
        callback: FillCallback,
    ) -> HostResult<StreamHandle> {
        let mut state = self.inner.lock();
        state.take_failure(HostOp::OpenStream)?;
        if !state.initialized {
            return Err(HostError::NotInitialized);
        }

        state.next_id += 1;
        let handle = StreamHandle::new(state.next_id);
        state.streams.insert(
            handle,
            LoopbackStream {
                queue: StreamQueue::new(handle, callback),
                format: format.clone(),
                running: false,
            },
        );
        state.calls.push(HostCall::Open(handle));
        Ok(handle)
    }

    fn pause(&mut self, handle: StreamHandle) -> HostResult<()> {
        let mut state = self.inner.lock();
        state.take_failure(HostOp::Pause)?;
        state.stream_mut(handle)?.running = false;
        state.calls.push(HostCall::Pause(handle));
        Ok(())
    }

    fn resume(&mut self, handle: StreamHandle) -> HostResult<()> {
        let mut state = self.inner.lock();
        state.take_failure(HostOp::Resume)?;
        state.stream_mut(handle)?.running = true;
        state.calls.push(HostCall::Resume(handle));
        Ok(())
    }

    fn close(&mut self, handle: StreamHandle) -> HostResult<()> {
        let mut state = self.inner.lock();
        state.take_failure(HostOp::Close)?;
        state.stream_mut(handle)?;
        state.streams.remove(&handle);
        state.calls.push(HostCall::Close(handle));
        Ok(())
    }
}
