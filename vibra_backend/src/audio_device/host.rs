//! The capability set the lifecycle controller needs from an audio subsystem.
//!
//! Hosts are pull-based: when a stream's queue of submitted bytes runs low the
//! host invokes the stream's [`FillCallback`] with a [`FillRequest`], and the
//! callback answers through a [`StreamSink`] bound to that stream.

use std::collections::VecDeque;
use std::fmt;

use thiserror::Error;
use vibra_core::OutputFormat;

use crate::audio_device::negotiation::NegotiationError;

/// Opaque identifier of one opened output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamHandle(u64);

impl StreamHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream#{}", self.0)
    }
}

/// A device asking for more data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillRequest {
    /// Bytes the device wants submitted before the callback returns.
    pub additional_bytes: usize,
    /// Bytes already queued on the stream.
    pub queued_bytes: usize,
}

/// Where a fill callback delivers its bytes.
pub trait StreamSink {
    fn handle(&self) -> StreamHandle;
    fn submit(&mut self, bytes: &[u8]);
}

/// Invoked from the host's audio thread whenever a stream needs data.
pub type FillCallback = Box<dyn FnMut(FillRequest, &mut dyn StreamSink) + Send + 'static>;

/// Operations a host can be asked to perform; used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOp {
    InitSubsystem,
    OpenStream,
    Pause,
    Resume,
    Close,
}

impl fmt::Display for HostOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InitSubsystem => "init subsystem",
            Self::OpenStream => "open stream",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Close => "close",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("audio subsystem is not initialized")]
    NotInitialized,

    #[error("no default output device")]
    NoDevice,

    #[error("output device not found: {0}")]
    DeviceNotFound(String),

    #[error("unknown stream {0}")]
    UnknownStream(StreamHandle),

    #[error("format negotiation failed: {0}")]
    Negotiation(#[from] NegotiationError),

    #[error("device query failed: {0}")]
    Device(String),

    #[error("failed to build output stream: {0}")]
    BuildStream(String),

    #[error("failed to start stream: {0}")]
    PlayStream(String),

    #[error("failed to pause stream: {0}")]
    PauseStream(String),

    #[error("injected failure during {0}")]
    Injected(HostOp),
}

pub type HostResult<T> = Result<T, HostError>;

/// Host audio subsystem.
///
/// Streams start paused. `pause` and `resume` are idempotent. Streams that
/// are never closed are reclaimed by `shutdown_subsystem`.
pub trait AudioHost {
    fn init_subsystem(&mut self) -> HostResult<()>;

    fn shutdown_subsystem(&mut self);

    fn open_output_stream(
        &mut self,
        format: &OutputFormat,
        callback: FillCallback,
    ) -> HostResult<StreamHandle>;

    fn pause(&mut self, stream: StreamHandle) -> HostResult<()>;

    fn resume(&mut self, stream: StreamHandle) -> HostResult<()>;

    fn close(&mut self, stream: StreamHandle) -> HostResult<()>;
}

/// Per-stream byte queue that turns device reads into fill callbacks.
///
/// Hosts own one per stream and drain it from their audio thread. Whenever a
/// read needs more than is queued, the callback is asked for the difference.
pub struct StreamQueue {
    handle: StreamHandle,
    queued: VecDeque<u8>,
    callback: FillCallback,
}

impl StreamQueue {
    pub fn new(handle: StreamHandle, callback: FillCallback) -> Self {
        Self {
            handle,
            queued: VecDeque::new(),
            callback,
        }
    }

    pub fn handle(&self) -> StreamHandle {
        self.handle
    }

    pub fn queued_bytes(&self) -> usize {
        self.queued.len()
    }

    /// Make sure at least `wanted` bytes are queued, asking the callback for
    /// the shortfall.
    pub fn request(&mut self, wanted: usize) {
        let queued_bytes = self.queued.len();
        if queued_bytes >= wanted {
            return;
        }
        let request = FillRequest {
            additional_bytes: wanted - queued_bytes,
            queued_bytes,
        };
        let mut sink = QueueSink {
            handle: self.handle,
            queued: &mut self.queued,
        };
        (self.callback)(request, &mut sink);
    }

    /// Fill `out` with little-endian samples, requesting data first.
    /// Anything the callback failed to supply plays as silence.
    pub fn read_samples(&mut self, out: &mut [i16]) {
        self.read_converted(out, |sample| sample);
    }

    /// Like [`read_samples`](Self::read_samples), for devices that take
    /// another sample type. `convert` maps each decoded i16 sample.
    pub fn read_converted<T>(&mut self, out: &mut [T], convert: impl Fn(i16) -> T) {
        self.request(out.len() * 2);
        for sample in out.iter_mut() {
            let pcm = match (self.queued.pop_front(), self.queued.pop_front()) {
                (Some(lo), Some(hi)) => i16::from_le_bytes([lo, hi]),
                _ => 0,
            };
            *sample = convert(pcm);
        }
    }

    /// Read raw bytes, requesting data first. May return fewer than `len`
    /// if the callback under-delivered.
    pub fn read_bytes(&mut self, len: usize) -> Vec<u8> {
        self.request(len);
        let take = len.min(self.queued.len());
        self.queued.drain(..take).collect()
    }
}

struct QueueSink<'a> {
    handle: StreamHandle,
    queued: &'a mut VecDeque<u8>,
}

impl StreamSink for QueueSink<'_> {
    fn handle(&self) -> StreamHandle {
        self.handle
    }

    fn submit(&mut self, bytes: &[u8]) {
        self.queued.extend(bytes.iter().copied());
    }
}
