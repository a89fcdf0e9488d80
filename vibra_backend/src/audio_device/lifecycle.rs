//! Device lifecycle: open, pause, resume, reopen and full subsystem restart.
//!
//! ```text
//!   SubsystemShutdown --init--> Unopened --open--> OpenPaused <--pause/resume--> OpenRunning
//!          ^                        ^                  |                            |
//!          |                        +---- reinitialize (then open + resume) --------+
//!          +------------------------- full restart (then init + open + resume) -----+
//! ```
//!
//! Every transition is attempted once. A failure aborts the transition and is
//! returned to the caller; the controller keeps whatever state the steps
//! before the failure reached and does not roll back.

use std::fmt;

use thiserror::Error;
use vibra_core::{HarnessConfig, OutputFormat, ReinitPolicy};

use crate::audio_device::host::{AudioHost, HostError, StreamHandle};
use crate::rt_processing::callback::FillSlot;
use crate::rt_processing::fill::{BufferFillAdapter, FrameSource};
use crate::rt_processing::waveform::WaveformGenerator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Subsystem is up, no stream is open.
    Unopened,
    OpenPaused,
    OpenRunning,
    /// Subsystem is down (also the state before the first start).
    SubsystemShutdown,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unopened => "unopened",
            Self::OpenPaused => "open-paused",
            Self::OpenRunning => "open-running",
            Self::SubsystemShutdown => "subsystem-shutdown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOp {
    Pause,
    Resume,
    Close,
}

impl fmt::Display for ControlOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pause => f.write_str("pause"),
            Self::Resume => f.write_str("resume"),
            Self::Close => f.write_str("close"),
        }
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("audio subsystem failed to initialize: {0}")]
    SubsystemInit(#[source] HostError),

    #[error("failed to open output stream: {0}")]
    StreamOpen(#[source] HostError),

    #[error("failed to {op} {stream}: {source}")]
    StreamControl {
        op: ControlOp,
        stream: StreamHandle,
        #[source]
        source: HostError,
    },

    #[error("cannot {op} while {state}")]
    InvalidState {
        op: &'static str,
        state: LifecycleState,
    },
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Owns the host and the single current stream, and rewires the shared fill
/// slot onto every stream it opens.
pub struct DeviceLifecycleController<H: AudioHost, S: FrameSource> {
    host: H,
    format: OutputFormat,
    reinit_policy: ReinitPolicy,
    slot: FillSlot<S>,

    state: LifecycleState,
    stream: Option<StreamHandle>,
    /// Streams dropped by `ReinitPolicy::Discard`, still owned by the host
    /// until the next subsystem shutdown.
    discarded: Vec<StreamHandle>,
}

impl<H: AudioHost> DeviceLifecycleController<H, WaveformGenerator> {
    /// Build the generator, adapter and slot described by `config`.
    pub fn from_config(host: H, config: &HarnessConfig) -> Self {
        let generator = WaveformGenerator::new(&config.tone);
        let adapter = BufferFillAdapter::with_capacity(generator, config.fill.initial_buffer_bytes);
        let slot = FillSlot::new(adapter, config.output.sample_rate_hz);
        Self::new(host, config.output.clone(), config.lifecycle.reinit_policy, slot)
    }
}

impl<H: AudioHost, S: FrameSource> DeviceLifecycleController<H, S> {
    pub fn new(host: H, format: OutputFormat, reinit_policy: ReinitPolicy, slot: FillSlot<S>) -> Self {
        Self {
            host,
            format,
            reinit_policy,
            slot,
            state: LifecycleState::SubsystemShutdown,
            stream: None,
            discarded: Vec::new(),
        }
    }

    /// Bring the subsystem up and leave a running stream.
    pub fn start(&mut self) -> LifecycleResult<()> {
        self.init_subsystem()?;
        self.open()?;
        self.resume()
    }

    pub fn init_subsystem(&mut self) -> LifecycleResult<()> {
        self.expect_state("initialize the subsystem", &[LifecycleState::SubsystemShutdown])?;
        self.host.init_subsystem().map_err(LifecycleError::SubsystemInit)?;
        self.transition(LifecycleState::Unopened);
        Ok(())
    }

    /// Open a stream in the configured format, registering the fill slot.
    /// New streams start paused.
    pub fn open(&mut self) -> LifecycleResult<StreamHandle> {
        self.expect_state("open a stream", &[LifecycleState::Unopened])?;
        let handle = self
            .host
            .open_output_stream(&self.format, self.slot.callback())
            .map_err(LifecycleError::StreamOpen)?;
        self.stream = Some(handle);
        tracing::info!(stream = %handle, format = %self.format, "output stream opened");
        self.transition(LifecycleState::OpenPaused);
        Ok(handle)
    }

    /// Start playback. A no-op on a running stream.
    pub fn resume(&mut self) -> LifecycleResult<()> {
        match self.state {
            LifecycleState::OpenRunning => Ok(()),
            LifecycleState::OpenPaused => {
                let stream = self.current_stream_or("resume")?;
                self.control(ControlOp::Resume, stream)?;
                self.transition(LifecycleState::OpenRunning);
                Ok(())
            }
            state => Err(LifecycleError::InvalidState { op: "resume", state }),
        }
    }

    /// Stop playback. A no-op on a paused stream.
    pub fn pause(&mut self) -> LifecycleResult<()> {
        match self.state {
            LifecycleState::OpenPaused => Ok(()),
            LifecycleState::OpenRunning => {
                let stream = self.current_stream_or("pause")?;
                self.control(ControlOp::Pause, stream)?;
                self.transition(LifecycleState::OpenPaused);
                Ok(())
            }
            state => Err(LifecycleError::InvalidState { op: "pause", state }),
        }
    }

    /// Replace the current stream with a fresh running one.
    ///
    /// The old stream is paused, then closed or merely discarded depending on
    /// the [`ReinitPolicy`].
    pub fn reinitialize(&mut self) -> LifecycleResult<StreamHandle> {
        if self.state == LifecycleState::SubsystemShutdown {
            return Err(LifecycleError::InvalidState {
                op: "reinitialize",
                state: self.state,
            });
        }

        if let Some(old) = self.stream {
            // The host treats pausing a paused stream as a no-op.
            self.control(ControlOp::Pause, old)?;
            self.transition(LifecycleState::OpenPaused);

            match self.reinit_policy {
                ReinitPolicy::Close => {
                    self.control(ControlOp::Close, old)?;
                    tracing::debug!(stream = %old, "closed previous stream");
                }
                ReinitPolicy::Discard => {
                    self.discarded.push(old);
                    tracing::debug!(
                        stream = %old,
                        discarded = self.discarded.len(),
                        "discarded previous stream without closing"
                    );
                }
            }
            self.stream = None;
            self.transition(LifecycleState::Unopened);
        }

        let handle = self.open()?;
        self.resume()?;
        self.log_stats();
        Ok(handle)
    }

    /// Close the stream, tear the whole subsystem down and bring it back with
    /// a new running stream.
    pub fn full_restart(&mut self) -> LifecycleResult<StreamHandle> {
        self.shutdown()?;
        self.init_subsystem()?;
        let handle = self.open()?;
        self.resume()?;
        self.log_stats();
        Ok(handle)
    }

    /// Pause and close the current stream and shut the subsystem down.
    pub fn shutdown(&mut self) -> LifecycleResult<()> {
        if let Some(stream) = self.stream {
            self.control(ControlOp::Pause, stream)?;
            self.transition(LifecycleState::OpenPaused);
            self.control(ControlOp::Close, stream)?;
            self.stream = None;
            self.transition(LifecycleState::Unopened);
        }

        if self.state != LifecycleState::SubsystemShutdown {
            self.host.shutdown_subsystem();
            if !self.discarded.is_empty() {
                tracing::debug!(count = self.discarded.len(), "subsystem reclaimed discarded streams");
            }
            self.discarded.clear();
            self.transition(LifecycleState::SubsystemShutdown);
        }
        Ok(())
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn current_stream(&self) -> Option<StreamHandle> {
        self.stream
    }

    pub fn discarded_streams(&self) -> &[StreamHandle] {
        &self.discarded
    }

    pub fn reinit_policy(&self) -> ReinitPolicy {
        self.reinit_policy
    }

    pub fn format(&self) -> &OutputFormat {
        &self.format
    }

    pub fn slot(&self) -> &FillSlot<S> {
        &self.slot
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    fn control(&mut self, op: ControlOp, stream: StreamHandle) -> LifecycleResult<()> {
        let result = match op {
            ControlOp::Pause => self.host.pause(stream),
            ControlOp::Resume => self.host.resume(stream),
            ControlOp::Close => self.host.close(stream),
        };
        result.map_err(|source| LifecycleError::StreamControl { op, stream, source })
    }

    fn current_stream_or(&self, op: &'static str) -> LifecycleResult<StreamHandle> {
        self.stream.ok_or(LifecycleError::InvalidState {
            op,
            state: self.state,
        })
    }

    fn expect_state(&self, op: &'static str, allowed: &[LifecycleState]) -> LifecycleResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(LifecycleError::InvalidState {
                op,
                state: self.state,
            })
        }
    }

    fn transition(&mut self, next: LifecycleState) {
        if self.state != next {
            tracing::info!(from = %self.state, to = %next, stream = ?self.stream, "lifecycle transition");
            self.state = next;
        }
    }

    fn log_stats(&self) {
        tracing::debug!(
            stats = %self.slot.stats(),
            playback_secs = self.slot.playback_time(),
            "fill callback counters"
        );
    }
}
