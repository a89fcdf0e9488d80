use std::collections::HashMap;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use crossbeam::channel::{Receiver, Sender, bounded};
use vibra_core::OutputFormat;

use crate::audio_device::enumeration::{
    DeviceInfo, EnumResult, find_output_device, list_output_devices,
};
use crate::audio_device::host::{
    AudioHost, FillCallback, HostError, HostResult, StreamHandle, StreamQueue,
};
use crate::audio_device::negotiation::{ConfigNegotiator, ConfigurationRequest, NegotiatedConfig};

const FAULT_QUEUE_DEPTH: usize = 64;

/// An error reported by the audio backend for a running stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFault {
    pub stream: StreamHandle,
    pub message: String,
}

struct Subsystem {
    device: cpal::Device,
    info: DeviceInfo,
    streams: HashMap<StreamHandle, cpal::Stream>,
}

/// [`AudioHost`] on top of the platform's default cpal host.
///
/// "Initializing the subsystem" resolves the output device and caches its
/// capabilities; shutting it down drops every stream, closed or not.
pub struct CpalHost {
    device_name: Option<String>,
    subsystem: Option<Subsystem>,
    next_stream_id: u64,
    fault_tx: Sender<StreamFault>,
    fault_rx: Receiver<StreamFault>,
}

impl CpalHost {
    /// `device_name` selects an output device by name; `None` uses the default.
    pub fn new(device_name: Option<String>) -> Self {
        let (fault_tx, fault_rx) = bounded(FAULT_QUEUE_DEPTH);
        Self {
            device_name,
            subsystem: None,
            next_stream_id: 0,
            fault_tx,
            fault_rx,
        }
    }

    /// Output devices offered by the platform's default host.
    pub fn output_devices() -> EnumResult<Vec<(cpal::Device, DeviceInfo)>> {
        list_output_devices(&cpal::default_host())
    }

    pub fn device_info(&self) -> Option<&DeviceInfo> {
        self.subsystem.as_ref().map(|s| &s.info)
    }

    /// Stream errors raised since the last call.
    pub fn drain_faults(&self) -> Vec<StreamFault> {
        self.fault_rx.try_iter().collect()
    }

    fn subsystem_mut(&mut self) -> HostResult<&mut Subsystem> {
        self.subsystem.as_mut().ok_or(HostError::NotInitialized)
    }

    fn stream(&mut self, handle: StreamHandle) -> HostResult<&cpal::Stream> {
        self.subsystem_mut()?
            .streams
            .get(&handle)
            .ok_or(HostError::UnknownStream(handle))
    }
}

impl AudioHost for CpalHost {
    fn init_subsystem(&mut self) -> HostResult<()> {
        if self.subsystem.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let (device, info) = find_output_device(&host, self.device_name.as_deref())?;
        tracing::info!(device = %info, host = info.host_name, "audio subsystem initialized");

        self.subsystem = Some(Subsystem {
            device,
            info,
            streams: HashMap::new(),
        });
        Ok(())
    }

    fn shutdown_subsystem(&mut self) {
        if let Some(subsystem) = self.subsystem.take() {
            tracing::info!(
                device = %subsystem.info.name,
                streams = subsystem.streams.len(),
                "audio subsystem shut down"
            );
        }
    }

    fn open_output_stream(
        &mut self,
        format: &OutputFormat,
        callback: FillCallback,
    ) -> HostResult<StreamHandle> {
        self.next_stream_id += 1;
        let handle = StreamHandle::new(self.next_stream_id);
        let fault_tx = self.fault_tx.clone();
        let subsystem = self.subsystem_mut()?;

        let request = ConfigurationRequest::from_output_format(format);
        let negotiated = ConfigNegotiator::negotiate(&subsystem.info, &request)?;

        let queue = StreamQueue::new(handle, callback);
        let stream = match negotiated.sample_format {
            SampleFormat::I16 => {
                build_stream::<i16>(&subsystem.device, &negotiated.stream_config, queue, fault_tx)
            }
            SampleFormat::F32 => {
                build_stream::<f32>(&subsystem.device, &negotiated.stream_config, queue, fault_tx)
            }
            other => Err(HostError::BuildStream(format!("unsupported sample format {other:?}"))),
        }?;

        // Some backends start streams immediately; streams are expected to open paused.
        if let Err(err) = stream.pause() {
            tracing::debug!(%handle, %err, "backend cannot pause a fresh stream");
        }

        log_stream_built(handle, &negotiated);
        subsystem.streams.insert(handle, stream);
        Ok(handle)
    }

    fn pause(&mut self, handle: StreamHandle) -> HostResult<()> {
        self.stream(handle)?
            .pause()
            .map_err(|e| HostError::PauseStream(e.to_string()))
    }

    fn resume(&mut self, handle: StreamHandle) -> HostResult<()> {
        self.stream(handle)?
            .play()
            .map_err(|e| HostError::PlayStream(e.to_string()))
    }

    fn close(&mut self, handle: StreamHandle) -> HostResult<()> {
        let stream = self
            .subsystem_mut()?
            .streams
            .remove(&handle)
            .ok_or(HostError::UnknownStream(handle))?;
        drop(stream);
        Ok(())
    }
}

/// Build an output stream of sample type `T` fed from `queue`. Non-i16
/// devices get each PCM16 sample converted in the data callback.
fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut queue: StreamQueue,
    fault_tx: Sender<StreamFault>,
) -> HostResult<cpal::Stream>
where
    T: SizedSample + FromSample<i16> + Send + 'static,
{
    let handle = queue.handle();
    device
        .build_output_stream::<T, _, _>(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                queue.read_converted(data, pcm_to_sample::<T>)
            },
            move |err| {
                // Dropped when the queue is full; the loop drains it between commands.
                let _ = fault_tx.try_send(StreamFault {
                    stream: handle,
                    message: err.to_string(),
                });
            },
            None,
        )
        .map_err(|e| HostError::BuildStream(e.to_string()))
}

#[inline(always)]
fn pcm_to_sample<T: Sample + FromSample<i16>>(pcm: i16) -> T {
    T::from_sample(pcm)
}

fn log_stream_built(handle: StreamHandle, negotiated: &NegotiatedConfig) {
    let converted = negotiated.sample_format != SampleFormat::I16;
    match negotiated.buffer_size {
        BufferSize::Fixed(frames) => tracing::debug!(
            %handle,
            config = %negotiated,
            converted,
            latency_ms = ConfigNegotiator::calculate_latency_ms(negotiated.sample_rate, frames),
            "output stream built"
        ),
        _ => {
            tracing::debug!(%handle, config = %negotiated, converted, "output stream built")
        }
    }
}
