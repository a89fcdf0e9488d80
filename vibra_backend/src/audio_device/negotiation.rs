use std::fmt;

use cpal::{BufferSize, SampleFormat, SampleRate, StreamConfig};
use vibra_core::{OutputFormat, SampleEncoding};

use crate::audio_device::enumeration::{DeviceInfo, SupportedRange};

/// What the harness asks a device for. Rate and channel count must be matched
/// exactly. The sample format may fall back to F32 when
/// `allow_format_conversion` is set; the stream then converts each sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationRequest {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
    pub buffer_size: Option<u32>,
    pub allow_format_conversion: bool,
}

impl ConfigurationRequest {
    pub fn new(sample_rate: u32, channels: u16, sample_format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channels,
            sample_format,
            buffer_size: None,
            allow_format_conversion: false,
        }
    }

    pub fn with_format_conversion(mut self) -> Self {
        self.allow_format_conversion = true;
        self
    }

    /// Formats to try, in order of preference.
    pub fn candidate_formats(&self) -> Vec<SampleFormat> {
        let mut formats = vec![self.sample_format];
        if self.allow_format_conversion && self.sample_format != SampleFormat::F32 {
            formats.push(SampleFormat::F32);
        }
        formats
    }

    pub fn with_buffer_size(mut self, frames: u32) -> Self {
        self.buffer_size = Some(frames);
        self
    }

    pub fn from_output_format(format: &OutputFormat) -> Self {
        let sample_format = match format.encoding {
            SampleEncoding::S16Le => SampleFormat::I16,
        };
        let request = Self::new(format.sample_rate_hz, format.channels, sample_format)
            .with_format_conversion();
        match format.buffer_frames {
            Some(frames) => request.with_buffer_size(frames),
            None => request,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NegotiatedConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_size: BufferSize,
    pub sample_format: SampleFormat,
    pub stream_config: StreamConfig,
}

impl fmt::Display for NegotiatedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}ch @ {}Hz, buffer: {:?}, format: {:?}",
            self.channels, self.sample_rate, self.buffer_size, self.sample_format
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    SampleRateNotSupported { requested: u32, available: Vec<(u32, u32)> },
    ChannelsNotSupported { requested: u16, available: Vec<u16> },
    FormatNotSupported { requested: SampleFormat, available: Vec<SampleFormat> },
    BufferSizeNotSupported { requested: u32, min: u32, max: u32 },
    NoCompatibleConfiguration,
}

impl fmt::Display for NegotiationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SampleRateNotSupported { requested, available } => {
                write!(f, "Sample rate {} not supported. Available ranges: {:?}", requested, available)
            }
            Self::ChannelsNotSupported { requested, available } => {
                write!(f, "Channel count {} not supported. Available: {:?}", requested, available)
            }
            Self::FormatNotSupported { requested, available } => {
                write!(f, "Sample format {:?} not supported. Available: {:?}", requested, available)
            }
            Self::BufferSizeNotSupported { requested, min, max } => {
                write!(f, "Buffer size {} not supported by device ({} - {})", requested, min, max)
            }
            Self::NoCompatibleConfiguration => {
                write!(f, "No compatible configuration found for device")
            }
        }
    }
}

impl std::error::Error for NegotiationError {}

pub type NegotiationResult<T> = Result<T, NegotiationError>;

pub struct ConfigNegotiator;

impl ConfigNegotiator {
    /// Find a supported range that satisfies the request.
    ///
    /// Each candidate format is tried in turn. If none fits, the error is the
    /// one for the requested format.
    pub fn negotiate(
        device_info: &DeviceInfo,
        request: &ConfigurationRequest,
    ) -> NegotiationResult<NegotiatedConfig> {
        if device_info.supported.is_empty() {
            return Err(NegotiationError::NoCompatibleConfiguration);
        }

        let mut first_error = None;
        for format in request.candidate_formats() {
            match Self::negotiate_format(device_info, request, format) {
                Ok(config) => return Ok(config),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        Err(first_error.unwrap_or(NegotiationError::NoCompatibleConfiguration))
    }

    /// Checks narrow from format to channels to sample rate so the error names
    /// the first property the device cannot provide.
    fn negotiate_format(
        device_info: &DeviceInfo,
        request: &ConfigurationRequest,
        sample_format: SampleFormat,
    ) -> NegotiationResult<NegotiatedConfig> {
        let with_format: Vec<&SupportedRange> = device_info
            .supported
            .iter()
            .filter(|r| r.sample_format == sample_format)
            .collect();
        if with_format.is_empty() {
            return Err(NegotiationError::FormatNotSupported {
                requested: sample_format,
                available: device_info.sample_formats(),
            });
        }

        let with_channels: Vec<&SupportedRange> = with_format
            .iter()
            .copied()
            .filter(|r| r.channels == request.channels)
            .collect();
        if with_channels.is_empty() {
            let mut available: Vec<u16> = with_format.iter().map(|r| r.channels).collect();
            available.sort_unstable();
            available.dedup();
            return Err(NegotiationError::ChannelsNotSupported {
                requested: request.channels,
                available,
            });
        }

        let range = with_channels
            .iter()
            .copied()
            .find(|r| r.contains_rate(request.sample_rate))
            .ok_or_else(|| NegotiationError::SampleRateNotSupported {
                requested: request.sample_rate,
                available: with_channels
                    .iter()
                    .map(|r| (r.min_sample_rate, r.max_sample_rate))
                    .collect(),
            })?;

        let buffer_size = Self::negotiate_buffer_size(range, request)?;

        let stream_config = StreamConfig {
            channels: request.channels,
            sample_rate: SampleRate(request.sample_rate),
            buffer_size: buffer_size.clone(),
        };

        Ok(NegotiatedConfig {
            sample_rate: request.sample_rate,
            channels: request.channels,
            buffer_size,
            sample_format,
            stream_config,
        })
    }

    fn negotiate_buffer_size(
        range: &SupportedRange,
        request: &ConfigurationRequest,
    ) -> NegotiationResult<BufferSize> {
        match (request.buffer_size, range.buffer_frames) {
            (None, _) => Ok(BufferSize::Default),
            (Some(requested), Some((min, max))) if requested < min || requested > max => {
                Err(NegotiationError::BufferSizeNotSupported { requested, min, max })
            }
            (Some(requested), _) => Ok(BufferSize::Fixed(requested)),
        }
    }

    pub fn calculate_latency_ms(sample_rate: u32, buffer_size: u32) -> f32 {
        (buffer_size as f32 / sample_rate as f32) * 1000.0
    }
}
