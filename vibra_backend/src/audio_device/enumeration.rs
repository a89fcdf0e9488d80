use std::fmt;

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{SampleFormat, SupportedBufferSize};

use crate::audio_device::host::HostError;

/// One supported stream configuration range as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedRange {
    pub channels: u16,
    pub sample_format: SampleFormat,
    pub min_sample_rate: u32,
    pub max_sample_rate: u32,
    /// Device buffer size limits in frames, when the backend reports them.
    pub buffer_frames: Option<(u32, u32)>,
}

impl SupportedRange {
    pub fn contains_rate(&self, rate: u32) -> bool {
        rate >= self.min_sample_rate && rate <= self.max_sample_rate
    }
}

#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub host_name: &'static str,
    pub is_default: bool,

    pub supported: Vec<SupportedRange>,

    pub default_sample_rate: u32,
    pub default_channels: u16,
    pub default_sample_format: SampleFormat,
}

impl DeviceInfo {
    pub fn min_sample_rate(&self) -> u32 {
        self.supported.iter().map(|r| r.min_sample_rate).min().unwrap_or(self.default_sample_rate)
    }

    pub fn max_sample_rate(&self) -> u32 {
        self.supported.iter().map(|r| r.max_sample_rate).max().unwrap_or(self.default_sample_rate)
    }

    pub fn max_channels(&self) -> u16 {
        self.supported.iter().map(|r| r.channels).max().unwrap_or(self.default_channels)
    }

    pub fn sample_formats(&self) -> Vec<SampleFormat> {
        let mut formats: Vec<SampleFormat> = Vec::new();
        for range in &self.supported {
            if !formats.contains(&range.sample_format) {
                formats.push(range.sample_format);
            }
        }
        formats
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}ch @ {}Hz {:?}]{}",
            self.name,
            self.default_channels,
            self.default_sample_rate,
            self.default_sample_format,
            if self.is_default { " (default)" } else { "" }
        )
    }
}

pub type EnumResult<T> = Result<T, EnumError>;

#[derive(Debug)]
pub enum EnumError {
    NoDevicesFound,
    DeviceNotFound(String),
    QueryFailed(String),
}

impl fmt::Display for EnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDevicesFound => write!(f, "No output devices found"),
            Self::DeviceNotFound(name) => write!(f, "Device not found: {}", name),
            Self::QueryFailed(msg) => write!(f, "Device query failed: {}", msg),
        }
    }
}

impl std::error::Error for EnumError {}

impl From<EnumError> for HostError {
    fn from(err: EnumError) -> Self {
        match err {
            EnumError::NoDevicesFound => HostError::NoDevice,
            EnumError::DeviceNotFound(name) => HostError::DeviceNotFound(name),
            EnumError::QueryFailed(msg) => HostError::Device(msg),
        }
    }
}

/// Collect capabilities of an output device.
pub fn query_output_device(
    device: &cpal::Device,
    host_name: &'static str,
    is_default: bool,
) -> EnumResult<DeviceInfo> {
    let name = device
        .name()
        .map_err(|e| EnumError::QueryFailed(format!("Failed to get device name: {}", e)))?;

    let default_config = device
        .default_output_config()
        .map_err(|e| EnumError::QueryFailed(format!("Failed to get default config: {}", e)))?;

    let configs = device
        .supported_output_configs()
        .map_err(|e| EnumError::QueryFailed(format!("Failed to get supported configs: {}", e)))?;

    let supported = configs
        .map(|range| SupportedRange {
            channels: range.channels(),
            sample_format: range.sample_format(),
            min_sample_rate: range.min_sample_rate().0,
            max_sample_rate: range.max_sample_rate().0,
            buffer_frames: match range.buffer_size() {
                SupportedBufferSize::Range { min, max } => Some((*min, *max)),
                SupportedBufferSize::Unknown => None,
            },
        })
        .collect();

    Ok(DeviceInfo {
        name,
        host_name,
        is_default,
        supported,
        default_sample_rate: default_config.sample_rate().0,
        default_channels: default_config.channels(),
        default_sample_format: default_config.sample_format(),
    })
}

/// Every output device of `host` that answers capability queries.
pub fn list_output_devices(host: &cpal::Host) -> EnumResult<Vec<(cpal::Device, DeviceInfo)>> {
    let host_name = host.id().name();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    let devices = host
        .output_devices()
        .map_err(|e| EnumError::QueryFailed(format!("Failed to list output devices: {}", e)))?;

    let mut found = Vec::new();
    for device in devices {
        let is_default = match (&default_name, device.name()) {
            (Some(default), Ok(name)) => *default == name,
            _ => false,
        };
        match query_output_device(&device, host_name, is_default) {
            Ok(info) => found.push((device, info)),
            Err(err) => tracing::debug!(%err, "skipping output device"),
        }
    }

    if found.is_empty() {
        return Err(EnumError::NoDevicesFound);
    }
    Ok(found)
}

/// Resolve the output device to use: the named one, or the host default.
pub fn find_output_device(
    host: &cpal::Host,
    name: Option<&str>,
) -> EnumResult<(cpal::Device, DeviceInfo)> {
    let Some(wanted) = name else {
        let device = host.default_output_device().ok_or(EnumError::NoDevicesFound)?;
        let info = query_output_device(&device, host.id().name(), true)?;
        return Ok((device, info));
    };

    let mut devices = list_output_devices(host)?;
    let index = match_device_name(devices.iter().map(|(_, info)| info.name.as_str()), wanted)
        .ok_or_else(|| EnumError::DeviceNotFound(wanted.to_string()))?;
    Ok(devices.swap_remove(index))
}

/// Index of the best name match: case-insensitive exact first, then partial.
pub fn match_device_name<'a>(names: impl Iterator<Item = &'a str>, wanted: &str) -> Option<usize> {
    let wanted = wanted.to_lowercase();
    let names: Vec<String> = names.map(str::to_lowercase).collect();

    names
        .iter()
        .position(|name| *name == wanted)
        .or_else(|| names.iter().position(|name| name.contains(&wanted)))
}

pub fn print_device_list(devices: &[(cpal::Device, DeviceInfo)]) {
    println!("Output Devices:");
    for (idx, (_, device)) in devices.iter().enumerate() {
        println!("  [{}] {} via {}", idx, device, device.host_name);
        println!("      Sample rates: {} - {} Hz", device.min_sample_rate(), device.max_sample_rate());
        println!("      Channels: {} (max: {})", device.default_channels, device.max_channels());
        println!("      Formats: {:?}", device.sample_formats());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_name_beats_partial() {
        let names = ["Speakers (USB Audio)", "USB Audio", "HDMI"];
        assert_eq!(match_device_name(names.into_iter(), "usb audio"), Some(1));
    }

    #[test]
    fn partial_name_matches_case_insensitively() {
        let names = ["Built-in Output", "HDMI Output"];
        assert_eq!(match_device_name(names.into_iter(), "hdmi"), Some(1));
        assert_eq!(match_device_name(names.into_iter(), "bluetooth"), None);
    }

    #[test]
    fn summary_accessors_fold_ranges() {
        let info = DeviceInfo {
            name: "Test".into(),
            host_name: "ALSA",
            is_default: true,
            supported: vec![
                SupportedRange {
                    channels: 2,
                    sample_format: SampleFormat::I16,
                    min_sample_rate: 44_100,
                    max_sample_rate: 48_000,
                    buffer_frames: None,
                },
                SupportedRange {
                    channels: 8,
                    sample_format: SampleFormat::F32,
                    min_sample_rate: 8_000,
                    max_sample_rate: 192_000,
                    buffer_frames: Some((64, 4096)),
                },
            ],
            default_sample_rate: 48_000,
            default_channels: 2,
            default_sample_format: SampleFormat::F32,
        };
        assert_eq!(info.min_sample_rate(), 8_000);
        assert_eq!(info.max_sample_rate(), 192_000);
        assert_eq!(info.max_channels(), 8);
        assert_eq!(info.sample_formats(), vec![SampleFormat::I16, SampleFormat::F32]);
        assert!(info.to_string().ends_with("(default)"));
    }
}
