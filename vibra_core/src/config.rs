use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Oscillator bank parameters. Fixed once a generator is built from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneConfig {
    pub signal_frequency_hz: f64,
    pub pan_modulation_frequency_hz: f64,
    pub vibrato_frequency_hz: f64,
    /// Exponent scale of the `2^(sin * depth)` pitch-bend multiplier.
    pub vibrato_depth_factor: f64,
    pub sample_rate_hz: u32,
    pub peak_amplitude: i16,
}

impl ToneConfig {
    pub const DEFAULT_SIGNAL_FREQUENCY_HZ: f64 = 432.0;
    pub const DEFAULT_PAN_MODULATION_FREQUENCY_HZ: f64 = 1.5;
    pub const DEFAULT_VIBRATO_FREQUENCY_HZ: f64 = 5.0;
    pub const DEFAULT_VIBRATO_DEPTH_FACTOR: f64 = 0.014;
    pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 48_000;
    pub const DEFAULT_PEAK_AMPLITUDE: i16 = 25_000;

    pub fn new() -> Self {
        Self {
            signal_frequency_hz: Self::DEFAULT_SIGNAL_FREQUENCY_HZ,
            pan_modulation_frequency_hz: Self::DEFAULT_PAN_MODULATION_FREQUENCY_HZ,
            vibrato_frequency_hz: Self::DEFAULT_VIBRATO_FREQUENCY_HZ,
            vibrato_depth_factor: Self::DEFAULT_VIBRATO_DEPTH_FACTOR,
            sample_rate_hz: Self::DEFAULT_SAMPLE_RATE_HZ,
            peak_amplitude: Self::DEFAULT_PEAK_AMPLITUDE,
        }
    }

    pub fn with_signal_frequency(mut self, hz: f64) -> Self {
        self.signal_frequency_hz = hz;
        self
    }

    pub fn with_pan_modulation_frequency(mut self, hz: f64) -> Self {
        self.pan_modulation_frequency_hz = hz;
        self
    }

    pub fn with_vibrato(mut self, hz: f64, depth_factor: f64) -> Self {
        self.vibrato_frequency_hz = hz;
        self.vibrato_depth_factor = depth_factor;
        self
    }

    pub fn with_sample_rate(mut self, hz: u32) -> Self {
        self.sample_rate_hz = hz;
        self
    }

    pub fn with_peak_amplitude(mut self, peak: i16) -> Self {
        self.peak_amplitude = peak;
        self
    }

    /// Highest instantaneous carrier frequency once vibrato is applied.
    pub fn peak_signal_frequency_hz(&self) -> f64 {
        self.signal_frequency_hz * self.vibrato_depth_factor.exp2()
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let frequencies = [
            ("signal_frequency_hz", self.signal_frequency_hz),
            ("pan_modulation_frequency_hz", self.pan_modulation_frequency_hz),
            ("vibrato_frequency_hz", self.vibrato_frequency_hz),
        ];
        for (name, hz) in frequencies {
            if !hz.is_finite() || hz <= 0.0 {
                return Err(ConfigError::invalid(format!(
                    "tone.{name} must be a positive finite frequency, got {hz}"
                )));
            }
            if hz >= self.sample_rate_hz as f64 / 2.0 {
                return Err(ConfigError::invalid(format!(
                    "tone.{name} ({hz} Hz) must stay below the Nyquist frequency of {} Hz",
                    self.sample_rate_hz
                )));
            }
        }

        if !self.vibrato_depth_factor.is_finite() || self.vibrato_depth_factor < 0.0 {
            return Err(ConfigError::invalid(format!(
                "tone.vibrato_depth_factor must be finite and non-negative, got {}",
                self.vibrato_depth_factor
            )));
        }

        if self.sample_rate_hz == 0 {
            return Err(ConfigError::invalid("tone.sample_rate_hz must be non-zero"));
        }

        // Vibrato bends the carrier up to `2^depth` times its base frequency.
        let bent_peak_hz = self.peak_signal_frequency_hz();
        if bent_peak_hz >= self.sample_rate_hz as f64 / 2.0 {
            return Err(ConfigError::invalid(format!(
                "tone.signal_frequency_hz bent by vibrato_depth_factor reaches {bent_peak_hz} Hz, \
                 which must stay below the Nyquist frequency of {} Hz",
                self.sample_rate_hz
            )));
        }

        if self.peak_amplitude <= 0 {
            return Err(ConfigError::invalid(format!(
                "tone.peak_amplitude must be in 1..=32767, got {}",
                self.peak_amplitude
            )));
        }

        Ok(())
    }
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleEncoding {
    /// Signed 16-bit little-endian PCM.
    #[serde(rename = "s16le")]
    S16Le,
}

impl fmt::Display for SampleEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S16Le => write!(f, "s16le"),
        }
    }
}

/// The stream format requested from the output device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputFormat {
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub encoding: SampleEncoding,
    /// Output device name; `None` selects the host's default device.
    pub device: Option<String>,
    /// Fixed device buffer size in frames; `None` leaves it to the host.
    pub buffer_frames: Option<u32>,
}

impl OutputFormat {
    pub fn stereo_s16(sample_rate_hz: u32) -> Self {
        Self {
            sample_rate_hz,
            channels: 2,
            encoding: SampleEncoding::S16Le,
            device: None,
            buffer_frames: None,
        }
    }

    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_frames = Some(frames);
        self
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::stereo_s16(ToneConfig::DEFAULT_SAMPLE_RATE_HZ)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ch @ {}Hz {}", self.channels, self.sample_rate_hz, self.encoding)
    }
}

/// What happens to the previous stream when the device is reinitialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReinitPolicy {
    /// Pause the old stream and drop its handle without closing it. The host
    /// reclaims it on subsystem shutdown.
    #[default]
    Discard,
    /// Pause and close the old stream before opening the new one.
    Close,
}

impl fmt::Display for ReinitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discard => write!(f, "discard"),
            Self::Close => write!(f, "close"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub reinit_policy: ReinitPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillConfig {
    /// Scratch buffer bytes to allocate up front; `0` allocates on first request.
    pub initial_buffer_bytes: usize,
}

/// Complete harness configuration, loadable from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub tone: ToneConfig,
    pub output: OutputFormat,
    pub lifecycle: LifecycleConfig,
    pub fill: FillConfig,
}

impl HarnessConfig {
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Read, parse and validate a JSON config file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.tone.validate()?;

        if self.output.channels != 2 {
            return Err(ConfigError::invalid(format!(
                "output.channels must be 2 (stereo frames), got {}",
                self.output.channels
            )));
        }

        if self.tone.sample_rate_hz != self.output.sample_rate_hz {
            return Err(ConfigError::invalid(format!(
                "tone.sample_rate_hz ({}) must equal output.sample_rate_hz ({}); no rate conversion is performed",
                self.tone.sample_rate_hz, self.output.sample_rate_hz
            )));
        }

        if let Some(0) = self.output.buffer_frames {
            return Err(ConfigError::invalid("output.buffer_frames must be non-zero when set"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_describe_the_432hz_tone() {
        let config = HarnessConfig::default();
        assert_eq!(config.tone.signal_frequency_hz, 432.0);
        assert_eq!(config.tone.pan_modulation_frequency_hz, 1.5);
        assert_eq!(config.tone.vibrato_frequency_hz, 5.0);
        assert_eq!(config.tone.vibrato_depth_factor, 0.014);
        assert_eq!(config.tone.sample_rate_hz, 48_000);
        assert_eq!(config.tone.peak_amplitude, 25_000);
        assert_eq!(config.output, OutputFormat::stereo_s16(48_000));
        assert_eq!(config.lifecycle.reinit_policy, ReinitPolicy::Discard);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = HarnessConfig::from_json_str(
            r#"{ "lifecycle": { "reinit_policy": "close" }, "output": { "device": "USB" } }"#,
        )
        .expect("parse");
        assert_eq!(config.lifecycle.reinit_policy, ReinitPolicy::Close);
        assert_eq!(config.output.device.as_deref(), Some("USB"));
        assert_eq!(config.output.sample_rate_hz, 48_000);
        assert_eq!(config.tone, ToneConfig::default());
    }

    #[test]
    fn encoding_uses_short_name() {
        let json = serde_json::to_string(&OutputFormat::default()).expect("serialize");
        assert!(json.contains(r#""encoding":"s16le""#), "{json}");
    }

    #[test]
    fn rejects_rate_mismatch() {
        let mut config = HarnessConfig::default();
        config.tone = config.tone.with_sample_rate(44_100);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("no rate conversion"), "{err}");
    }

    #[test]
    fn rejects_non_stereo_output() {
        let mut config = HarnessConfig::default();
        config.output.channels = 1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_bad_tone_parameters() {
        let bad = [
            ToneConfig::new().with_signal_frequency(0.0),
            ToneConfig::new().with_signal_frequency(f64::NAN),
            ToneConfig::new().with_pan_modulation_frequency(30_000.0),
            ToneConfig::new().with_vibrato(5.0, -0.1),
            ToneConfig::new().with_peak_amplitude(0),
        ];
        for tone in bad {
            assert!(tone.validate().is_err(), "{tone:?} should be rejected");
        }
    }

    #[test]
    fn rejects_vibrato_bending_past_nyquist() {
        // 20 kHz is legal on its own, but a depth of 2 bends it up to 80 kHz.
        let mut config = HarnessConfig::default();
        config.tone = ToneConfig::new().with_signal_frequency(20_000.0).with_vibrato(5.0, 2.0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("vibrato_depth_factor"), "{err}");

        // 12 kHz bent by at most 2^1 peaks at exactly Nyquist.
        let at_nyquist = ToneConfig::new().with_signal_frequency(12_000.0).with_vibrato(5.0, 1.0);
        assert!(at_nyquist.validate().is_err());

        let below = ToneConfig::new().with_signal_frequency(11_900.0).with_vibrato(5.0, 1.0);
        assert!(below.validate().is_ok());
        assert_eq!(below.peak_signal_frequency_hz(), 23_800.0);
    }

    #[test]
    fn load_reads_and_validates_file() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let path = dir.path().join("vibra.json");
        let mut file = std::fs::File::create(&path).expect("create config");
        write!(file, r#"{{ "tone": {{ "signal_frequency_hz": 440.0 }} }}"#).expect("write config");

        let config = HarnessConfig::load(&path).expect("load");
        assert_eq!(config.tone.signal_frequency_hz, 440.0);
    }

    #[test]
    fn load_reports_parse_and_io_errors() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let missing = dir.path().join("missing.json");
        assert!(matches!(HarnessConfig::load(&missing), Err(ConfigError::Io { .. })));

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").expect("write config");
        assert!(matches!(HarnessConfig::load(&broken), Err(ConfigError::Parse { .. })));
    }
}
