use vibra_core::{StereoFrame, ToneConfig};

use super::phase::{phase_step, wrap_phase};
use crate::rt_processing::fill::FrameSource;

/// The three phase accumulators of the tone, each kept in `[0, 2π)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OscillatorState {
    pub signal_phase: f64,
    pub modulation_phase: f64,
    pub vibrato_phase: f64,
}

/// A stereo tone with equal-power panning and pitch vibrato.
///
/// The carrier runs at the signal frequency, bent by `2^(sin(vibrato) * depth)`.
/// A slow modulation phase pans it between the channels: the left channel
/// follows `sin(modulation)` and the right channel `cos(modulation)`.
///
/// The sequence is infinite and can only be restarted by building a new
/// generator. Pull it from one consumer at a time.
pub struct WaveformGenerator {
    state: OscillatorState,

    signal_step: f64,
    modulation_step: f64,
    vibrato_step: f64,
    vibrato_depth: f64,
    peak_amplitude: f64,

    frames_emitted: u64,
}

impl WaveformGenerator {
    pub fn new(config: &ToneConfig) -> Self {
        let sample_rate = config.sample_rate_hz as f64;
        Self {
            state: OscillatorState::default(),
            signal_step: phase_step(config.signal_frequency_hz, sample_rate),
            modulation_step: phase_step(config.pan_modulation_frequency_hz, sample_rate),
            vibrato_step: phase_step(config.vibrato_frequency_hz, sample_rate),
            vibrato_depth: config.vibrato_depth_factor,
            peak_amplitude: config.peak_amplitude as f64,
            frames_emitted: 0,
        }
    }

    /// Advance every accumulator by one sample and emit the resulting frame.
    #[inline]
    pub fn next_frame(&mut self) -> StereoFrame {
        let state = &mut self.state;

        let vibrato_shift = state.vibrato_phase.sin();
        let vibrato_adjustment = (vibrato_shift * self.vibrato_depth).exp2();

        state.signal_phase = wrap_phase(state.signal_phase + self.signal_step * vibrato_adjustment);
        state.modulation_phase = wrap_phase(state.modulation_phase + self.modulation_step);
        state.vibrato_phase = wrap_phase(state.vibrato_phase + self.vibrato_step);

        let carrier = state.signal_phase.sin();
        let amp_left = carrier * state.modulation_phase.sin();
        let amp_right = carrier * state.modulation_phase.cos();

        self.frames_emitted += 1;

        StereoFrame {
            left: (amp_left * self.peak_amplitude).round() as i16,
            right: (amp_right * self.peak_amplitude).round() as i16,
        }
    }

    pub fn state(&self) -> OscillatorState {
        self.state
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    pub fn peak_amplitude(&self) -> i16 {
        self.peak_amplitude as i16
    }
}

impl Default for WaveformGenerator {
    fn default() -> Self {
        Self::new(&ToneConfig::default())
    }
}

impl Iterator for WaveformGenerator {
    type Item = StereoFrame;

    fn next(&mut self) -> Option<StereoFrame> {
        Some(self.next_frame())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::MAX, None)
    }
}

impl FrameSource for WaveformGenerator {
    #[inline]
    fn pull_frame(&mut self) -> Option<StereoFrame> {
        Some(self.next_frame())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rt_processing::waveform::phase::{TWO_PI, normalize_phase};
    use approx_eq::assert_approx_eq;

    #[test]
    fn identical_sequences_from_fresh_generators() {
        let a: Vec<_> = WaveformGenerator::default().take(5_000).collect();
        let b: Vec<_> = WaveformGenerator::default().take(5_000).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn phases_stay_in_range() {
        let mut generator = WaveformGenerator::default();
        // Long enough for several wraps of the 1.5 Hz modulation phase.
        for _ in 0..100_000 {
            generator.next_frame();
            let state = generator.state();
            for phase in [state.signal_phase, state.modulation_phase, state.vibrato_phase] {
                assert!((0.0..TWO_PI).contains(&phase), "phase {phase} escaped [0, 2π)");
            }
        }
    }

    #[test]
    fn deepest_accepted_vibrato_keeps_signal_phase_wrapped() {
        // Peak bent frequency 11_990 * 2 = 23_980 Hz, just under Nyquist.
        let config = ToneConfig::new()
            .with_signal_frequency(11_990.0)
            .with_vibrato(5.0, 1.0);
        assert!(config.validate().is_ok());

        let mut generator = WaveformGenerator::new(&config);
        // One full vibrato cycle at 5 Hz.
        for _ in 0..48_000 / 5 {
            generator.next_frame();
            let phase = generator.state().signal_phase;
            assert!((0.0..TWO_PI).contains(&phase), "signal phase {phase} escaped [0, 2π)");
        }
    }

    #[test]
    fn amplitudes_never_exceed_peak() {
        let generator = WaveformGenerator::default();
        let peak = generator.peak_amplitude();
        for frame in generator.take(96_000) {
            assert!(frame.left.abs() <= peak && frame.right.abs() <= peak, "{frame:?}");
        }
    }

    #[test]
    fn right_channel_carries_the_tone_at_start() {
        // Modulation phase starts near zero, so the tone is panned right.
        let frames: Vec<_> = WaveformGenerator::default().take(100).collect();
        let right_peak = frames.iter().map(|f| f.right.abs()).max().unwrap_or(0);
        let left_peak = frames.iter().map(|f| f.left.abs()).max().unwrap_or(0);
        assert!(right_peak > 20_000, "right peak {right_peak}");
        assert!(left_peak < 1_000, "left peak {left_peak}");
    }

    #[test]
    fn first_frame_matches_unbent_step() {
        let config = ToneConfig::default();
        let mut generator = WaveformGenerator::new(&config);
        let frame = generator.next_frame();

        let signal = TWO_PI * 432.0 / 48_000.0;
        let modulation = TWO_PI * 1.5 / 48_000.0;
        let state = generator.state();
        assert_approx_eq!(state.signal_phase, signal, 1e-12);
        assert_approx_eq!(state.modulation_phase, modulation, 1e-12);

        let expected_left = (signal.sin() * modulation.sin() * 25_000.0).round() as i16;
        let expected_right = (signal.sin() * modulation.cos() * 25_000.0).round() as i16;
        assert_eq!(frame, StereoFrame::new(expected_left, expected_right));
    }

    #[test]
    fn phases_follow_closed_form_accumulation() {
        const FRAMES: usize = 1_000;
        let mut generator = WaveformGenerator::default();
        for _ in 0..FRAMES {
            generator.next_frame();
        }

        let signal_step = TWO_PI * 432.0 / 48_000.0;
        let modulation_step = TWO_PI * 1.5 / 48_000.0;
        let vibrato_step = TWO_PI * 5.0 / 48_000.0;

        let unwrapped_signal: f64 = (0..FRAMES)
            .map(|k| signal_step * ((k as f64 * vibrato_step).sin() * 0.014).exp2())
            .sum();

        let state = generator.state();
        assert_approx_eq!(state.signal_phase, normalize_phase(unwrapped_signal), 1e-9);
        assert_approx_eq!(
            state.modulation_phase,
            normalize_phase(FRAMES as f64 * modulation_step),
            1e-9
        );
        assert_approx_eq!(
            state.vibrato_phase,
            normalize_phase(FRAMES as f64 * vibrato_step),
            1e-9
        );
        assert_eq!(generator.frames_emitted(), FRAMES as u64);
    }
}
