pub mod generator;
pub mod phase;

pub use generator::{OscillatorState, WaveformGenerator};
pub use phase::{TWO_PI, normalize_phase, phase_step, wrap_phase};
