use std::f64::consts::PI;

pub const TWO_PI: f64 = 2.0 * PI;

/// Radians a phase accumulator advances per sample at `frequency` Hz.
#[inline]
pub fn phase_step(frequency: f64, sample_rate: f64) -> f64 {
    let samples_per_cycle = sample_rate / frequency;
    TWO_PI / samples_per_cycle
}

/// Fold an advanced phase back into `[0, 2π)`.
///
/// Assumes the phase was in range before a step smaller than 2π, so a single
/// subtraction is enough.
#[inline(always)]
pub fn wrap_phase(phase: f64) -> f64 {
    if phase >= TWO_PI { phase - TWO_PI } else { phase }
}

/// Proper modulo into `[0, 2π)`, for phases that moved by an arbitrary amount.
#[inline]
pub fn normalize_phase(phase: f64) -> f64 {
    let wrapped = phase.rem_euclid(TWO_PI);
    if wrapped >= TWO_PI { 0.0 } else { wrapped }
}
