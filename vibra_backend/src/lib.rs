//! Real-time sample supply for the vibra test-tone harness.
//!
//! [`rt_processing`] produces the tone and packs it into device-sized byte
//! buffers; [`audio_device`] owns the output stream and its lifecycle.

pub mod audio_device;
pub mod rt_processing;
