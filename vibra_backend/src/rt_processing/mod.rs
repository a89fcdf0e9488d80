pub mod callback;
pub mod fill;
pub mod performance;
pub mod waveform;

pub use callback::FillSlot;
pub use fill::{BufferFillAdapter, FillError, FrameSource};
pub use performance::{PerformanceMonitor, PerformanceSnapshot};
pub use waveform::{OscillatorState, WaveformGenerator};
