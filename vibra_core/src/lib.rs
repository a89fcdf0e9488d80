pub mod config;
pub mod error;
pub mod frame;

pub use config::{
    FillConfig, HarnessConfig, LifecycleConfig, OutputFormat, ReinitPolicy, SampleEncoding,
    ToneConfig,
};
pub use error::{ConfigError, ConfigResult};
pub use frame::{FRAME_BYTES, StereoFrame};
