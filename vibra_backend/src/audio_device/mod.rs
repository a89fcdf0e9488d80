pub mod cpal_host;
pub mod enumeration;
pub mod host;
pub mod lifecycle;
pub mod loopback;
pub mod negotiation;

pub use cpal_host::{CpalHost, StreamFault};
pub use enumeration::{DeviceInfo, print_device_list};
pub use host::{
    AudioHost, FillCallback, FillRequest, HostError, HostOp, HostResult, StreamHandle, StreamQueue,
    StreamSink,
};
pub use lifecycle::{ControlOp, DeviceLifecycleController, LifecycleError, LifecycleState};
pub use loopback::{HostCall, LoopbackHost};
