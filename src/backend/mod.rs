pub mod recording;
pub mod traits;
pub mod types;
pub mod wgpu_device;

pub use recording::{DeviceEvent, RecordingDevice};
pub use traits::*;
pub use types::*;
pub use wgpu_device::{FrameContext, WgpuDevice};
