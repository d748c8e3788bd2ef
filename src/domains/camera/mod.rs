pub mod capture;
pub mod file_device;

pub use capture::{
    acquire_with_fallback, AcquiredStream, CaptureDevice, CaptureStream, FacingMode,
    VideoConstraints, FALLBACK_ORDER,
};
pub use file_device::FrameDirectoryDevice;
