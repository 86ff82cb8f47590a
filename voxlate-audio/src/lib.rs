pub mod controller;
pub mod fake;
pub mod resample;
pub mod traits;
pub mod wav;

// Linux capture is not wired up yet; the controller runs there against other backends.
#[cfg(any(windows, target_os = "macos"))]
pub mod cpal_backend;

#[cfg(any(windows, target_os = "macos"))]
pub use cpal_backend::CpalDevices;
pub use controller::{RecorderHooks, RecorderStatus, RecordingController};
pub use traits::{
    AudioConstraints, AudioEncoder, AudioStream, DeviceError, DeviceErrorName, EncoderError,
    EncoderFactory, MediaDevices,
};
pub use wav::{WavEncoder, WavEncoderFactory};
