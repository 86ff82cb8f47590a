// Seams between the recording controller and the platform capture primitives.

use async_trait::async_trait;
use thiserror::Error;
use voxlate_core::types::PermissionState;

/// Processing requested from the input device. Fixed for voice capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl AudioConstraints {
    pub const VOICE: AudioConstraints = AudioConstraints {
        echo_cancellation: true,
        noise_suppression: true,
        auto_gain_control: true,
    };
}

/// Platform cause of a failed stream acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorName {
    NotAllowed,
    NotFound,
    NotReadable,
    Overconstrained,
    Security,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name:?}: {message}")]
pub struct DeviceError {
    pub name: DeviceErrorName,
    pub message: String,
}

impl DeviceError {
    pub fn new(name: DeviceErrorName, message: impl Into<String>) -> Self {
        Self {
            name,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncoderError {
    #[error("unsupported recorder format: {0}")]
    Unsupported(String),

    #[error("encoding failed: {0}")]
    Encode(String),
}

#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Whether the platform exposes audio capture at all.
    fn is_available(&self) -> bool;

    async fn query_permission(&self) -> PermissionState;

    async fn open_stream(
        &self,
        constraints: &AudioConstraints,
    ) -> Result<Box<dyn AudioStream>, DeviceError>;

    fn encoders(&self) -> &dyn EncoderFactory;
}

/// A live microphone stream. Owns the hardware until `release` is called.
pub trait AudioStream: Send {
    fn sample_rate_hz(&self) -> u32;

    /// Mono samples captured since the previous call.
    fn drain(&mut self) -> Result<Vec<f32>, DeviceError>;

    /// Stop every track. Must be idempotent.
    fn release(&mut self);
}

pub trait EncoderFactory: Send + Sync {
    /// `None` asks for the platform default format.
    fn create(
        &self,
        mime_type: Option<&str>,
        sample_rate_hz: u32,
    ) -> Result<Box<dyn AudioEncoder>, EncoderError>;
}

pub trait AudioEncoder: Send {
    fn mime_type(&self) -> &str;

    /// Feed samples; returns whatever encoded bytes are ready (possibly none).
    fn encode(&mut self, samples: &[f32]) -> Result<Vec<u8>, EncoderError>;

    /// Flush everything still buffered.
    fn finish(&mut self) -> Result<Vec<u8>, EncoderError>;
}
