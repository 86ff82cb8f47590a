// In-memory capture backend for tests and headless runs.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use voxlate_core::types::PermissionState;

use crate::traits::{
    AudioConstraints, AudioEncoder, AudioStream, DeviceError, EncoderError, EncoderFactory,
    MediaDevices,
};

#[derive(Debug, Default)]
struct Feed {
    pending: Mutex<Vec<f32>>,
    fail_next: Mutex<Option<DeviceError>>,
}

#[derive(Debug)]
pub struct FakeMediaDevices {
    available: AtomicBool,
    permission: Mutex<PermissionState>,
    open_error: Mutex<Option<DeviceError>>,
    sample_rate_hz: u32,
    feed: Arc<Feed>,
    opened: AtomicUsize,
    released: Arc<AtomicUsize>,
    encoders: FakeEncoderFactory,
}

impl FakeMediaDevices {
    pub fn new(encoders: FakeEncoderFactory) -> Self {
        Self {
            available: AtomicBool::new(true),
            permission: Mutex::new(PermissionState::Prompt),
            open_error: Mutex::new(None),
            sample_rate_hz: 48_000,
            feed: Arc::new(Feed::default()),
            opened: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
            encoders,
        }
    }

    pub fn boxed(self) -> Arc<dyn MediaDevices> {
        Arc::new(self)
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_permission(&self, state: PermissionState) {
        *self.permission.lock().unwrap() = state;
    }

    /// Every following `open_stream` fails with `err` until cleared.
    pub fn fail_open(&self, err: Option<DeviceError>) {
        *self.open_error.lock().unwrap() = err;
    }

    /// Samples the next `drain` on any live stream will return.
    pub fn push_samples(&self, samples: &[f32]) {
        self.feed.pending.lock().unwrap().extend_from_slice(samples);
    }

    pub fn fail_next_drain(&self, err: DeviceError) {
        *self.feed.fail_next.lock().unwrap() = Some(err);
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Streams opened but not yet released.
    pub fn live_streams(&self) -> usize {
        self.opened() - self.released()
    }

    pub fn encoder_factory(&self) -> &FakeEncoderFactory {
        &self.encoders
    }
}

#[async_trait]
impl MediaDevices for FakeMediaDevices {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn query_permission(&self) -> PermissionState {
        *self.permission.lock().unwrap()
    }

    async fn open_stream(
        &self,
        _constraints: &AudioConstraints,
    ) -> Result<Box<dyn AudioStream>, DeviceError> {
        if let Some(err) = self.open_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            sample_rate_hz: self.sample_rate_hz,
            feed: self.feed.clone(),
            released: false,
            release_count: self.released.clone(),
        }))
    }

    fn encoders(&self) -> &dyn EncoderFactory {
        &self.encoders
    }
}

#[derive(Debug)]
pub struct FakeStream {
    sample_rate_hz: u32,
    feed: Arc<Feed>,
    released: bool,
    release_count: Arc<AtomicUsize>,
}

impl AudioStream for FakeStream {
    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    fn drain(&mut self) -> Result<Vec<f32>, DeviceError> {
        if let Some(err) = self.feed.fail_next.lock().unwrap().take() {
            return Err(err);
        }
        Ok(std::mem::take(&mut *self.feed.pending.lock().unwrap()))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.release_count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Accepts a fixed set of MIME types and records every creation attempt.
#[derive(Debug, Default)]
pub struct FakeEncoderFactory {
    supported: Vec<String>,
    default_supported: bool,
    attempts: Mutex<Vec<Option<String>>>,
}

impl FakeEncoderFactory {
    pub fn supporting(mime_types: &[&str]) -> Self {
        Self {
            supported: mime_types.iter().map(|m| m.to_string()).collect(),
            default_supported: true,
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// Rejects every format, including the default.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> Vec<Option<String>> {
        self.attempts.lock().unwrap().clone()
    }
}

impl EncoderFactory for FakeEncoderFactory {
    fn create(
        &self,
        mime_type: Option<&str>,
        _sample_rate_hz: u32,
    ) -> Result<Box<dyn AudioEncoder>, EncoderError> {
        self.attempts
            .lock()
            .unwrap()
            .push(mime_type.map(str::to_string));

        match mime_type {
            Some(m) if self.supported.iter().any(|s| s == m) => Ok(Box::new(FakeEncoder {
                mime_type: m.to_string(),
            })),
            None if self.default_supported => Ok(Box::new(FakeEncoder {
                mime_type: "audio/fake".to_string(),
            })),
            other => Err(EncoderError::Unsupported(
                other.unwrap_or("default").to_string(),
            )),
        }
    }
}

/// One byte per sample; nothing is held back for `finish`.
#[derive(Debug)]
pub struct FakeEncoder {
    mime_type: String,
}

impl AudioEncoder for FakeEncoder {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn encode(&mut self, samples: &[f32]) -> Result<Vec<u8>, EncoderError> {
        Ok(samples
            .iter()
            .map(|s| (s.clamp(-1.0, 1.0) * 127.0) as i8 as u8)
            .collect())
    }

    fn finish(&mut self) -> Result<Vec<u8>, EncoderError> {
        Ok(Vec::new())
    }
}
