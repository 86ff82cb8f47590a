//
// CPAL-backed microphone capture.
//
// Supported platforms:
// - Windows
// - macOS
//
// `cpal::Stream` is not `Send` everywhere, so a worker thread owns it and
// hands mono chunks back over a channel.

use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat, SizedSample, Stream};
use voxlate_core::types::PermissionState;

use crate::traits::{
    AudioConstraints, AudioStream, DeviceError, DeviceErrorName, EncoderFactory, MediaDevices,
};
use crate::wav::WavEncoderFactory;

const WORKER_STARTUP_TIMEOUT: Duration = Duration::from_secs(2);

enum WorkerMsg {
    Ready { sample_rate_hz: u32 },
    Error(DeviceError),
}

/// Default-host capture. Only WAV encoding is offered.
#[derive(Debug, Default)]
pub struct CpalDevices {
    device_name: Option<String>,
    encoders: WavEncoderFactory,
}

impl CpalDevices {
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            encoders: WavEncoderFactory::default(),
        }
    }

    pub fn list_input_device_names() -> Vec<String> {
        let host = cpal::default_host();
        let mut out = Vec::new();
        match host.input_devices() {
            Ok(devices) => {
                for dev in devices {
                    if let Ok(name) = dev.name() {
                        out.push(name);
                    }
                }
            }
            Err(e) => log::warn!("Failed to list input devices: {e}"),
        }
        out.sort();
        out.dedup();
        out
    }
}

#[async_trait]
impl MediaDevices for CpalDevices {
    fn is_available(&self) -> bool {
        cpal::default_host().default_input_device().is_some()
    }

    // Desktop hosts do not expose a permission query; the OS prompts on open.
    async fn query_permission(&self) -> PermissionState {
        PermissionState::Prompt
    }

    async fn open_stream(
        &self,
        constraints: &AudioConstraints,
    ) -> Result<Box<dyn AudioStream>, DeviceError> {
        log::debug!("Opening cpal input stream with {constraints:?}");
        let device_name = self.device_name.clone();
        let stream = tokio::task::spawn_blocking(move || CpalStream::open(device_name.as_deref()))
            .await
            .map_err(|e| DeviceError::new(DeviceErrorName::Other, format!("audio worker: {e}")))??;
        Ok(Box::new(stream))
    }

    fn encoders(&self) -> &dyn EncoderFactory {
        &self.encoders
    }
}

pub struct CpalStream {
    sample_rate_hz: u32,
    sample_rx: mpsc::Receiver<Vec<f32>>,
    stream_error: Arc<Mutex<Option<String>>>,
    stop_tx: Option<mpsc::Sender<()>>,
    worker_handle: Option<std::thread::JoinHandle<()>>,
}

impl CpalStream {
    fn open(device_name: Option<&str>) -> Result<Self, DeviceError> {
        let device = pick_device(device_name)?;

        let (sample_tx, sample_rx) = mpsc::channel::<Vec<f32>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (worker_tx, worker_rx) = mpsc::channel::<WorkerMsg>();
        let stream_error = Arc::new(Mutex::new(None));
        let stream_error_worker = stream_error.clone();

        let worker_handle = std::thread::spawn(move || {
            let stream = match start_stream(&device, sample_tx, stream_error_worker) {
                Ok(started) => started,
                Err(e) => {
                    log::error!("Audio stream start failed: {e}");
                    let _ = worker_tx.send(WorkerMsg::Error(e));
                    return;
                }
            };
            let (stream, sample_rate_hz) = stream;
            let _ = worker_tx.send(WorkerMsg::Ready { sample_rate_hz });

            // Park until released (or the owner is dropped).
            let _ = stop_rx.recv();
            drop(stream);
        });

        let sample_rate_hz = match worker_rx.recv_timeout(WORKER_STARTUP_TIMEOUT) {
            Ok(WorkerMsg::Ready { sample_rate_hz }) => sample_rate_hz,
            Ok(WorkerMsg::Error(e)) => return Err(e),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let _ = stop_tx.send(());
                return Err(DeviceError::new(
                    DeviceErrorName::NotReadable,
                    "audio worker startup timeout",
                ));
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(DeviceError::new(
                    DeviceErrorName::Other,
                    "audio worker exited during startup",
                ));
            }
        };

        log::info!("Microphone stream started at {sample_rate_hz} Hz");
        Ok(Self {
            sample_rate_hz,
            sample_rx,
            stream_error,
            stop_tx: Some(stop_tx),
            worker_handle: Some(worker_handle),
        })
    }
}

impl AudioStream for CpalStream {
    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    fn drain(&mut self) -> Result<Vec<f32>, DeviceError> {
        if let Some(err) = self
            .stream_error
            .lock()
            .map_err(|_| DeviceError::new(DeviceErrorName::Other, "stream error lock poisoned"))?
            .take()
        {
            return Err(DeviceError::new(DeviceErrorName::NotReadable, err));
        }

        let mut out = Vec::new();
        while let Ok(chunk) = self.sample_rx.try_recv() {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    fn release(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(h) = self.worker_handle.take() {
            let _ = h.join();
            log::debug!("Microphone stream released");
        }
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.release();
    }
}

fn pick_device(device_name: Option<&str>) -> Result<cpal::Device, DeviceError> {
    let host = cpal::default_host();

    if let Some(needle) = device_name.map(str::trim).filter(|n| !n.is_empty()) {
        if let Ok(devices) = host.input_devices() {
            for dev in devices {
                if dev.name().ok().as_deref() == Some(needle) {
                    log::info!("Using input device: {needle}");
                    return Ok(dev);
                }
            }
        }
        log::warn!("Preferred input device not found, falling back to default: {needle}");
    }

    host.default_input_device()
        .ok_or_else(|| DeviceError::new(DeviceErrorName::NotFound, "no input device found"))
}

fn start_stream(
    device: &cpal::Device,
    sample_tx: mpsc::Sender<Vec<f32>>,
    stream_error: Arc<Mutex<Option<String>>>,
) -> Result<(Stream, u32), DeviceError> {
    let config = device
        .default_input_config()
        .map_err(map_default_config_error)?;
    let sample_rate_hz = config.sample_rate().0;
    let channels = config.channels() as usize;
    let stream_config: cpal::StreamConfig = config.clone().into();

    let stream = match config.sample_format() {
        SampleFormat::I16 => {
            build_input_stream::<i16>(device, &stream_config, channels, sample_tx, stream_error)
        }
        SampleFormat::U16 => {
            build_input_stream::<u16>(device, &stream_config, channels, sample_tx, stream_error)
        }
        SampleFormat::I8 => {
            build_input_stream::<i8>(device, &stream_config, channels, sample_tx, stream_error)
        }
        SampleFormat::U8 => {
            build_input_stream::<u8>(device, &stream_config, channels, sample_tx, stream_error)
        }
        SampleFormat::I32 => {
            build_input_stream::<i32>(device, &stream_config, channels, sample_tx, stream_error)
        }
        SampleFormat::U32 => {
            build_input_stream::<u32>(device, &stream_config, channels, sample_tx, stream_error)
        }
        SampleFormat::F64 => {
            build_input_stream::<f64>(device, &stream_config, channels, sample_tx, stream_error)
        }
        _ => build_input_stream::<f32>(device, &stream_config, channels, sample_tx, stream_error),
    }
    .map_err(map_build_error)?;

    stream.play().map_err(|e| match e {
        cpal::PlayStreamError::DeviceNotAvailable => {
            DeviceError::new(DeviceErrorName::NotReadable, e.to_string())
        }
        other => backend_error(other.to_string()),
    })?;

    Ok((stream, sample_rate_hz))
}

fn build_input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    sample_tx: mpsc::Sender<Vec<f32>>,
    stream_error: Arc<Mutex<Option<String>>>,
) -> Result<Stream, cpal::BuildStreamError>
where
    T: Sample + SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let cb = move |data: &[T], _: &cpal::InputCallbackInfo| {
        let mono: Vec<f32> = if channels <= 1 {
            data.iter().map(|&s| s.to_sample::<f32>()).collect()
        } else {
            data.chunks_exact(channels)
                .map(|frame| {
                    frame.iter().map(|&s| s.to_sample::<f32>()).sum::<f32>() / channels as f32
                })
                .collect()
        };
        let _ = sample_tx.send(mono);
    };

    device.build_input_stream(
        config,
        cb,
        move |err| {
            log::error!("Audio stream error: {err}");
            if let Ok(mut slot) = stream_error.lock() {
                *slot = Some(err.to_string());
            }
        },
        None,
    )
}

fn map_default_config_error(e: cpal::DefaultStreamConfigError) -> DeviceError {
    match e {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => {
            DeviceError::new(DeviceErrorName::NotReadable, e.to_string())
        }
        cpal::DefaultStreamConfigError::StreamTypeNotSupported => {
            DeviceError::new(DeviceErrorName::Overconstrained, e.to_string())
        }
        other => backend_error(other.to_string()),
    }
}

fn map_build_error(e: cpal::BuildStreamError) -> DeviceError {
    match e {
        cpal::BuildStreamError::DeviceNotAvailable => {
            DeviceError::new(DeviceErrorName::NotReadable, e.to_string())
        }
        cpal::BuildStreamError::StreamConfigNotSupported
        | cpal::BuildStreamError::InvalidArgument => {
            DeviceError::new(DeviceErrorName::Overconstrained, e.to_string())
        }
        other => backend_error(other.to_string()),
    }
}

// Hosts report privacy denials as opaque backend errors.
fn backend_error(message: String) -> DeviceError {
    let lower = message.to_lowercase();
    let name = if lower.contains("permission") || lower.contains("access") {
        DeviceErrorName::NotAllowed
    } else {
        DeviceErrorName::Other
    };
    DeviceError::new(name, message)
}
