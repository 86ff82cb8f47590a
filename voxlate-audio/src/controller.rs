use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use voxlate_core::config::RecorderConfig;
use voxlate_core::error::CaptureErrorKind;
use voxlate_core::types::{AudioBlob, CaptureState, PermissionState};

use crate::traits::{
    AudioConstraints, AudioEncoder, AudioStream, DeviceError, DeviceErrorName, EncoderFactory,
    MediaDevices,
};

/// Recorder formats tried in order before falling back to the platform default.
pub const PREFERRED_MIME_TYPES: [&str; 3] = ["audio/webm;codecs=opus", "audio/webm", "audio/mp4"];

pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;
pub type MaxDurationCallback = Arc<dyn Fn() + Send + Sync>;

/// Caller-supplied notifications. Both run outside the controller lock.
#[derive(Clone, Default)]
pub struct RecorderHooks {
    pub on_progress: Option<ProgressCallback>,
    /// Fires once per recording, after the automatic stop. The recording is
    /// then available from [`RecordingController::audio`].
    pub on_max_duration: Option<MaxDurationCallback>,
}

impl std::fmt::Debug for RecorderHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecorderHooks")
            .field("on_progress", &self.on_progress.is_some())
            .field("on_max_duration", &self.on_max_duration.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecorderStatus {
    pub state: CaptureState,
    /// Elapsed fraction of the maximum duration, in [0, 1].
    pub progress: f64,
    pub time_remaining_secs: u64,
    pub error: Option<CaptureErrorKind>,
    pub permission: PermissionState,
    pub has_audio: bool,
}

/// Ratio of `elapsed` to `max`, clamped to [0, 1], and the time left.
pub fn progress_at(elapsed: Duration, max: Duration) -> (f64, Duration) {
    if max.is_zero() {
        return (1.0, Duration::ZERO);
    }
    let ratio = (elapsed.as_secs_f64() / max.as_secs_f64()).clamp(0.0, 1.0);
    (ratio, max.saturating_sub(elapsed))
}

/// Whole seconds, rounded up.
pub fn remaining_secs(remaining: Duration) -> u64 {
    remaining.as_millis().div_ceil(1000) as u64
}

/// Map a platform acquisition failure onto a capture error, plus the
/// permission state it implies (if any).
pub fn classify_device_error(err: &DeviceError) -> (CaptureErrorKind, Option<PermissionState>) {
    match err.name {
        DeviceErrorName::NotAllowed | DeviceErrorName::Security => (
            CaptureErrorKind::PermissionDenied,
            Some(PermissionState::Denied),
        ),
        DeviceErrorName::NotFound => (
            CaptureErrorKind::NoMicrophone,
            Some(PermissionState::Denied),
        ),
        DeviceErrorName::NotReadable => (CaptureErrorKind::MicrophoneBusy, None),
        DeviceErrorName::Overconstrained => (CaptureErrorKind::MicrophoneConstrained, None),
        DeviceErrorName::Other => (CaptureErrorKind::Unknown, None),
    }
}

/// First encoder the factory accepts, walking the preferred formats and then
/// the default.
pub fn select_encoder(
    factory: &dyn EncoderFactory,
    sample_rate_hz: u32,
) -> Option<Box<dyn AudioEncoder>> {
    let candidates = PREFERRED_MIME_TYPES
        .iter()
        .map(|m| Some(*m))
        .chain(std::iter::once(None));

    for mime in candidates {
        match factory.create(mime, sample_rate_hz) {
            Ok(encoder) => {
                log::info!("Using recorder format {}", encoder.mime_type());
                return Some(encoder);
            }
            Err(e) => log::debug!("Recorder format {} rejected: {e}", mime.unwrap_or("default")),
        }
    }
    None
}

#[derive(Default)]
struct Session {
    state: CaptureState,
    permission: PermissionState,
    error: Option<CaptureErrorKind>,
    progress: f64,
    remaining: Duration,
    started_at: Option<Instant>,
    stream: Option<Box<dyn AudioStream>>,
    encoder: Option<Box<dyn AudioEncoder>>,
    chunks: Vec<Vec<u8>>,
    audio: Option<AudioBlob>,
    ticker: Option<JoinHandle<()>>,
    max_reached: bool,
    // Bumped per start and on shutdown; stale tasks and awaits compare against it.
    attempt: u64,
}

impl Session {
    fn status(&self) -> RecorderStatus {
        RecorderStatus {
            state: self.state,
            progress: self.progress,
            time_remaining_secs: remaining_secs(self.remaining),
            error: self.error,
            permission: self.permission,
            has_audio: self.audio.is_some(),
        }
    }
}

/// Stop the hardware and drop the encoder. The only place a session's stream
/// is released.
fn release_session(s: &mut Session) {
    if let Some(mut stream) = s.stream.take() {
        stream.release();
        log::debug!("Released microphone stream");
    }
    s.encoder = None;
    s.started_at = None;
}

/// The only place the progress task is cancelled.
fn cancel_ticker(s: &mut Session) {
    if let Some(handle) = s.ticker.take() {
        handle.abort();
    }
}

/// Move whatever the stream has captured through the encoder.
fn pump(s: &mut Session) -> anyhow::Result<()> {
    let (Some(stream), Some(encoder)) = (s.stream.as_mut(), s.encoder.as_mut()) else {
        return Ok(());
    };
    let samples = stream.drain().context("read microphone")?;
    if samples.is_empty() {
        return Ok(());
    }
    let chunk = encoder.encode(&samples).context("encode audio")?;
    if !chunk.is_empty() {
        s.chunks.push(chunk);
    }
    Ok(())
}

fn finalize(s: &mut Session) -> anyhow::Result<AudioBlob> {
    pump(s)?;
    let encoder = s.encoder.as_mut().context("recorder has no encoder")?;
    let tail = encoder.finish().context("finalize audio")?;
    let mime_type = encoder.mime_type().to_string();
    if !tail.is_empty() {
        s.chunks.push(tail);
    }
    Ok(AudioBlob::new(mime_type, std::mem::take(&mut s.chunks).concat()))
}

struct Shared {
    devices: Arc<dyn MediaDevices>,
    cfg: RecorderConfig,
    hooks: RecorderHooks,
    session: Mutex<Session>,
    status_tx: watch::Sender<RecorderStatus>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, s: &Session) {
        self.status_tx.send_replace(s.status());
    }

    fn fail(&self, s: &mut Session, kind: CaptureErrorKind, permission: Option<PermissionState>) {
        cancel_ticker(s);
        release_session(s);
        s.chunks.clear();
        s.state = CaptureState::Idle;
        s.error = Some(kind);
        if let Some(p) = permission {
            s.permission = p;
        }
        log::warn!("Recording failed: {} ({kind})", kind.code());
        self.publish(s);
    }

    fn stop(&self) -> Option<AudioBlob> {
        let mut guard = self.lock();
        self.stop_locked(&mut guard)
    }

    fn stop_locked(&self, s: &mut Session) -> Option<AudioBlob> {
        if s.state != CaptureState::Recording {
            log::debug!("stop_recording ignored in state {:?}", s.state);
            return None;
        }

        cancel_ticker(s);
        let finalized = finalize(s);
        release_session(s);
        s.chunks.clear();
        s.state = CaptureState::Stopped;

        let out = match finalized {
            Ok(blob) if !blob.is_empty() => {
                log::info!(
                    "Recording stopped: {} bytes of {}",
                    blob.len(),
                    blob.mime_type
                );
                s.audio = Some(blob.clone());
                Some(blob)
            }
            Ok(_) => {
                log::warn!("Recording stopped without any audio");
                s.error = Some(CaptureErrorKind::RecordingError);
                None
            }
            Err(e) => {
                log::error!("Failed to finalize recording: {e:#}");
                s.error = Some(CaptureErrorKind::RecordingError);
                None
            }
        };
        self.publish(s);
        out
    }

    /// One progress step. Returns false once the task should exit.
    fn tick(&self, attempt: u64) -> bool {
        let max = self.cfg.max_duration();
        let (progress, reached) = {
            let mut guard = self.lock();
            let s = &mut *guard;
            if s.attempt != attempt || s.state != CaptureState::Recording {
                return false;
            }

            if let Err(e) = pump(s) {
                log::error!("Recording interrupted: {e:#}");
                self.fail(s, CaptureErrorKind::RecordingError, None);
                return false;
            }

            let elapsed = s.started_at.map(|t| t.elapsed()).unwrap_or_default();
            let (ratio, remaining) = progress_at(elapsed, max);
            s.progress = s.progress.max(ratio);
            s.remaining = remaining;

            let reached = elapsed >= max && !s.max_reached;
            if reached {
                // Same guard as the attempt check above.
                s.max_reached = true;
                log::info!("Maximum recording duration of {max:?} reached");
                self.stop_locked(s);
            } else {
                self.publish(s);
            }
            (s.progress, reached)
        };

        if let Some(cb) = &self.hooks.on_progress {
            cb(progress);
        }

        if reached {
            if let Some(cb) = &self.hooks.on_max_duration {
                cb();
            }
            return false;
        }
        true
    }

    fn shutdown(&self) {
        let mut guard = self.lock();
        let s = &mut *guard;
        cancel_ticker(s);
        release_session(s);
        s.chunks.clear();
        s.attempt += 1;
        if matches!(
            s.state,
            CaptureState::Recording | CaptureState::RequestingPermission
        ) {
            s.state = CaptureState::Idle;
        }
        self.publish(s);
    }
}

/// Owns one capture session at a time on top of a [`MediaDevices`] backend.
///
/// Failures never surface as `Err`; they land in the status error slot.
/// Dropping the controller tears the session down.
pub struct RecordingController {
    shared: Arc<Shared>,
}

impl RecordingController {
    pub fn new(devices: Arc<dyn MediaDevices>, cfg: RecorderConfig, hooks: RecorderHooks) -> Self {
        let session = Session {
            remaining: cfg.max_duration(),
            ..Session::default()
        };
        let (status_tx, _) = watch::channel(session.status());
        Self {
            shared: Arc::new(Shared {
                devices,
                cfg,
                hooks,
                session: Mutex::new(session),
                status_tx,
            }),
        }
    }

    pub fn status(&self) -> RecorderStatus {
        self.shared.lock().status()
    }

    pub fn subscribe(&self) -> watch::Receiver<RecorderStatus> {
        self.shared.status_tx.subscribe()
    }

    /// The last finished recording, if any.
    pub fn audio(&self) -> Option<AudioBlob> {
        self.shared.lock().audio.clone()
    }

    pub fn clear_error(&self) {
        let mut s = self.shared.lock();
        s.error = None;
        self.shared.publish(&s);
    }

    /// Ask for microphone access by opening and immediately releasing a stream.
    pub async fn request_permission(&self) -> bool {
        {
            let mut s = self.shared.lock();
            s.error = None;
            let busy = matches!(
                s.state,
                CaptureState::Recording | CaptureState::RequestingPermission
            );
            self.shared.publish(&s);
            // The hardware is already held by the active session.
            if busy {
                return s.permission == PermissionState::Granted;
            }
        }

        if !self.shared.devices.is_available() {
            let mut s = self.shared.lock();
            s.error = Some(CaptureErrorKind::NoMicrophone);
            self.shared.publish(&s);
            return false;
        }

        match self
            .shared
            .devices
            .open_stream(&AudioConstraints::VOICE)
            .await
        {
            Ok(mut stream) => {
                stream.release();
                let mut s = self.shared.lock();
                s.permission = PermissionState::Granted;
                self.shared.publish(&s);
                log::info!("Microphone permission granted");
                true
            }
            Err(e) => {
                let (kind, permission) = classify_device_error(&e);
                log::warn!("Microphone permission request failed: {e}");
                let mut s = self.shared.lock();
                s.error = Some(kind);
                if let Some(p) = permission {
                    s.permission = p;
                }
                self.shared.publish(&s);
                false
            }
        }
    }

    pub async fn refresh_permission(&self) -> PermissionState {
        let state = self.shared.devices.query_permission().await;
        self.permission_changed(state);
        state
    }

    /// Entry point for platform adapters that observe permission changes.
    pub fn permission_changed(&self, state: PermissionState) {
        let mut s = self.shared.lock();
        s.permission = state;
        if state == PermissionState::Granted {
            s.error = None;
        }
        log::debug!("Microphone permission is now {state:?}");
        self.shared.publish(&s);
    }

    pub async fn start_recording(&self) {
        let attempt = {
            let mut s = self.shared.lock();
            if matches!(
                s.state,
                CaptureState::Recording | CaptureState::RequestingPermission
            ) {
                log::warn!("start_recording ignored: session already {:?}", s.state);
                return;
            }
            s.attempt += 1;
            s.error = None;
            s.audio = None;
            s.chunks.clear();
            s.progress = 0.0;
            s.remaining = self.shared.cfg.max_duration();
            s.max_reached = false;
            s.state = CaptureState::RequestingPermission;
            self.shared.publish(&s);
            s.attempt
        };

        if !self.shared.devices.is_available() {
            let mut s = self.shared.lock();
            self.shared
                .fail(&mut s, CaptureErrorKind::NoMicrophone, None);
            return;
        }

        let opened = self
            .shared
            .devices
            .open_stream(&AudioConstraints::VOICE)
            .await;

        let mut guard = self.shared.lock();
        let s = &mut *guard;

        let stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                if s.attempt == attempt {
                    let (kind, permission) = classify_device_error(&e);
                    log::warn!("Microphone stream unavailable: {e}");
                    self.shared.fail(s, kind, permission);
                }
                return;
            }
        };
        let sample_rate_hz = stream.sample_rate_hz();
        s.stream = Some(stream);

        // Torn down while the stream was being acquired.
        if s.attempt != attempt || s.state != CaptureState::RequestingPermission {
            release_session(s);
            return;
        }

        match select_encoder(self.shared.devices.encoders(), sample_rate_hz) {
            Some(encoder) => s.encoder = Some(encoder),
            None => {
                self.shared
                    .fail(s, CaptureErrorKind::RecorderNotSupported, None);
                return;
            }
        }

        s.state = CaptureState::Recording;
        s.permission = PermissionState::Granted;
        let started_at = Instant::now();
        s.started_at = Some(started_at);
        s.ticker = Some(self.spawn_ticker(attempt, started_at));
        log::info!(
            "Recording started at {sample_rate_hz} Hz (max {:?})",
            self.shared.cfg.max_duration()
        );
        self.shared.publish(s);
    }

    fn spawn_ticker(&self, attempt: u64, started_at: Instant) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.shared);
        let period = self.shared.cfg.tick();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(started_at + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                if !shared.tick(attempt) {
                    return;
                }
            }
        })
    }

    /// Finish the current recording. `None` unless a recording was active and
    /// produced audio.
    pub fn stop_recording(&self) -> Option<AudioBlob> {
        self.shared.stop()
    }

    /// Cancel any session and release the microphone. Safe to call repeatedly.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }
}

impl Drop for RecordingController {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

impl std::fmt::Debug for RecordingController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingController")
            .field("cfg", &self.shared.cfg)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeEncoderFactory, FakeMediaDevices};
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const OPUS: &str = "audio/webm;codecs=opus";

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    async fn advance_ms(ms: u64) {
        tokio::time::advance(Duration::from_millis(ms)).await;
        settle().await;
    }

    fn devices(encoders: FakeEncoderFactory) -> Arc<FakeMediaDevices> {
        Arc::new(FakeMediaDevices::new(encoders))
    }

    fn controller(devices: &Arc<FakeMediaDevices>, hooks: RecorderHooks) -> RecordingController {
        RecordingController::new(devices.clone(), RecorderConfig::default(), hooks)
    }

    fn counting_max_hook() -> (RecorderHooks, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let hooks = RecorderHooks {
            on_max_duration: Some(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
            ..RecorderHooks::default()
        };
        (hooks, fired)
    }

    #[test]
    fn progress_is_clamped_and_rounds_remaining_up() {
        let max = Duration::from_secs(30);

        let (ratio, remaining) = progress_at(Duration::from_secs(15), max);
        assert_relative_eq!(ratio, 0.5);
        assert_eq!(remaining_secs(remaining), 15);

        let (ratio, remaining) = progress_at(Duration::from_millis(100), max);
        assert_relative_eq!(ratio, 1.0 / 300.0);
        assert_eq!(remaining_secs(remaining), 30);

        let (ratio, remaining) = progress_at(Duration::from_millis(29_999), max);
        assert!(ratio < 1.0);
        assert_eq!(remaining_secs(remaining), 1);

        let (ratio, remaining) = progress_at(Duration::from_secs(45), max);
        assert_relative_eq!(ratio, 1.0);
        assert_eq!(remaining, Duration::ZERO);
    }

    #[test]
    fn device_errors_map_to_capture_kinds() {
        let cases = [
            (
                DeviceErrorName::NotAllowed,
                CaptureErrorKind::PermissionDenied,
                Some(PermissionState::Denied),
            ),
            (
                DeviceErrorName::Security,
                CaptureErrorKind::PermissionDenied,
                Some(PermissionState::Denied),
            ),
            (
                DeviceErrorName::NotFound,
                CaptureErrorKind::NoMicrophone,
                Some(PermissionState::Denied),
            ),
            (DeviceErrorName::NotReadable, CaptureErrorKind::MicrophoneBusy, None),
            (
                DeviceErrorName::Overconstrained,
                CaptureErrorKind::MicrophoneConstrained,
                None,
            ),
            (DeviceErrorName::Other, CaptureErrorKind::Unknown, None),
        ];
        for (name, kind, permission) in cases {
            let err = DeviceError::new(name, "x");
            assert_eq!(classify_device_error(&err), (kind, permission), "{name:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_then_stop_produces_one_blob() {
        let devices = devices(FakeEncoderFactory::supporting(&[OPUS]));
        let rec = controller(&devices, RecorderHooks::default());

        devices.push_samples(&[0.5; 10]);
        rec.start_recording().await;
        let status = rec.status();
        assert_eq!(status.state, CaptureState::Recording);
        assert_eq!(status.permission, PermissionState::Granted);
        assert_eq!(status.time_remaining_secs, 30);

        advance_ms(100).await;
        devices.push_samples(&[0.25; 6]);

        let blob = rec.stop_recording().expect("audio");
        assert_eq!(blob.mime_type, OPUS);
        assert_eq!(blob.len(), 16);

        let status = rec.status();
        assert_eq!(status.state, CaptureState::Stopped);
        assert!(status.has_audio);
        assert_eq!(status.error, None);
        assert_eq!(devices.live_streams(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn encoder_fallback_walks_preferred_formats_then_default() {
        let devices = devices(FakeEncoderFactory::supporting(&[]));
        let rec = controller(&devices, RecorderHooks::default());

        rec.start_recording().await;
        assert_eq!(rec.status().state, CaptureState::Recording);
        assert_eq!(
            devices.encoder_factory().attempts(),
            vec![
                Some("audio/webm;codecs=opus".to_string()),
                Some("audio/webm".to_string()),
                Some("audio/mp4".to_string()),
                None,
            ]
        );

        devices.push_samples(&[0.1; 4]);
        assert_eq!(rec.stop_recording().unwrap().mime_type, "audio/fake");
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_stops_at_first_supported_format() {
        let devices = devices(FakeEncoderFactory::supporting(&["audio/mp4"]));
        let rec = controller(&devices, RecorderHooks::default());

        rec.start_recording().await;
        assert_eq!(devices.encoder_factory().attempts().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_encoder_releases_stream_and_reports_unsupported() {
        let devices = devices(FakeEncoderFactory::none());
        let rec = controller(&devices, RecorderHooks::default());

        rec.start_recording().await;
        let status = rec.status();
        assert_eq!(status.state, CaptureState::Idle);
        assert_eq!(status.error, Some(CaptureErrorKind::RecorderNotSupported));
        assert_eq!(devices.opened(), 1);
        assert_eq!(devices.live_streams(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn denied_start_sets_permission_denied() {
        let devices = devices(FakeEncoderFactory::supporting(&[OPUS]));
        devices.fail_open(Some(DeviceError::new(DeviceErrorName::NotAllowed, "denied")));
        let rec = controller(&devices, RecorderHooks::default());

        rec.start_recording().await;
        let status = rec.status();
        assert_eq!(status.state, CaptureState::Idle);
        assert_eq!(status.error, Some(CaptureErrorKind::PermissionDenied));
        assert_eq!(status.permission, PermissionState::Denied);
        assert_eq!(devices.live_streams(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_devices_report_no_microphone() {
        let devices = devices(FakeEncoderFactory::supporting(&[OPUS]));
        devices.set_available(false);
        let rec = controller(&devices, RecorderHooks::default());

        rec.start_recording().await;
        assert_eq!(rec.status().error, Some(CaptureErrorKind::NoMicrophone));
        assert_eq!(rec.status().state, CaptureState::Idle);
        assert!(!rec.request_permission().await);
        assert_eq!(devices.opened(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn max_duration_fires_once_at_the_boundary() {
        let devices = devices(FakeEncoderFactory::supporting(&[OPUS]));
        let (hooks, fired) = counting_max_hook();
        let rec = controller(&devices, hooks);

        devices.push_samples(&[0.5; 32]);
        rec.start_recording().await;

        advance_ms(29_999).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(rec.status().state, CaptureState::Recording);
        assert!(rec.status().progress < 1.0);

        advance_ms(1).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        let status = rec.status();
        assert_eq!(status.state, CaptureState::Stopped);
        assert_relative_eq!(status.progress, 1.0);
        assert_eq!(status.time_remaining_secs, 0);
        assert_eq!(rec.audio().map(|b| b.len()), Some(32));
        assert_eq!(devices.live_streams(), 0);

        advance_ms(5_000).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn session_is_already_stopped_when_max_duration_hooks_run() {
        let devices = devices(FakeEncoderFactory::supporting(&[OPUS]));
        let status_rx: Arc<Mutex<Option<watch::Receiver<RecorderStatus>>>> =
            Arc::new(Mutex::new(None));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let (rx_slot, sink) = (status_rx.clone(), seen.clone());
        let hooks = RecorderHooks {
            on_max_duration: Some(Arc::new(move || {
                if let Some(rx) = rx_slot.lock().unwrap().as_ref() {
                    sink.lock().unwrap().push(rx.borrow().state);
                }
            })),
            ..RecorderHooks::default()
        };
        let rec = controller(&devices, hooks);
        *status_rx.lock().unwrap() = Some(rec.subscribe());

        devices.push_samples(&[0.25; 8]);
        rec.start_recording().await;
        advance_ms(30_000).await;

        assert_eq!(*seen.lock().unwrap(), vec![CaptureState::Stopped]);
        assert!(rec.status().has_audio);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_ticker_leaves_a_restarted_session_alone() {
        let devices = devices(FakeEncoderFactory::supporting(&[OPUS]));
        let (hooks, fired) = counting_max_hook();
        let rec = controller(&devices, hooks);

        devices.push_samples(&[0.5; 4]);
        rec.start_recording().await;
        let first_attempt = rec.shared.lock().attempt;
        assert!(rec.stop_recording().is_some());

        rec.start_recording().await;
        assert_eq!(rec.status().state, CaptureState::Recording);

        assert!(!rec.shared.tick(first_attempt));
        assert_eq!(rec.status().state, CaptureState::Recording);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(devices.live_streams(), 1);

        assert!(rec.stop_recording().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn progress_is_monotonic_and_reported() {
        let devices = devices(FakeEncoderFactory::supporting(&[OPUS]));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let hooks = RecorderHooks {
            on_progress: Some(Arc::new(move |p: f64| sink.lock().unwrap().push(p))),
            ..RecorderHooks::default()
        };
        let rec = controller(&devices, hooks);

        rec.start_recording().await;
        for _ in 0..5 {
            advance_ms(100).await;
        }

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 5);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_relative_eq!(seen[4], 500.0 / 30_000.0);
        assert_eq!(rec.status().time_remaining_secs, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_outside_recording_is_a_no_op() {
        let devices = devices(FakeEncoderFactory::supporting(&[OPUS]));
        let rec = controller(&devices, RecorderHooks::default());

        assert!(rec.stop_recording().is_none());
        assert_eq!(rec.status().state, CaptureState::Idle);
        assert_eq!(rec.status().error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_recording_reports_recording_error() {
        let devices = devices(FakeEncoderFactory::supporting(&[OPUS]));
        let rec = controller(&devices, RecorderHooks::default());

        rec.start_recording().await;
        assert!(rec.stop_recording().is_none());
        let status = rec.status();
        assert_eq!(status.state, CaptureState::Stopped);
        assert_eq!(status.error, Some(CaptureErrorKind::RecordingError));
        assert!(!status.has_audio);
        assert_eq!(devices.live_streams(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn mid_recording_failure_aborts_the_session() {
        let devices = devices(FakeEncoderFactory::supporting(&[OPUS]));
        let rec = controller(&devices, RecorderHooks::default());

        rec.start_recording().await;
        devices.fail_next_drain(DeviceError::new(DeviceErrorName::NotReadable, "unplugged"));
        advance_ms(100).await;

        let status = rec.status();
        assert_eq!(status.state, CaptureState::Idle);
        assert_eq!(status.error, Some(CaptureErrorKind::RecordingError));
        assert_eq!(devices.live_streams(), 0);
        assert!(rec.stop_recording().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_clears_previous_audio_and_error() {
        let devices = devices(FakeEncoderFactory::supporting(&[OPUS]));
        let rec = controller(&devices, RecorderHooks::default());

        rec.start_recording().await;
        assert!(rec.stop_recording().is_none());
        assert!(rec.status().error.is_some());

        rec.start_recording().await;
        let status = rec.status();
        assert_eq!(status.state, CaptureState::Recording);
        assert_eq!(status.error, None);
        assert!(!status.has_audio);
        assert_relative_eq!(status.progress, 0.0);
        assert_eq!(devices.opened(), 2);
        assert_eq!(devices.live_streams(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_while_recording_is_ignored() {
        let devices = devices(FakeEncoderFactory::supporting(&[OPUS]));
        let rec = controller(&devices, RecorderHooks::default());

        rec.start_recording().await;
        rec.start_recording().await;
        assert_eq!(devices.opened(), 1);
        assert_eq!(rec.status().state, CaptureState::Recording);
    }

    #[tokio::test(start_paused = true)]
    async fn request_permission_releases_its_probe_stream() {
        let devices = devices(FakeEncoderFactory::supporting(&[OPUS]));
        let rec = controller(&devices, RecorderHooks::default());

        assert!(rec.request_permission().await);
        assert_eq!(devices.opened(), 1);
        assert_eq!(devices.released(), 1);
        let status = rec.status();
        assert_eq!(status.permission, PermissionState::Granted);
        assert_eq!(status.state, CaptureState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_permission_request_classifies_error() {
        let devices = devices(FakeEncoderFactory::supporting(&[OPUS]));
        devices.fail_open(Some(DeviceError::new(DeviceErrorName::NotFound, "none")));
        let rec = controller(&devices, RecorderHooks::default());

        assert!(!rec.request_permission().await);
        let status = rec.status();
        assert_eq!(status.error, Some(CaptureErrorKind::NoMicrophone));
        assert_eq!(status.permission, PermissionState::Denied);
        assert_eq!(status.state, CaptureState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn granted_permission_clears_error() {
        let devices = devices(FakeEncoderFactory::supporting(&[OPUS]));
        devices.fail_open(Some(DeviceError::new(DeviceErrorName::NotAllowed, "no")));
        let rec = controller(&devices, RecorderHooks::default());

        rec.start_recording().await;
        assert_eq!(rec.status().error, Some(CaptureErrorKind::PermissionDenied));

        devices.set_permission(PermissionState::Granted);
        assert_eq!(rec.refresh_permission().await, PermissionState::Granted);
        let status = rec.status();
        assert_eq!(status.error, None);
        assert_eq!(status.permission, PermissionState::Granted);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_error_empties_the_slot() {
        let devices = devices(FakeEncoderFactory::none());
        let rec = controller(&devices, RecorderHooks::default());

        rec.start_recording().await;
        assert!(rec.status().error.is_some());
        rec.clear_error();
        assert_eq!(rec.status().error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_observe_transitions() {
        let devices = devices(FakeEncoderFactory::supporting(&[OPUS]));
        let rec = controller(&devices, RecorderHooks::default());
        let mut rx = rec.subscribe();

        rec.start_recording().await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().state, CaptureState::Recording);

        devices.push_samples(&[0.2; 3]);
        rec.stop_recording();
        let status = rx.borrow_and_update().clone();
        assert_eq!(status.state, CaptureState::Stopped);
        assert!(status.has_audio);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_ticker_and_releases_stream() {
        let devices = devices(FakeEncoderFactory::supporting(&[OPUS]));
        let (hooks, fired) = counting_max_hook();
        let rec = controller(&devices, hooks);

        rec.start_recording().await;
        rec.shutdown();
        rec.shutdown();
        assert_eq!(rec.status().state, CaptureState::Idle);
        assert_eq!(devices.live_streams(), 0);

        advance_ms(31_000).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_controller_releases_the_stream() {
        let devices = devices(FakeEncoderFactory::supporting(&[OPUS]));
        {
            let rec = controller(&devices, RecorderHooks::default());
            rec.start_recording().await;
            assert_eq!(devices.live_streams(), 1);
        }
        assert_eq!(devices.live_streams(), 0);
    }
}
