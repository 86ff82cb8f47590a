use serde::Serialize;
use std::time::Duration;
use voxlate_core::error::ErrorKind;

use voxlate_core::types::AudioBlob;

use crate::pipeline::{PIPELINE_PATH, build_translation_request};
use crate::request::{HttpRequest, join_url};
use crate::runtime::{self, HttpResponse, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProbeStrategy {
    HealthCheck,
    RootPath,
    PipelineOptions,
    /// Real multipart POST of a short silent clip. Not part of [`ProbeStrategy::ORDER`].
    PipelineUpload,
}

impl ProbeStrategy {
    /// Fixed probing order.
    pub const ORDER: [ProbeStrategy; 3] = [
        ProbeStrategy::HealthCheck,
        ProbeStrategy::RootPath,
        ProbeStrategy::PipelineOptions,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProbeStrategy::HealthCheck => "Health Check",
            ProbeStrategy::RootPath => "Root Path",
            ProbeStrategy::PipelineOptions => "Pipeline OPTIONS",
            ProbeStrategy::PipelineUpload => "Pipeline POST",
        }
    }

    pub fn request(self, base_url: &str, origin: &str) -> HttpRequest {
        match self {
            ProbeStrategy::HealthCheck => HttpRequest::get(join_url(base_url, "/health")),
            ProbeStrategy::RootPath => HttpRequest::get(join_url(base_url, "")),
            ProbeStrategy::PipelineOptions => {
                HttpRequest::options(join_url(base_url, PIPELINE_PATH))
                    .with_header("Origin", origin)
                    .with_header("Access-Control-Request-Method", "POST")
                    .with_header("Access-Control-Request-Headers", "Content-Type")
            }
            ProbeStrategy::PipelineUpload => {
                build_translation_request(base_url, &smoke_test_audio(), "de", "en")
                    .with_header("Origin", origin)
            }
        }
    }
}

/// 10 ms of 16 kHz mono PCM16 silence, small enough to upload on every check.
pub fn smoke_test_audio() -> AudioBlob {
    const SAMPLE_RATE_HZ: u32 = 16_000;
    const SAMPLES: u32 = 160;
    let data_len = SAMPLES * 2;

    let mut wav = Vec::with_capacity(44 + data_len as usize);
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVEfmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&SAMPLE_RATE_HZ.to_le_bytes());
    wav.extend_from_slice(&(SAMPLE_RATE_HZ * 2).to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes());
    wav.extend_from_slice(&16u16.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.resize(44 + data_len as usize, 0);

    AudioBlob::new("audio/wav", wav)
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CorsHeaders {
    pub allow_origin: Option<String>,
    pub allow_methods: Option<String>,
    pub allow_headers: Option<String>,
    pub max_age: Option<String>,
}

impl CorsHeaders {
    fn from_response(resp: &HttpResponse) -> Self {
        let get = |name: &str| resp.header(name).map(str::to_string);
        Self {
            allow_origin: get("access-control-allow-origin"),
            allow_methods: get("access-control-allow-methods"),
            allow_headers: get("access-control-allow-headers"),
            max_age: get("access-control-max-age"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "message")]
pub enum ProbeFailure {
    Timeout,
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    pub strategy: ProbeStrategy,
    pub method: String,
    pub url: String,
    pub success: bool,
    pub status: Option<u16>,
    pub status_text: Option<String>,
    pub elapsed_ms: u64,
    pub headers: Vec<(String, String)>,
    pub body_len: Option<usize>,
    pub cors: CorsHeaders,
    pub failure: Option<ProbeFailure>,
}

impl ProbeOutcome {
    pub fn from_response(strategy: ProbeStrategy, req: &HttpRequest, resp: &HttpResponse) -> Self {
        Self {
            strategy,
            method: req.method.clone(),
            url: req.url.clone(),
            success: resp.is_success(),
            status: Some(resp.status),
            status_text: Some(resp.status_text.clone()),
            elapsed_ms: resp.elapsed_ms,
            headers: resp.headers.clone(),
            body_len: Some(resp.body.len()),
            cors: CorsHeaders::from_response(resp),
            failure: None,
        }
    }

    pub fn from_failure(
        strategy: ProbeStrategy,
        req: &HttpRequest,
        failure: ProbeFailure,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            strategy,
            method: req.method.clone(),
            url: req.url.clone(),
            success: false,
            status: None,
            status_text: None,
            elapsed_ms,
            headers: Vec::new(),
            body_len: None,
            cors: CorsHeaders::default(),
            failure: Some(failure),
        }
    }
}

/// Run every strategy in order. All outcomes are kept, successful or not.
pub async fn run_probes(
    client: &reqwest::Client,
    base_url: &str,
    origin: &str,
    timeout: Duration,
) -> Vec<ProbeOutcome> {
    let mut outcomes = Vec::with_capacity(ProbeStrategy::ORDER.len());
    for strategy in ProbeStrategy::ORDER {
        outcomes.push(run_strategy(client, strategy, base_url, origin, timeout).await);
    }
    outcomes
}

/// Send one strategy's request and record what came back.
pub async fn run_strategy(
    client: &reqwest::Client,
    strategy: ProbeStrategy,
    base_url: &str,
    origin: &str,
    timeout: Duration,
) -> ProbeOutcome {
    let req = strategy.request(base_url, origin);
    log::info!("Probing {} ({} {})", strategy.name(), req.method, req.url);

    let started = std::time::Instant::now();
    let outcome = match runtime::execute(client, &req, timeout).await {
        Ok(resp) => ProbeOutcome::from_response(strategy, &req, &resp),
        Err(TransportError::Timeout { .. }) => ProbeOutcome::from_failure(
            strategy,
            &req,
            ProbeFailure::Timeout,
            runtime::ms(started.elapsed()),
        ),
        Err(e) => ProbeOutcome::from_failure(
            strategy,
            &req,
            ProbeFailure::Transport(e.to_string()),
            runtime::ms(started.elapsed()),
        ),
    };

    if outcome.success {
        log::info!("{} succeeded with HTTP {:?}", strategy.name(), outcome.status);
    } else {
        log::warn!(
            "{} failed: status={:?} failure={:?}",
            strategy.name(),
            outcome.status,
            outcome.failure
        );
    }
    outcome
}

/// Derive one failure category from a round where no probe succeeded.
///
/// Several causes can be true at once across probes, so precedence matters:
/// timeout, then transport failure, then 5xx, then 404.
pub fn classify_failures(outcomes: &[ProbeOutcome]) -> (ErrorKind, String) {
    if outcomes
        .iter()
        .any(|o| matches!(o.failure, Some(ProbeFailure::Timeout)))
    {
        return (
            ErrorKind::Timeout,
            "Timeout - server did not answer in time".into(),
        );
    }

    if outcomes
        .iter()
        .any(|o| matches!(o.failure, Some(ProbeFailure::Transport(_))))
    {
        return (
            ErrorKind::Network,
            "CORS blocked or network error".into(),
        );
    }

    if let Some(status) = outcomes
        .iter()
        .filter_map(|o| o.status)
        .find(|s| *s >= 500)
    {
        return (
            ErrorKind::Server { status },
            "Server error (HTTP 5xx)".into(),
        );
    }

    if outcomes.iter().any(|o| o.status == Some(404)) {
        return (
            ErrorKind::EndpointNotFound,
            "Endpoint not found (HTTP 404)".into(),
        );
    }

    (ErrorKind::Unreachable, "Backend not reachable".into())
}
