use serde::Serialize;
use std::sync::Arc;
use voxlate_core::clock::{Clock, SystemClock};
use voxlate_core::config::ClientConfig;
use voxlate_core::error::ErrorKind;
use voxlate_core::language::{map_language_code, supported_codes};
use voxlate_core::types::{AudioBlob, TranslationResult};

use crate::health::HealthCache;
use crate::parse::interpret_response;
use crate::pipeline::build_translation_request;
use crate::probe::{ProbeOutcome, ProbeStrategy, classify_failures, run_probes, run_strategy};
use crate::request::{HttpRequest, join_url};
use crate::runtime::{self, TransportError};

pub const LANGUAGES_PATH: &str = "/languages";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectivityDetails {
    pub from_cache: bool,
    pub probes: Vec<ProbeOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectivityReport {
    pub success: bool,
    /// Name of the first probe that succeeded.
    pub method: Option<String>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub details: ConnectivityDetails,
}

/// Everything that talks to the translation backend.
///
/// Failures never escape as `Err`: every public call returns a value carrying
/// a success flag and, on failure, a classified error.
#[derive(Clone)]
pub struct BackendClient {
    cfg: ClientConfig,
    http: reqwest::Client,
    health: Arc<HealthCache>,
    clock: Arc<dyn Clock>,
}

impl BackendClient {
    pub fn new(cfg: ClientConfig, health: Arc<HealthCache>) -> anyhow::Result<Self> {
        Self::with_clock(cfg, health, Arc::new(SystemClock))
    }

    pub fn with_clock(
        cfg: ClientConfig,
        health: Arc<HealthCache>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            cfg,
            http: runtime::build_client()?,
            health,
            clock,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.cfg
    }

    pub fn health_cache(&self) -> &Arc<HealthCache> {
        &self.health
    }

    pub async fn test_connectivity(&self) -> ConnectivityReport {
        if let Some(cached) = self.health.fresh_verdict(self.clock.now()) {
            let healthy = cached.healthy;
            log::info!("Using cached backend verdict: healthy={healthy}");
            return ConnectivityReport {
                success: healthy,
                method: cached.reached_via.map(|s| s.name().to_string()),
                error: (!healthy).then(|| "Backend already marked as unreachable".to_string()),
                error_kind: (!healthy).then_some(ErrorKind::Unreachable),
                details: ConnectivityDetails {
                    from_cache: true,
                    probes: Vec::new(),
                },
            };
        }

        log::info!("Starting backend connectivity test against {}", self.cfg.base_url);
        let probes = run_probes(
            &self.http,
            &self.cfg.base_url,
            &self.cfg.origin,
            self.cfg.probe_timeout(),
        )
        .await;

        let winner = probes.iter().find(|p| p.success).map(|p| p.strategy);

        // Written after the round completes; see `HealthCache` on racing resets.
        self.health.record(winner, self.clock.now());

        match winner {
            Some(strategy) => {
                log::info!("Backend reachable via {}", strategy.name());
                ConnectivityReport {
                    success: true,
                    method: Some(strategy.name().to_string()),
                    error: None,
                    error_kind: None,
                    details: ConnectivityDetails {
                        from_cache: false,
                        probes,
                    },
                }
            }
            None => {
                let (kind, message) = classify_failures(&probes);
                log::error!("All connectivity probes failed: {message}");
                ConnectivityReport {
                    success: false,
                    method: None,
                    error: Some(message),
                    error_kind: Some(kind),
                    details: ConnectivityDetails {
                        from_cache: false,
                        probes,
                    },
                }
            }
        }
    }

    /// Post a short silent WAV to `/pipeline` and report status and timing.
    ///
    /// Separate from [`Self::test_connectivity`]: it exercises the full
    /// processing path and leaves the health cache alone.
    pub async fn test_pipeline_upload(&self) -> ProbeOutcome {
        run_strategy(
            &self.http,
            ProbeStrategy::PipelineUpload,
            &self.cfg.base_url,
            &self.cfg.origin,
            self.cfg.request_timeout(),
        )
        .await
    }

    pub async fn check_health(&self) -> bool {
        self.test_connectivity().await.success
    }

    pub fn reset_connectivity_cache(&self) {
        log::debug!("Resetting backend health cache");
        self.health.reset();
    }

    pub async fn translate(
        &self,
        audio: &AudioBlob,
        source_lang: &str,
        target_lang: &str,
    ) -> TranslationResult {
        if audio.is_empty() {
            return TranslationResult::failed(
                ErrorKind::EmptyAudioInput,
                "No valid audio received (empty file)",
            );
        }

        let source = map_language_code(source_lang);
        let target = map_language_code(target_lang);
        log::info!(
            "Submitting {:.2} KB of {} for translation {source} -> {target}",
            audio.len() as f64 / 1024.0,
            audio.mime_type
        );

        let req = build_translation_request(&self.cfg.base_url, audio, &source, &target);
        let resp = match runtime::execute(&self.http, &req, self.cfg.request_timeout()).await {
            Ok(resp) => resp,
            Err(e) => return self.transport_failure(e),
        };

        // Base64 decoding of large payloads is CPU-bound; keep it off the async workers.
        let outcome =
            tokio::task::spawn_blocking(move || interpret_response(&resp, &source, &target)).await;

        match outcome {
            Ok(result) => {
                if let Some(e) = &result.error {
                    log::warn!("Translation failed ({}): {}", e.kind.code(), e.message);
                }
                result
            }
            Err(e) => TranslationResult::failed(
                ErrorKind::MalformedResponse,
                format!("Failed to process response: {e}"),
            ),
        }
    }

    fn transport_failure(&self, e: TransportError) -> TranslationResult {
        match e {
            TransportError::Timeout { .. } => TranslationResult::failed(
                ErrorKind::Timeout,
                format!(
                    "Request timeout: server did not respond within {} seconds",
                    self.cfg.request_timeout().as_secs()
                ),
            ),
            TransportError::Network(msg) => TranslationResult::failed(
                ErrorKind::Network,
                format!("Network error: server not reachable or blocked ({msg})"),
            ),
            TransportError::InvalidRequest(msg) => {
                TranslationResult::failed(ErrorKind::Network, format!("API error: {msg}"))
            }
        }
    }

    /// Language codes the backend advertises, or the built-in table.
    pub async fn get_available_languages(&self) -> Vec<String> {
        let req = HttpRequest::get(join_url(&self.cfg.base_url, LANGUAGES_PATH))
            .with_header("Accept", "application/json");

        match runtime::execute(&self.http, &req, self.cfg.request_timeout()).await {
            Ok(resp) if resp.is_success() => match serde_json::from_slice::<Vec<String>>(&resp.body) {
                Ok(langs) if !langs.is_empty() => langs,
                Ok(_) => supported_codes(),
                Err(e) => {
                    log::warn!("Languages endpoint returned unexpected JSON: {e}");
                    supported_codes()
                }
            },
            Ok(resp) => {
                log::warn!("Languages endpoint answered HTTP {}", resp.status);
                supported_codes()
            }
            Err(e) => {
                log::warn!("Failed to fetch languages: {e}");
                supported_codes()
            }
        }
    }
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("cfg", &self.cfg)
            .field("health", &self.health.snapshot())
            .finish()
    }
}
