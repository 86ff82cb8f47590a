use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://ssf.smart-village.solutions";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    pub health_staleness_secs: u64,

    // Sent as `Origin` on the preflight probe.
    pub origin: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            request_timeout_ms: 20_000,
            probe_timeout_ms: 5_000,
            health_staleness_secs: 5 * 60,
            origin: "http://localhost".into(),
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn health_staleness(&self) -> Duration {
        Duration::from_secs(self.health_staleness_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub max_duration_ms: u64,
    pub tick_ms: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            max_duration_ms: 30_000,
            tick_ms: 100,
        }
    }
}

impl RecorderConfig {
    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub client: ClientConfig,
    pub recorder: RecorderConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: AppConfig =
            serde_json::from_str(r#"{"client":{"base_url":"http://127.0.0.1:8000"}}"#).unwrap();
        assert_eq!(cfg.client.base_url, "http://127.0.0.1:8000");
        assert_eq!(cfg.client.request_timeout_ms, 20_000);
        assert_eq!(cfg.client.probe_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.recorder.max_duration(), Duration::from_secs(30));
    }

    #[test]
    fn request_timeout_outlasts_probe_timeout() {
        let cfg = ClientConfig::default();
        assert!(cfg.request_timeout() > cfg.probe_timeout());
    }
}
