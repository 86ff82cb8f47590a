mod settings;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use voxlate_audio::{MediaDevices, RecorderHooks, RecordingController};
use voxlate_client::probe::{ProbeOutcome, ProbeStrategy};
use voxlate_client::{BackendClient, ConnectivityReport, HealthCache};
use voxlate_core::config::AppConfig;
use voxlate_core::language::Language;
use voxlate_core::types::{AudioBlob, AudioHandle, CaptureState};

use crate::settings::BASE_URL_ENV;

#[derive(Parser)]
#[command(name = "voxlate")]
#[command(about = "Record speech and translate it through the pipeline backend")]
struct Cli {
    /// JSON settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend URL (overrides config and VOXLATE_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe the backend and report how it was reached
    Check {
        /// Discard the cached verdict first
        #[arg(long)]
        fresh: bool,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,

        /// Also upload a short silent clip to /pipeline
        #[arg(long)]
        pipeline: bool,
    },

    /// List the languages the backend accepts
    Languages,

    /// Translate an existing recording
    Translate {
        #[arg(long, default_value = "de")]
        from: String,

        #[arg(long, default_value = "en")]
        to: String,

        #[arg(long)]
        file: PathBuf,

        /// Where to write the translated audio
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Record from the microphone, then translate
    Record {
        #[arg(long, default_value = "de")]
        from: String,

        #[arg(long, default_value = "en")]
        to: String,

        /// Stop after this many seconds (default: the configured maximum)
        #[arg(long)]
        seconds: Option<u64>,

        /// Input device name
        #[arg(long)]
        device: Option<String>,

        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Write the effective settings to a new file
    InitConfig {
        path: PathBuf,

        /// Replace the file if it exists
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let cfg = settings::resolve(
        cli.config.as_deref(),
        std::env::var(BASE_URL_ENV).ok(),
        cli.base_url,
    )?;
    log::debug!("Effective settings: {cfg:?}");

    let health = Arc::new(HealthCache::new(cfg.client.health_staleness()));
    let client = BackendClient::new(cfg.client.clone(), health).context("create backend client")?;

    match cli.command {
        Command::Check {
            fresh,
            json,
            pipeline,
        } => {
            if fresh {
                client.reset_connectivity_cache();
            }
            let report = client.test_connectivity().await;
            let upload = if pipeline {
                Some(client.test_pipeline_upload().await)
            } else {
                None
            };

            if json {
                let out = serde_json::json!({ "connectivity": &report, "pipeline_upload": &upload });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_report(&report);
                if let Some(outcome) = &upload {
                    println!("Pipeline upload:");
                    print_outcome(outcome);
                }
            }

            if !report.success {
                anyhow::bail!("backend unreachable");
            }
            if upload.is_some_and(|o| !o.success) {
                anyhow::bail!("pipeline upload failed");
            }
        }
        Command::Languages => {
            for code in client.get_available_languages().await {
                match Language::from_code(&code) {
                    Some(lang) => println!("{code}\t{} {}", lang.flag(), lang.native_name()),
                    None => println!("{code}"),
                }
            }
        }
        Command::Translate {
            from,
            to,
            file,
            out,
        } => {
            let bytes =
                std::fs::read(&file).with_context(|| format!("read audio: {}", file.display()))?;
            let audio = AudioBlob::new(mime_type_for_path(&file), bytes);
            translate_and_report(&client, &audio, &from, &to, out.as_deref()).await?;
        }
        Command::Record {
            from,
            to,
            seconds,
            device,
            out,
        } => {
            let limit = seconds
                .map(Duration::from_secs)
                .unwrap_or_else(|| cfg.recorder.max_duration());
            let audio = record(&cfg, device, limit).await?;
            translate_and_report(&client, &audio, &from, &to, out.as_deref()).await?;
        }
        Command::InitConfig { path, force } => {
            settings::write_starter(&path, &cfg, force)?;
            println!("Wrote settings to {}", path.display());
        }
    }

    Ok(())
}

fn print_report(report: &ConnectivityReport) {
    if report.success {
        println!(
            "Backend reachable via {}{}",
            report.method.as_deref().unwrap_or("?"),
            if report.details.from_cache { " (cached)" } else { "" }
        );
    } else {
        println!(
            "Backend unreachable [{}]: {}",
            report.error_kind.map(|k| k.code()).unwrap_or("UNKNOWN"),
            report.error.as_deref().unwrap_or("")
        );
    }

    for probe in &report.details.probes {
        print_outcome(probe);
    }
}

fn print_outcome(probe: &ProbeOutcome) {
    let outcome = match (&probe.status, &probe.failure) {
        (Some(status), _) => format!("HTTP {status}"),
        (None, Some(failure)) => format!("{failure:?}"),
        (None, None) => "no answer".to_string(),
    };
    println!(
        "  {:<18} {} {} -> {} ({} ms)",
        probe.strategy.name(),
        probe.method,
        probe.url,
        outcome,
        probe.elapsed_ms
    );
    if let Some(origin) = &probe.cors.allow_origin {
        println!("    allow-origin: {origin}");
    }
    if probe.strategy != ProbeStrategy::PipelineUpload {
        return;
    }
    if let Some(len) = probe.body_len {
        let content_type = probe
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .map(|(_, v)| v.as_str())
            .unwrap_or("-");
        println!("    body: {len} bytes of {content_type}");
    }
}

async fn translate_and_report(
    client: &BackendClient,
    audio: &AudioBlob,
    from: &str,
    to: &str,
    out: Option<&Path>,
) -> anyhow::Result<()> {
    let result = client.translate(audio, from, to).await;

    if let Some(err) = &result.error {
        anyhow::bail!("translation failed [{}]: {}", err.kind.code(), err.message);
    }

    if let Some(text) = &result.original_text {
        println!("original:   {text}");
    }
    if let Some(text) = &result.translated_text {
        println!("translated: {text}");
    }

    match (&result.audio, out) {
        (Some(AudioHandle::Inline(blob)), Some(path)) => {
            std::fs::write(path, &blob.bytes)
                .with_context(|| format!("write audio: {}", path.display()))?;
            println!("audio:      {} ({} bytes)", path.display(), blob.len());
        }
        (Some(AudioHandle::Inline(blob)), None) => {
            println!("audio:      {} bytes of {} (use --out to save)", blob.len(), blob.mime_type);
        }
        (Some(AudioHandle::Remote(url)), _) => println!("audio:      {url}"),
        (None, _) => println!("audio:      none"),
    }
    Ok(())
}

async fn record(cfg: &AppConfig, device: Option<String>, limit: Duration) -> anyhow::Result<AudioBlob> {
    let devices = capture_devices(device)?;
    let hooks = RecorderHooks {
        on_max_duration: Some(Arc::new(|| {
            log::info!("Maximum recording length reached");
        })),
        ..RecorderHooks::default()
    };
    let recorder = RecordingController::new(devices, cfg.recorder.clone(), hooks);

    recorder.start_recording().await;
    let status = recorder.status();
    if status.state != CaptureState::Recording {
        let code = status.error.map(|e| e.code()).unwrap_or("UNKNOWN_ERROR");
        anyhow::bail!("could not start recording [{code}]");
    }

    println!("Recording for up to {} s...", limit.as_secs());
    let mut status_rx = recorder.subscribe();
    tokio::select! {
        _ = tokio::time::sleep(limit) => {}
        _ = status_rx.wait_for(|s| s.state != CaptureState::Recording) => {}
    }

    let audio = recorder.stop_recording().or_else(|| recorder.audio());
    let status = recorder.status();
    recorder.shutdown();

    match audio {
        Some(blob) => Ok(blob),
        None => {
            let code = status.error.map(|e| e.code()).unwrap_or("UNKNOWN_ERROR");
            anyhow::bail!("recording produced no audio [{code}]")
        }
    }
}

#[cfg(any(windows, target_os = "macos"))]
fn capture_devices(device: Option<String>) -> anyhow::Result<Arc<dyn MediaDevices>> {
    Ok(Arc::new(voxlate_audio::CpalDevices::new(device)))
}

#[cfg(not(any(windows, target_os = "macos")))]
fn capture_devices(_device: Option<String>) -> anyhow::Result<Arc<dyn MediaDevices>> {
    anyhow::bail!("microphone capture is not supported on this platform yet; use `translate --file`")
}

fn mime_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("wav") => "audio/wav",
        Some("webm") => "audio/webm",
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("ogg") | Some("oga") => "audio/ogg",
        Some("mp3") => "audio/mpeg",
        _ => "application/octet-stream",
    }
}
