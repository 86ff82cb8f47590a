// Settings for the `voxlate` binary.
//
// Resolution order, lowest first: built-in defaults, the JSON file given with
// `--config`, `VOXLATE_BASE_URL`, then `--base-url`.

use anyhow::Context;
use std::fs;
use std::io::Write;
use std::path::Path;
use voxlate_core::config::AppConfig;

pub const BASE_URL_ENV: &str = "VOXLATE_BASE_URL";

pub fn resolve(
    path: Option<&Path>,
    env_base_url: Option<String>,
    flag_base_url: Option<String>,
) -> anyhow::Result<AppConfig> {
    let mut cfg = match path {
        Some(p) => read(p)?,
        None => AppConfig::default(),
    };

    let env_base_url = env_base_url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty());
    if let Some(url) = flag_base_url.or(env_base_url) {
        cfg.client.base_url = url;
    }
    Ok(cfg)
}

/// Missing keys take their defaults, so a file may hold just `base_url`.
pub fn read(path: &Path) -> anyhow::Result<AppConfig> {
    let bytes = fs::read(path).with_context(|| format!("read settings: {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("parse settings: {}", path.display()))
}

/// Write `cfg` as a starter settings file. An existing file is only replaced
/// with `overwrite`.
pub fn write_starter(path: &Path, cfg: &AppConfig, overwrite: bool) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(cfg).context("encode settings")?;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .truncate(true)
        .create(overwrite)
        .create_new(!overwrite)
        .open(path)
        .with_context(|| {
            if path.exists() && !overwrite {
                format!("{} already exists (pass --force to replace it)", path.display())
            } else {
                format!("create settings: {}", path.display())
            }
        })?;
    file.write_all(&json)
        .and_then(|()| file.write_all(b"\n"))
        .with_context(|| format!("write settings: {}", path.display()))
}
