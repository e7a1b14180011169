//! Server configuration: a TOML file with optional CLI overrides.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::delivery::DeliveryMode;

pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_JOB_TTL_SECS: u64 = 3600;
pub const DEFAULT_ARTIFACT_DELAY_SECS: u64 = 180;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_DELETION_TICK_SECS: u64 = 10;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub mode: Option<DeliveryMode>,
    pub music_library_root: Option<PathBuf>,
    pub downloads_dir: Option<PathBuf>,
    pub port: Option<u16>,
    pub frontend_dir_path: Option<String>,

    // Feature configs
    pub remote: Option<RemoteConfig>,
    pub retention: Option<RetentionConfig>,
    pub notifier: Option<NotifierConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RemoteConfig {
    pub host: Option<String>,
    pub key_path: Option<PathBuf>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RetentionConfig {
    pub job_ttl_seconds: Option<u64>,
    pub artifact_delay_seconds: Option<u64>,
    pub sweep_interval_seconds: Option<u64>,
    pub deletion_tick_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct NotifierConfig {
    /// URL that receives delivery lifecycle events as JSON POSTs.
    pub url: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Resolve the raw file values into validated delivery settings.
    pub fn resolve_delivery(&self) -> Result<DeliverySettings> {
        let mode = self.mode.unwrap_or(DeliveryMode::Local);
        let retention = self.retention.clone().unwrap_or_default();
        let remote_cfg = self.remote.clone().unwrap_or_default();

        let remote = match mode {
            DeliveryMode::Local => None,
            DeliveryMode::Remote => {
                let Some(host) = remote_cfg.host.clone() else {
                    bail!("mode = \"remote\" requires remote.host to be set");
                };
                Some(RemoteSettings {
                    host,
                    key_path: remote_cfg.key_path.clone(),
                    timeout_seconds: remote_cfg
                        .timeout_seconds
                        .unwrap_or(DEFAULT_REMOTE_TIMEOUT_SECS),
                })
            }
        };

        Ok(DeliverySettings {
            mode,
            music_library_root: self
                .music_library_root
                .clone()
                .unwrap_or_else(|| PathBuf::from("/music")),
            downloads_dir: self
                .downloads_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("downloads")),
            remote,
            retention: RetentionSettings {
                job_ttl_seconds: retention.job_ttl_seconds.unwrap_or(DEFAULT_JOB_TTL_SECS),
                artifact_delay_seconds: retention
                    .artifact_delay_seconds
                    .unwrap_or(DEFAULT_ARTIFACT_DELAY_SECS),
                sweep_interval_seconds: retention
                    .sweep_interval_seconds
                    .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
                deletion_tick_seconds: retention
                    .deletion_tick_seconds
                    .unwrap_or(DEFAULT_DELETION_TICK_SECS),
            },
        })
    }
}

/// Validated settings for the album delivery engine.
#[derive(Debug, Clone)]
pub struct DeliverySettings {
    pub mode: DeliveryMode,
    /// Library root on the local filesystem (local mode) or on the remote
    /// host (remote mode). Never checked locally in remote mode.
    pub music_library_root: PathBuf,
    pub downloads_dir: PathBuf,
    /// Present iff `mode` is remote.
    pub remote: Option<RemoteSettings>,
    pub retention: RetentionSettings,
}

#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub host: String,
    pub key_path: Option<PathBuf>,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct RetentionSettings {
    pub job_ttl_seconds: u64,
    pub artifact_delay_seconds: u64,
    pub sweep_interval_seconds: u64,
    pub deletion_tick_seconds: u64,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            job_ttl_seconds: DEFAULT_JOB_TTL_SECS,
            artifact_delay_seconds: DEFAULT_ARTIFACT_DELAY_SECS,
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECS,
            deletion_tick_seconds: DEFAULT_DELETION_TICK_SECS,
        }
    }
}
