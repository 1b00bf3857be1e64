use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,
    pub content_cache_age_sec: Option<usize>,
    pub frontend_dir_path: Option<String>,

    // Feature configs
    pub auth: Option<AuthConfig>,
    pub storage: Option<StorageConfig>,
    pub jobs: Option<JobsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AuthConfig {
    /// "jwks" (external identity provider) or "static" (shared HS256 secret)
    pub mode: Option<String>,
    pub issuer_url: Option<String>,
    pub audience: Option<String>,
    /// Defaults to `{issuer_url}/.well-known/jwks.json`
    pub jwks_url: Option<String>,
    pub static_secret: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// "fs" (local media directory) or "s3"
    pub backend: Option<String>,
    pub media_dir: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    /// Base URL clients can reach this server on, used in locally signed URLs
    pub public_base_url: Option<String>,
    pub presign_expiry_secs: Option<u64>,
    pub max_stream_chunk_bytes: Option<u64>,
    pub signing_secret: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct JobsConfig {
    pub integrity_interval_hours: Option<u64>,
    pub integrity_repair: Option<bool>,
    pub playback_retention_days: Option<u64>,
    pub prune_interval_hours: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
