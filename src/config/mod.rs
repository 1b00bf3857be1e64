mod file_config;

pub use file_config::{AuthConfig, FileConfig, JobsConfig, StorageConfig};

use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

/// CLI arguments that take part in config resolution.
/// TOML values override these where present.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub content_cache_age_sec: usize,
    pub frontend_dir_path: Option<String>,
    pub static_auth_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AuthSettings {
    /// Verify tokens against an external issuer's JWKS document.
    Jwks {
        issuer_url: String,
        audience: Option<String>,
        jwks_url: Option<String>,
    },
    /// Verify tokens with a shared HS256 secret (development, tests).
    StaticSecret {
        secret: String,
        issuer_url: Option<String>,
        audience: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub enum StorageBackendSettings {
    Fs {
        media_dir: PathBuf,
    },
    S3 {
        bucket: String,
        region: Option<String>,
        endpoint_url: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub backend: StorageBackendSettings,
    pub public_base_url: String,
    pub presign_expiry_secs: u64,
    pub max_stream_chunk_bytes: u64,
    /// Secret for locally signed stream URLs. Generated per-process when
    /// absent, which invalidates outstanding URLs on restart.
    pub signing_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JobSettings {
    pub integrity_interval_hours: u64,
    pub integrity_repair: bool,
    pub playback_retention_days: u64,
    pub prune_interval_hours: u64,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            integrity_interval_hours: 24,
            integrity_repair: false,
            playback_retention_days: 180,
            prune_interval_hours: 24,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub content_cache_age_sec: usize,
    pub frontend_dir_path: Option<String>,

    pub auth: AuthSettings,
    pub storage: StorageSettings,
    pub jobs: JobSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via the CLI or in the config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let content_cache_age_sec = file
            .content_cache_age_sec
            .unwrap_or(cli.content_cache_age_sec);
        let frontend_dir_path = file
            .frontend_dir_path
            .or_else(|| cli.frontend_dir_path.clone());

        let auth = resolve_auth(cli, file.auth.unwrap_or_default())?;
        let storage = resolve_storage(file.storage.unwrap_or_default(), &db_dir, port)?;

        let jobs_file = file.jobs.unwrap_or_default();
        let jobs_defaults = JobSettings::default();
        let jobs = JobSettings {
            integrity_interval_hours: jobs_file
                .integrity_interval_hours
                .unwrap_or(jobs_defaults.integrity_interval_hours),
            integrity_repair: jobs_file
                .integrity_repair
                .unwrap_or(jobs_defaults.integrity_repair),
            playback_retention_days: jobs_file
                .playback_retention_days
                .unwrap_or(jobs_defaults.playback_retention_days),
            prune_interval_hours: jobs_file
                .prune_interval_hours
                .unwrap_or(jobs_defaults.prune_interval_hours),
        };

        Ok(Self {
            db_dir,
            port,
            metrics_port,
            logging_level,
            content_cache_age_sec,
            frontend_dir_path,
            auth,
            storage,
            jobs,
        })
    }

    pub fn catalog_db_path(&self) -> PathBuf {
        self.db_dir.join("catalog.db")
    }

    pub fn user_db_path(&self) -> PathBuf {
        self.db_dir.join("user.db")
    }
}

fn resolve_auth(cli: &CliConfig, auth: AuthConfig) -> Result<AuthSettings> {
    let mode = auth.mode.as_deref().unwrap_or(if auth.issuer_url.is_some() {
        "jwks"
    } else {
        "static"
    });

    match mode {
        "jwks" => {
            let issuer_url = auth.issuer_url.ok_or_else(|| {
                anyhow::anyhow!("auth.issuer_url is required when auth.mode is 'jwks'")
            })?;
            Ok(AuthSettings::Jwks {
                issuer_url,
                audience: auth.audience,
                jwks_url: auth.jwks_url,
            })
        }
        "static" => {
            let secret = auth
                .static_secret
                .or_else(|| cli.static_auth_secret.clone())
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "auth.static_secret (or --static-auth-secret) is required when auth.mode is 'static'"
                    )
                })?;
            Ok(AuthSettings::StaticSecret {
                secret,
                issuer_url: auth.issuer_url,
                audience: auth.audience,
            })
        }
        other => bail!("Unknown auth.mode '{}', expected 'jwks' or 'static'", other),
    }
}

fn resolve_storage(
    storage: StorageConfig,
    db_dir: &PathBuf,
    port: u16,
) -> Result<StorageSettings> {
    let backend = match storage.backend.as_deref().unwrap_or("fs") {
        "fs" => StorageBackendSettings::Fs {
            media_dir: storage
                .media_dir
                .map(PathBuf::from)
                .unwrap_or_else(|| db_dir.clone()),
        },
        "s3" => StorageBackendSettings::S3 {
            bucket: storage.bucket.ok_or_else(|| {
                anyhow::anyhow!("storage.bucket is required when storage.backend is 's3'")
            })?,
            region: storage.region,
            endpoint_url: storage.endpoint_url,
        },
        other => bail!("Unknown storage.backend '{}', expected 'fs' or 's3'", other),
    };

    Ok(StorageSettings {
        backend,
        public_base_url: storage
            .public_base_url
            .unwrap_or_else(|| format!("http://localhost:{}", port)),
        presign_expiry_secs: storage.presign_expiry_secs.unwrap_or(900),
        max_stream_chunk_bytes: storage.max_stream_chunk_bytes.unwrap_or(4 * 1024 * 1024),
        signing_secret: storage.signing_secret,
    })
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
