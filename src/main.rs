use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lectern_catalog_server::auth::{JwksVerifier, StaticKeyVerifier, TokenVerifier};
use lectern_catalog_server::background_jobs::jobs::{IntegrityWatchdogJob, PlaybackPruningJob};
use lectern_catalog_server::background_jobs::{start_scheduler, BackgroundJob};
use lectern_catalog_server::catalog_store::CatalogStore;
use lectern_catalog_server::config::{
    AppConfig, AuthSettings, CliConfig, FileConfig, StorageBackendSettings,
};
use lectern_catalog_server::server::{metrics, run_server, RequestsLoggingLevel, ServerConfig};
use lectern_catalog_server::storage::{AudioStorage, FsAudioStorage, S3AudioStorage, StreamUrlSigner};
use lectern_catalog_server::user::UserManager;
use lectern_catalog_server::{SqliteCatalogStore, SqliteUserStore};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(name = "lectern-server")]
#[command(about = "Lecture catalog and audio streaming server")]
struct CliArgs {
    /// Directory holding the SQLite databases (catalog.db, user.db).
    #[clap(value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Path to a TOML config file. File values override CLI values.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// The maximum age of content in the cache in seconds.
    #[clap(long, default_value_t = 3600)]
    pub content_cache_age_sec: usize,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// Shared HS256 secret for token verification (development only).
    #[clap(long)]
    pub static_auth_secret: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;

    let cli_config = CliConfig {
        db_dir: cli_args.db_dir,
        port: cli_args.port,
        metrics_port: cli_args.metrics_port,
        logging_level: cli_args.logging_level,
        content_cache_age_sec: cli_args.content_cache_age_sec,
        frontend_dir_path: cli_args.frontend_dir_path,
        static_auth_secret: cli_args.static_auth_secret,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Opening catalog database at {:?}...", config.catalog_db_path());
    let catalog_store = Arc::new(SqliteCatalogStore::new(config.catalog_db_path())?);

    info!("Initializing metrics...");
    metrics::init_metrics();
    metrics::init_catalog_metrics(
        catalog_store.get_speakers_count(),
        catalog_store.get_collections_count(),
        catalog_store.get_lectures_count(),
    );

    let user_store = Arc::new(SqliteUserStore::new(config.user_db_path())?);
    let user_manager = Arc::new(UserManager::new(
        catalog_store.clone() as Arc<dyn CatalogStore>,
        user_store,
    ));

    let token_verifier: Arc<dyn TokenVerifier> = match &config.auth {
        AuthSettings::Jwks {
            issuer_url,
            audience,
            jwks_url,
        } => Arc::new(JwksVerifier::new(
            issuer_url.clone(),
            audience.clone(),
            jwks_url.clone(),
        )),
        AuthSettings::StaticSecret {
            secret,
            issuer_url,
            audience,
        } => {
            warn!("Static HS256 token verification in use; not for production");
            Arc::new(StaticKeyVerifier::new(
                secret,
                issuer_url.as_deref(),
                audience.as_deref(),
            ))
        }
    };

    let storage: Arc<dyn AudioStorage> = match &config.storage.backend {
        StorageBackendSettings::Fs { media_dir } => {
            info!("Audio storage: local directory {:?}", media_dir);
            Arc::new(FsAudioStorage::new(media_dir))
        }
        StorageBackendSettings::S3 {
            bucket,
            region,
            endpoint_url,
        } => Arc::new(
            S3AudioStorage::new(bucket.clone(), region.clone(), endpoint_url.clone()).await?,
        ),
    };

    let signing_secret = match &config.storage.signing_secret {
        Some(secret) => secret.clone(),
        None => {
            info!("No URL signing secret configured, generating one for this process");
            StreamUrlSigner::random_secret()
        }
    };
    let url_signer = Arc::new(StreamUrlSigner::new(
        &signing_secret,
        &config.storage.public_base_url,
    ));

    let jobs: Vec<Arc<dyn BackgroundJob>> = vec![
        Arc::new(IntegrityWatchdogJob::new(
            catalog_store.clone(),
            storage.clone(),
            Duration::from_secs(config.jobs.integrity_interval_hours * 60 * 60),
            config.jobs.integrity_repair,
        )),
        Arc::new(PlaybackPruningJob::new(
            user_manager.clone(),
            config.jobs.playback_retention_days,
            Duration::from_secs(config.jobs.prune_interval_hours * 60 * 60),
        )),
    ];
    let scheduler_handle = start_scheduler(jobs);

    let server_config = ServerConfig {
        port: config.port,
        requests_logging_level: config.logging_level.clone(),
        content_cache_age_sec: config.content_cache_age_sec,
        frontend_dir_path: config.frontend_dir_path.clone(),
        presign_expiry_secs: config.storage.presign_expiry_secs,
        max_stream_chunk_bytes: config.storage.max_stream_chunk_bytes,
        rate_limits_enabled: true,
    };

    info!("Ready to serve at port {}!", config.port);
    info!("Metrics available at port {}!", config.metrics_port);
    let result = run_server(
        server_config,
        config.metrics_port,
        catalog_store,
        user_manager,
        storage,
        token_verifier,
        url_signer,
    )
    .await;

    scheduler_handle.shutdown().await;
    result
}
