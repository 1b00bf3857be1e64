use super::RequestsLoggingLevel;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub requests_logging_level: RequestsLoggingLevel,
    pub content_cache_age_sec: usize,
    pub frontend_dir_path: Option<String>,
    /// Lifetime of presigned/signed audio URLs.
    pub presign_expiry_secs: u64,
    /// Ceiling on the byte span served for a single ranged request.
    pub max_stream_chunk_bytes: u64,
    pub rate_limits_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            requests_logging_level: RequestsLoggingLevel::default(),
            content_cache_age_sec: 3600,
            frontend_dir_path: None,
            presign_expiry_secs: 900,
            max_stream_chunk_bytes: 4 * 1024 * 1024,
            rate_limits_enabled: true,
        }
    }
}
