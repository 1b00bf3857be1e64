//! Test server lifecycle management
//!
//! Spawns an isolated server per test: fresh databases, fresh media dir,
//! static-secret token verification and rate limits disabled.

use super::constants::*;
use super::fixtures::create_test_setup;
use lectern_catalog_server::auth::StaticKeyVerifier;
use lectern_catalog_server::catalog_store::CatalogStore;
use lectern_catalog_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use lectern_catalog_server::storage::{FsAudioStorage, StreamUrlSigner};
use lectern_catalog_server::user::{SqliteUserStore, UserManager, UserStore};
use lectern_catalog_server::SqliteCatalogStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance with isolated catalog, user database and media dir.
///
/// When dropped, the server shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    pub port: u16,

    /// Stores for direct database access in assertions
    pub catalog_store: Arc<SqliteCatalogStore>,
    pub user_store: Arc<dyn UserStore>,

    /// The signer the server uses for locally signed URLs; tests use it to
    /// forge expired or tampered links.
    pub url_signer: Arc<StreamUrlSigner>,

    _temp_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let (temp_dir, catalog_store, user_store, media_path) =
            create_test_setup().expect("Failed to create test fixtures");

        let catalog_store = Arc::new(catalog_store);
        let user_store: Arc<SqliteUserStore> = Arc::new(user_store);
        let user_manager = Arc::new(UserManager::new(
            catalog_store.clone() as Arc<dyn CatalogStore>,
            user_store.clone() as Arc<dyn UserStore>,
        ));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
            content_cache_age_sec: 0, // Disable caching in tests
            frontend_dir_path: None,
            presign_expiry_secs: 300,
            max_stream_chunk_bytes: TEST_MAX_STREAM_CHUNK,
            rate_limits_enabled: false,
        };

        let url_signer = Arc::new(StreamUrlSigner::new(TEST_SIGNING_SECRET, &base_url));

        let app = make_app(
            config,
            catalog_store.clone() as Arc<dyn CatalogStore>,
            user_manager,
            Arc::new(FsAudioStorage::new(&media_path)),
            Arc::new(StaticKeyVerifier::new(TEST_AUTH_SECRET, None, None)),
            url_signer.clone(),
        )
        .expect("Failed to build app");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            })
            .await
            .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            catalog_store,
            user_store,
            url_signer,
            _temp_dir: temp_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to answer on the stats endpoint.
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => {
                    return;
                }
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
