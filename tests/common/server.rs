//! Test server lifecycle management
//!
//! Each test gets an isolated server on a random port with its own
//! collection database, music directory, and downloads directory.
//! Retention runs with second-scale settings so deletion behavior is
//! observable within a test.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tokio::net::TcpListener;

use phonotek_server::catalog_store::{CatalogStore, SqliteCatalogStore};
use phonotek_server::config::{DeliverySettings, RetentionSettings};
use phonotek_server::delivery::{
    spawn_retention_tasks, DeliveryEngine, DeliveryMode, NoopNotifier,
};
use phonotek_server::server::state::ServerState;
use phonotek_server::server::{make_app, RequestsLoggingLevel, ServerConfig};

use super::fixtures::create_test_catalog;

/// Artifact auto-deletion delay used by the test servers, in seconds.
pub const TEST_ARTIFACT_DELAY_SECS: u64 = 2;

pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// Where artifacts and extractions land.
    pub downloads_dir: PathBuf,

    /// Engine handle for direct registry inspection in tests.
    pub engine: Arc<DeliveryEngine>,

    // Keep temp resources alive until drop
    _temp_dir: TempDir,
}

impl TestServer {
    /// Spawn a server with the seeded test collection.
    pub async fn spawn() -> Self {
        let (temp_dir, db_path, music_root) =
            create_test_catalog().expect("Failed to create test catalog");
        let downloads_dir = temp_dir.path().join("downloads");

        let catalog_store: Arc<dyn CatalogStore> = Arc::new(
            SqliteCatalogStore::new(&db_path).expect("Failed to open collection store"),
        );

        let retention = RetentionSettings {
            job_ttl_seconds: 3600,
            artifact_delay_seconds: TEST_ARTIFACT_DELAY_SECS,
            sweep_interval_seconds: 300,
            deletion_tick_seconds: 1,
        };
        let settings = DeliverySettings {
            mode: DeliveryMode::Local,
            music_library_root: music_root,
            downloads_dir: downloads_dir.clone(),
            remote: None,
            retention,
        };

        let notifier = Arc::new(NoopNotifier);
        let engine = Arc::new(DeliveryEngine::new(
            catalog_store.clone(),
            notifier.clone(),
            settings,
        ));

        let _retention_handles = spawn_retention_tasks(
            engine.registry(),
            engine.deletions(),
            notifier,
            retention,
        );

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let state = ServerState {
            config: ServerConfig {
                requests_logging_level: RequestsLoggingLevel::None,
                port,
                frontend_dir_path: None,
            },
            start_time: Instant::now(),
            catalog_store,
            delivery_engine: Arc::clone(&engine),
            hash: "test".to_string(),
        };

        let app = make_app(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Server crashed");
        });

        TestServer {
            base_url: format!("http://127.0.0.1:{}", port),
            downloads_dir,
            engine,
            _temp_dir: temp_dir,
        }
    }
}
