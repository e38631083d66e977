//! Server test utilities.

use depot_core::Bundle;
use depot_core::config::{AdminConfig, AppConfig, StorageConfig};
use depot_server::bootstrap::normalize_admin_token_hash;
use depot_server::{AppState, create_router};
use depot_storage::{FilesystemBackend, ObjectStore, RecordingInvalidator};
use depot_store::BundleStore;
use std::sync::Arc;
use tempfile::TempDir;

/// A router over a temp-dir store with a recording CDN.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub storage: Arc<dyn ObjectStore>,
    pub cdn: Arc<RecordingInvalidator>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    pub async fn new() -> Self {
        Self::with_admin(Some(AdminConfig::for_testing())).await
    }

    pub async fn with_admin(admin: Option<AdminConfig>) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let storage_path = temp_dir.path().join("storage");
        let storage: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );
        let cdn = Arc::new(RecordingInvalidator::new());

        let config = AppConfig {
            storage: StorageConfig::Filesystem { path: storage_path },
            admin,
            ..AppConfig::default()
        };
        let admin_token_hash = config
            .admin
            .as_ref()
            .map(|a| normalize_admin_token_hash(a).expect("valid admin hash"));
        let store = BundleStore::new(
            storage.clone(),
            cdn.clone(),
            config.server.api_base_path.clone(),
        );

        let state = AppState::new(config, store, admin_token_hash);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            storage,
            cdn,
            _temp_dir: temp_dir,
        }
    }

    /// Insert and commit directly through the store.
    pub async fn seed(&self, bundles: Vec<Bundle>) {
        for bundle in bundles {
            self.state.store.insert(bundle).await.unwrap();
        }
        self.state.store.commit().await.unwrap();
    }
}
