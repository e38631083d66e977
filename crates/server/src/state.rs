//! Application state shared across handlers.

use depot_core::config::AppConfig;
use depot_store::BundleStore;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<BundleStore>,
    /// Normalized SHA-256 hex of the admin token; `None` disables admin routes.
    pub admin_token_hash: Option<Arc<str>>,
    /// One staging batch at a time: the store's pending set is shared.
    commit_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(config: AppConfig, store: BundleStore, admin_token_hash: Option<String>) -> Self {
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            admin_token_hash: admin_token_hash.map(Arc::from),
            commit_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Serialize stage-and-commit sequences across requests.
    pub async fn lock_commits(&self) -> MutexGuard<'_, ()> {
        self.commit_lock.lock().await
    }

    pub fn api_base_path(&self) -> &str {
        &self.config.server.api_base_path
    }
}
