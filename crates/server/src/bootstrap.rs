//! Startup wiring: configuration checks and state construction.

use crate::state::AppState;
use anyhow::{Context, Result, bail};
use depot_core::config::{AdminConfig, AppConfig};
use depot_storage::{cdn_from_config, from_config};
use depot_store::BundleStore;

/// Canonical form of the configured admin token hash.
///
/// Accepts an optional `sha256:` prefix and either case; the middleware
/// compares against lowercase hex.
pub fn normalize_admin_token_hash(config: &AdminConfig) -> Result<String> {
    let hash = config
        .token_hash
        .strip_prefix("sha256:")
        .unwrap_or(&config.token_hash)
        .to_lowercase();
    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("invalid admin token_hash: expected 64 hex chars");
    }
    Ok(hash)
}

/// Build storage, CDN and store from configuration.
///
/// Storage connectivity is checked here so misconfiguration fails startup
/// instead of the first request.
pub async fn build_state(config: AppConfig) -> Result<AppState> {
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;

    let storage = from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = storage.backend_name(), "storage backend ready");

    let cdn = cdn_from_config(&config.cdn).context("failed to initialize CDN invalidator")?;

    let admin_token_hash = match &config.admin {
        Some(admin) => Some(normalize_admin_token_hash(admin)?),
        None => {
            tracing::warn!("no admin token configured, administrative routes disabled");
            None
        }
    };

    let store = BundleStore::new(storage, cdn, config.server.api_base_path.clone());
    Ok(AppState::new(config, store, admin_token_hash))
}
