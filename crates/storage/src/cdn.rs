//! CDN cache invalidation.

use crate::aws::{DEFAULT_REGION, credentials_provider};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_cloudfront::Client;
use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};
use depot_core::config::CdnConfig;
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument};

/// Purges cached copies of URL paths from a CDN.
#[async_trait]
pub trait CdnInvalidator: Send + Sync + 'static {
    /// Invalidate every path in one request. Paths start with `/` and may end
    /// in a `*` wildcard.
    async fn invalidate(&self, paths: &[String]) -> StorageResult<()>;
}

/// Invalidator for deployments without a CDN.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInvalidator;

#[async_trait]
impl CdnInvalidator for NoopInvalidator {
    async fn invalidate(&self, paths: &[String]) -> StorageResult<()> {
        debug!(count = paths.len(), "no CDN configured, skipping invalidation");
        Ok(())
    }
}

/// Keeps every invalidation request in memory.
#[derive(Debug, Default)]
pub struct RecordingInvalidator {
    requests: Mutex<Vec<Vec<String>>>,
}

impl RecordingInvalidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<Vec<String>> {
        self.requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CdnInvalidator for RecordingInvalidator {
    async fn invalidate(&self, paths: &[String]) -> StorageResult<()> {
        self.requests
            .lock()
            .map_err(|_| StorageError::Cdn("recording invalidator lock poisoned".to_string()))?
            .push(paths.to_vec());
        Ok(())
    }
}

/// Amazon CloudFront invalidator.
pub struct CloudFrontInvalidator {
    client: Client,
    distribution_id: String,
}

impl std::fmt::Debug for CloudFrontInvalidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudFrontInvalidator")
            .field("distribution_id", &self.distribution_id)
            .finish_non_exhaustive()
    }
}

impl CloudFrontInvalidator {
    pub fn new(
        distribution_id: &str,
        region: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
    ) -> StorageResult<Self> {
        let region = region.unwrap_or_else(|| DEFAULT_REGION.to_string());
        let credentials =
            credentials_provider(&region, access_key_id, secret_access_key, "depot-cdn-config")?;
        let config = aws_sdk_cloudfront::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_config::Region::new(region))
            .credentials_provider(credentials)
            .build();

        Ok(Self {
            client: Client::from_conf(config),
            distribution_id: distribution_id.to_string(),
        })
    }
}

#[async_trait]
impl CdnInvalidator for CloudFrontInvalidator {
    #[instrument(skip(self, paths), fields(cdn = "cloudfront", count = paths.len()))]
    async fn invalidate(&self, paths: &[String]) -> StorageResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let quantity = i32::try_from(paths.len())
            .map_err(|_| StorageError::Cdn(format!("too many paths: {}", paths.len())))?;

        let paths = Paths::builder()
            .quantity(quantity)
            .set_items(Some(paths.to_vec()))
            .build()
            .map_err(|e| StorageError::Cdn(e.to_string()))?;
        let batch = InvalidationBatch::builder()
            .paths(paths)
            .caller_reference(uuid::Uuid::new_v4().to_string())
            .build()
            .map_err(|e| StorageError::Cdn(e.to_string()))?;

        let output = self
            .client
            .create_invalidation()
            .distribution_id(&self.distribution_id)
            .invalidation_batch(batch)
            .send()
            .await
            .map_err(|e| StorageError::Cdn(e.to_string()))?;

        debug!(
            invalidation_id = output.invalidation().map(|i| i.id()),
            "created CloudFront invalidation"
        );
        Ok(())
    }
}

/// Create a CDN invalidator from configuration.
pub fn cdn_from_config(config: &CdnConfig) -> StorageResult<Arc<dyn CdnInvalidator>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        CdnConfig::None => Ok(Arc::new(NoopInvalidator)),
        CdnConfig::Cloudfront {
            distribution_id,
            region,
            access_key_id,
            secret_access_key,
        } => Ok(Arc::new(CloudFrontInvalidator::new(
            distribution_id,
            region.clone(),
            access_key_id.clone(),
            secret_access_key.clone(),
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_invalidator_keeps_batches() {
        let cdn = RecordingInvalidator::new();
        cdn.invalidate(&["/a".to_string(), "/b/*".to_string()])
            .await
            .unwrap();
        cdn.invalidate(&["/c".to_string()]).await.unwrap();

        assert_eq!(
            cdn.requests(),
            vec![
                vec!["/a".to_string(), "/b/*".to_string()],
                vec!["/c".to_string()]
            ]
        );
    }

    #[tokio::test]
    async fn from_config_builds_each_variant() {
        let noop = cdn_from_config(&CdnConfig::None).unwrap();
        noop.invalidate(&["/x".to_string()]).await.unwrap();

        let cloudfront = cdn_from_config(&CdnConfig::Cloudfront {
            distribution_id: "E123EXAMPLE".to_string(),
            region: None,
            access_key_id: Some("key".to_string()),
            secret_access_key: Some("secret".to_string()),
        });
        assert!(cloudfront.is_ok());
    }

    #[test]
    fn from_config_rejects_missing_distribution() {
        let result = cdn_from_config(&CdnConfig::Cloudfront {
            distribution_id: String::new(),
            region: None,
            access_key_id: None,
            secret_access_key: None,
        });
        assert!(matches!(result, Err(StorageError::Config(_))));
    }
}
