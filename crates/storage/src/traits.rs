//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;

/// Content type used for every JSON document the store writes.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Optional HTTP metadata attached to a written object.
///
/// Objects are served to devices through a CDN, so these headers decide how
/// long edges may cache a document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PutOptions {
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
}

impl PutOptions {
    /// Options for a JSON document.
    pub fn json() -> Self {
        Self {
            content_type: Some(JSON_CONTENT_TYPE.to_string()),
            cache_control: None,
        }
    }

    pub fn with_cache_control(mut self, cache_control: impl Into<String>) -> Self {
        self.cache_control = Some(cache_control.into());
        self
    }
}

/// Object store abstraction over flat, slash-delimited keys.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get an object's content.
    ///
    /// Returns `StorageError::NotFound` when the key is absent.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Put an object, replacing any previous content.
    async fn put(&self, key: &str, data: Bytes, options: &PutOptions) -> StorageResult<()>;

    /// Delete an object.
    ///
    /// Returns `StorageError::NotFound` when the key is absent.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List every key starting with `prefix`, in no particular order.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Copy an object.
    async fn copy(&self, from: &str, to: &str) -> StorageResult<()>;

    /// Get the name of this storage backend.
    ///
    /// Returns a static string identifier for the backend type (e.g., "s3", "filesystem").
    /// Used for logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// Called during startup so misconfiguration surfaces before the first
    /// request. The default implementation returns Ok(()).
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
