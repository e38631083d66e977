use async_trait::async_trait;
use bytes::Bytes;
use depot_core::{Bundle, Platform};
use depot_storage::{
    FilesystemBackend, ObjectStore, PutOptions, RecordingInvalidator, StorageError, StorageResult,
};
use depot_store::BundleStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

pub const API_BASE: &str = "/api/check-update";

/// Time-ordered ids, oldest first.
#[allow(dead_code)]
pub const ID1: &str = "0195a0b0-0000-7000-8000-000000000001";
#[allow(dead_code)]
pub const ID2: &str = "0195a0b0-0000-7000-8000-000000000002";
#[allow(dead_code)]
pub const ID3: &str = "0195a0b0-0000-7000-8000-000000000003";

/// A filesystem store in a temp dir with a recording CDN.
#[allow(dead_code)]
pub struct Fixture {
    _dir: TempDir,
    pub storage: Arc<dyn ObjectStore>,
    pub cdn: Arc<RecordingInvalidator>,
    pub store: BundleStore,
}

#[allow(dead_code)]
impl Fixture {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn ObjectStore> =
            Arc::new(FilesystemBackend::new(dir.path()).await.unwrap());
        Self::with_storage(dir, storage)
    }

    pub fn with_storage(dir: TempDir, storage: Arc<dyn ObjectStore>) -> Self {
        let cdn = Arc::new(RecordingInvalidator::new());
        let store = BundleStore::new(storage.clone(), cdn.clone(), API_BASE);
        Self {
            _dir: dir,
            storage,
            cdn,
            store,
        }
    }

    pub async fn read_json(&self, key: &str) -> serde_json::Value {
        let data = self.storage.get(key).await.unwrap();
        serde_json::from_slice(&data).unwrap()
    }

    pub async fn put_json(&self, key: &str, value: serde_json::Value) {
        self.storage
            .put(key, Bytes::from(value.to_string()), &PutOptions::json())
            .await
            .unwrap();
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys = self.storage.list("").await.unwrap();
        keys.sort();
        keys
    }

    /// Insert and commit in one go.
    pub async fn seed(&self, bundles: Vec<Bundle>) {
        for bundle in bundles {
            self.store.insert(bundle).await.unwrap();
        }
        self.store.commit().await.unwrap();
    }
}

#[allow(dead_code)]
pub fn bundle(id: &str, platform: Platform, target: &str) -> Bundle {
    let mut b = Bundle::new(id, platform, target);
    b.storage_uri = format!("s3://bundles/{id}/bundle.zip");
    b.file_hash = format!("sha256-{id}");
    b
}

#[allow(dead_code)]
pub fn fingerprint_bundle(id: &str, platform: Platform, hash: &str) -> Bundle {
    let mut b = bundle(id, platform, "*");
    b.fingerprint_hash = Some(hash.to_string());
    b
}

/// Object store wrapper that rejects writes to matching keys.
#[allow(dead_code)]
pub struct FailingStore {
    inner: Arc<dyn ObjectStore>,
    fail_key_containing: Option<String>,
    failures: AtomicUsize,
}

#[allow(dead_code)]
impl FailingStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            fail_key_containing: None,
            failures: AtomicUsize::new(0),
        }
    }

    /// Fail every put whose key contains `needle`.
    pub fn fail_puts_to(mut self, needle: &str) -> Self {
        self.fail_key_containing = Some(needle.to_string());
        self
    }

    /// Number of puts rejected so far.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    fn injected(&self, key: &str) -> StorageError {
        self.failures.fetch_add(1, Ordering::SeqCst);
        StorageError::Io(std::io::Error::other(format!("injected failure writing {key}")))
    }
}

#[async_trait]
impl ObjectStore for FailingStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, data: Bytes, options: &PutOptions) -> StorageResult<()> {
        if self
            .fail_key_containing
            .as_deref()
            .is_some_and(|needle| key.contains(needle))
        {
            return Err(self.injected(key));
        }
        self.inner.put(key, data, options).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list(prefix).await
    }

    async fn copy(&self, from: &str, to: &str) -> StorageResult<()> {
        self.inner.copy(from, to).await
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}
