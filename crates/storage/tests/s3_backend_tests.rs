mod common;

use bytes::Bytes;
use common::{MinioHarness, should_skip_s3_tests};
use depot_storage::{ObjectStore, PutOptions};

async fn harness(prefix: Option<&str>) -> Option<MinioHarness> {
    if should_skip_s3_tests() {
        return None;
    }
    match MinioHarness::start("depot-test", prefix).await {
        Ok(harness) => Some(harness),
        Err(err) => {
            eprintln!("Skipping S3 test: {err}");
            None
        }
    }
}

#[tokio::test]
async fn test_s3_documents_roundtrip_under_prefix() {
    let Some(harness) = harness(Some("bundles")).await else {
        return;
    };
    let backend = &harness.backend;
    let json = PutOptions::json().with_cache_control("max-age=31536000");

    backend
        .put("production/ios/1.x.x/update.json", Bytes::from_static(b"[]"), &json)
        .await
        .unwrap();
    backend
        .put("production/android/1.x.x/update.json", Bytes::from_static(b"[]"), &json)
        .await
        .unwrap();
    backend
        .put("migrate.json", Bytes::from_static(b"{}"), &PutOptions::json())
        .await
        .unwrap();

    let mut keys = backend.list("production/").await.unwrap();
    keys.sort();
    assert_eq!(
        keys,
        vec![
            "production/android/1.x.x/update.json",
            "production/ios/1.x.x/update.json",
        ]
    );
    assert_eq!(backend.list("").await.unwrap().len(), 3);

    assert_eq!(
        backend.get("production/ios/1.x.x/update.json").await.unwrap(),
        Bytes::from_static(b"[]")
    );
    backend.health_check().await.unwrap();
}

#[tokio::test]
async fn test_s3_missing_keys_are_not_found() {
    let Some(harness) = harness(None).await else {
        return;
    };
    let backend = &harness.backend;

    assert!(!backend.exists("nope.json").await.unwrap());
    assert!(backend.get("nope.json").await.unwrap_err().is_not_found());
    assert!(backend.delete("nope.json").await.unwrap_err().is_not_found());
    assert!(backend.copy("nope.json", "dest.json").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_s3_copy_and_delete() {
    let Some(harness) = harness(Some("depot")).await else {
        return;
    };
    let backend = &harness.backend;

    backend
        .put("ios/1.0/update.json", Bytes::from_static(b"[1]"), &PutOptions::json())
        .await
        .unwrap();
    backend
        .copy("ios/1.0/update.json", "backup/0001/ios/1.0/update.json")
        .await
        .unwrap();
    backend.delete("ios/1.0/update.json").await.unwrap();

    assert!(!backend.exists("ios/1.0/update.json").await.unwrap());
    assert_eq!(
        backend.get("backup/0001/ios/1.0/update.json").await.unwrap(),
        Bytes::from_static(b"[1]")
    );
}
