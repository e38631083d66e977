//! Bundle fixtures and request helpers.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use depot_core::{Bundle, Platform};
use serde_json::Value;
use tower::ServiceExt;

/// Raw token whose SHA-256 is `AdminConfig::for_testing()`'s hash.
#[allow(dead_code)]
pub const ADMIN_TOKEN: &str = "test-admin-token";

#[allow(dead_code)]
pub const ID1: &str = "0195a0b0-0000-7000-8000-000000000001";
#[allow(dead_code)]
pub const ID2: &str = "0195a0b0-0000-7000-8000-000000000002";
#[allow(dead_code)]
pub const ID3: &str = "0195a0b0-0000-7000-8000-000000000003";

#[allow(dead_code)]
pub fn bundle(id: &str, platform: Platform, target: &str) -> Bundle {
    let mut b = Bundle::new(id, platform, target);
    b.storage_uri = format!("s3://bundles/{id}/bundle.zip");
    b.file_hash = format!("sha256-{id}");
    b
}

/// Send a request and decode the JSON body (`Value::Null` when empty).
#[allow(dead_code)]
pub async fn send(router: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

/// Helper to make JSON requests.
#[allow(dead_code)]
pub async fn json_request(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    auth_token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = auth_token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }

    let body = match body {
        Some(v) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    send(router, builder.body(body).unwrap()).await
}

/// GET with extra headers.
#[allow(dead_code)]
pub async fn get_with_headers(
    router: &axum::Router,
    uri: &str,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method("GET").uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    send(router, builder.body(Body::empty()).unwrap()).await
}
