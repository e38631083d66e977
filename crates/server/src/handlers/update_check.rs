//! Update checks.
//!
//! Devices either send their state in headers to `{apiBasePath}` or encode
//! it in the path, which lets a CDN cache responses per device state:
//!
//! ```text
//! {apiBasePath}/app-version/{platform}/{appVersion}/{channel}/{minBundleId}/{bundleId}[/{deviceId}]
//! {apiBasePath}/fingerprint/{platform}/{fingerprintHash}/{channel}/{minBundleId}/{bundleId}[/{deviceId}]
//! ```

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use depot_core::{BASELINE_BUNDLE_ID, Platform, UpdateDecision, UpdateRequest};

pub const PLATFORM_HEADER: &str = "x-app-platform";
pub const BUNDLE_ID_HEADER: &str = "x-bundle-id";
pub const APP_VERSION_HEADER: &str = "x-app-version";
pub const FINGERPRINT_HEADER: &str = "x-fingerprint-hash";
pub const CHANNEL_HEADER: &str = "x-channel";
pub const MIN_BUNDLE_ID_HEADER: &str = "x-min-bundle-id";
pub const DEVICE_ID_HEADER: &str = "x-device-id";

type UpdateCheckResponse = Json<Option<UpdateDecision>>;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> ApiResult<Option<&'a str>> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v.trim()).filter(|v| !v.is_empty()))
            .map_err(|_| ApiError::BadRequest(format!("header {name} is not valid ASCII"))),
    }
}

fn parse_platform(value: &str) -> ApiResult<Platform> {
    value
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("unsupported platform: {value}")))
}

/// Values that end up as a storage key segment must be a single plain segment.
fn key_segment<'a>(name: &str, value: &'a str) -> ApiResult<&'a str> {
    if matches!(value, "" | "." | "..") || value.contains(['/', '\\']) {
        return Err(ApiError::BadRequest(format!("invalid {name}: {value:?}")));
    }
    Ok(value)
}

/// Build a request from path segments. A min bundle id equal to the
/// baseline sentinel means "no floor".
fn with_path_extras(
    request: UpdateRequest,
    channel: String,
    min_bundle_id: String,
    device_id: Option<String>,
) -> ApiResult<UpdateRequest> {
    key_segment("channel", &channel)?;
    let mut request = request.with_channel(channel);
    if min_bundle_id != BASELINE_BUNDLE_ID {
        request = request.with_min_bundle_id(min_bundle_id);
    }
    if let Some(device_id) = device_id {
        request = request.with_device_id(device_id);
    }
    Ok(request)
}

async fn resolve(state: &AppState, request: UpdateRequest) -> ApiResult<UpdateCheckResponse> {
    let decision = state.store.resolve(&request).await?;
    tracing::debug!(
        platform = %request.platform,
        channel = %request.channel,
        current = %request.current_bundle_id,
        decision = ?decision.as_ref().map(|d| (&d.id, d.status)),
        "update check"
    );
    Ok(Json(decision))
}

/// GET {apiBasePath} - Update check driven by request headers.
pub async fn check_update(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<UpdateCheckResponse> {
    let platform = header(&headers, PLATFORM_HEADER)?
        .ok_or_else(|| ApiError::BadRequest(format!("missing {PLATFORM_HEADER} header")))?;
    let platform = parse_platform(platform)?;
    let bundle_id = header(&headers, BUNDLE_ID_HEADER)?
        .ok_or_else(|| ApiError::BadRequest(format!("missing {BUNDLE_ID_HEADER} header")))?;

    let mut request = match (
        header(&headers, FINGERPRINT_HEADER)?,
        header(&headers, APP_VERSION_HEADER)?,
    ) {
        (Some(hash), _) => {
            UpdateRequest::fingerprint(platform, key_segment("fingerprint hash", hash)?, bundle_id)
        }
        (None, Some(version)) => {
            UpdateRequest::app_version(platform, key_segment("app version", version)?, bundle_id)
        }
        (None, None) => {
            return Err(ApiError::BadRequest(format!(
                "one of {APP_VERSION_HEADER} or {FINGERPRINT_HEADER} is required"
            )));
        }
    };
    if let Some(channel) = header(&headers, CHANNEL_HEADER)? {
        request = request.with_channel(key_segment("channel", channel)?);
    }
    if let Some(min) = header(&headers, MIN_BUNDLE_ID_HEADER)? {
        request = request.with_min_bundle_id(min);
    }
    if let Some(device_id) = header(&headers, DEVICE_ID_HEADER)? {
        request = request.with_device_id(device_id);
    }

    resolve(&state, request).await
}

/// GET {apiBasePath}/app-version/{platform}/{appVersion}/{channel}/{minBundleId}/{bundleId}
pub async fn check_update_by_app_version(
    State(state): State<AppState>,
    Path((platform, app_version, channel, min_bundle_id, bundle_id)): Path<(
        String,
        String,
        String,
        String,
        String,
    )>,
) -> ApiResult<UpdateCheckResponse> {
    key_segment("app version", &app_version)?;
    let request = UpdateRequest::app_version(parse_platform(&platform)?, app_version, bundle_id);
    resolve(&state, with_path_extras(request, channel, min_bundle_id, None)?).await
}

/// Same as [`check_update_by_app_version`] with a trailing device id for rollout gating.
pub async fn check_update_by_app_version_for_device(
    State(state): State<AppState>,
    Path((platform, app_version, channel, min_bundle_id, bundle_id, device_id)): Path<(
        String,
        String,
        String,
        String,
        String,
        String,
    )>,
) -> ApiResult<UpdateCheckResponse> {
    key_segment("app version", &app_version)?;
    let request = UpdateRequest::app_version(parse_platform(&platform)?, app_version, bundle_id);
    resolve(
        &state,
        with_path_extras(request, channel, min_bundle_id, Some(device_id))?,
    )
    .await
}

/// GET {apiBasePath}/fingerprint/{platform}/{fingerprintHash}/{channel}/{minBundleId}/{bundleId}
pub async fn check_update_by_fingerprint(
    State(state): State<AppState>,
    Path((platform, hash, channel, min_bundle_id, bundle_id)): Path<(
        String,
        String,
        String,
        String,
        String,
    )>,
) -> ApiResult<UpdateCheckResponse> {
    key_segment("fingerprint hash", &hash)?;
    let request = UpdateRequest::fingerprint(parse_platform(&platform)?, hash, bundle_id);
    resolve(&state, with_path_extras(request, channel, min_bundle_id, None)?).await
}

pub async fn check_update_by_fingerprint_for_device(
    State(state): State<AppState>,
    Path((platform, hash, channel, min_bundle_id, bundle_id, device_id)): Path<(
        String,
        String,
        String,
        String,
        String,
        String,
    )>,
) -> ApiResult<UpdateCheckResponse> {
    key_segment("fingerprint hash", &hash)?;
    let request = UpdateRequest::fingerprint(parse_platform(&platform)?, hash, bundle_id);
    resolve(
        &state,
        with_path_extras(request, channel, min_bundle_id, Some(device_id))?,
    )
    .await
}
