//! Bundle administration.
//!
//! Every write stages its changes and commits them before responding, under
//! the state's commit lock, so one request is one commit.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use depot_core::{Bundle, BundlePatch, Platform};
use depot_store::{BundleFilter, BundleStore, CommitSummary, Page, PageRequest, StoreResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Maximum request body size for admin endpoints (1 MiB).
const MAX_ADMIN_BODY_SIZE: usize = 1024 * 1024;

/// Page size when the caller gives none.
const DEFAULT_PAGE_LIMIT: usize = 50;

async fn read_json_body<T: DeserializeOwned>(req: Request) -> ApiResult<T> {
    let bytes = axum::body::to_bytes(req.into_body(), MAX_ADMIN_BODY_SIZE)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))
}

/// Run `stage` against the store and commit the result as one batch.
///
/// Staged changes are dropped when staging or the commit fails, so a failed
/// request never leaks into the next one.
async fn stage_and_commit<'a, F, Fut>(state: &'a AppState, stage: F) -> ApiResult<CommitSummary>
where
    F: FnOnce(&'a BundleStore) -> Fut,
    Fut: Future<Output = StoreResult<()>> + 'a,
{
    let _guard = state.lock_commits().await;
    let store = state.store.as_ref();

    let result = match stage(store).await {
        Ok(()) => store.commit().await,
        Err(e) => Err(e),
    };
    match result {
        Ok(summary) => Ok(summary),
        Err(e) => {
            store.discard_pending().await;
            Err(e.into())
        }
    }
}

/// Query parameters for listing bundles.
#[derive(Debug, Default, Deserialize)]
pub struct ListBundlesParams {
    pub channel: Option<String>,
    pub platform: Option<Platform>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// GET /admin/bundles - List bundles, newest first.
pub async fn list_bundles(
    State(state): State<AppState>,
    Query(params): Query<ListBundlesParams>,
) -> ApiResult<Json<Page<Bundle>>> {
    let filter = BundleFilter {
        channel: params.channel.filter(|c| !c.is_empty()),
        platform: params.platform,
    };
    let page = PageRequest::new(
        params.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        params.offset.unwrap_or(0),
    );
    Ok(Json(state.store.get_bundles(&filter, page).await?))
}

/// GET /admin/bundles/{id}
pub async fn get_bundle(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Bundle>> {
    state
        .store
        .get_bundle_by_id(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("bundle {id}")))
}

/// A single bundle or a batch.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CreateBundlesRequest {
    One(Box<Bundle>),
    Many(Vec<Bundle>),
}

impl CreateBundlesRequest {
    fn into_bundles(self) -> Vec<Bundle> {
        match self {
            Self::One(bundle) => vec![*bundle],
            Self::Many(bundles) => bundles,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WriteResponse {
    pub success: bool,
    pub commit: CommitSummary,
}

impl WriteResponse {
    fn new(commit: CommitSummary) -> Json<Self> {
        Json(Self {
            success: true,
            commit,
        })
    }
}

/// POST /admin/bundles - Insert one bundle or an array of bundles.
pub async fn create_bundles(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<WriteResponse>)> {
    let bundles = read_json_body::<CreateBundlesRequest>(req)
        .await?
        .into_bundles();
    if bundles.is_empty() {
        return Err(ApiError::BadRequest("no bundles given".to_string()));
    }
    let count = bundles.len();

    let summary = stage_and_commit(&state, |store| async move {
        for bundle in bundles {
            store.insert(bundle).await?;
        }
        Ok(())
    })
    .await?;

    tracing::info!(count, "bundles created");
    Ok((StatusCode::CREATED, WriteResponse::new(summary)))
}

/// PATCH /admin/bundles/{id} - Partial update.
pub async fn update_bundle(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> ApiResult<Json<WriteResponse>> {
    let patch: BundlePatch = read_json_body(req).await?;
    let summary = stage_and_commit(&state, |store| {
        let id = id.clone();
        async move { store.update(&id, &patch).await }
    })
    .await?;

    tracing::info!(bundle_id = %id, "bundle updated");
    Ok(WriteResponse::new(summary))
}

/// DELETE /admin/bundles/{id}
pub async fn delete_bundle(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<WriteResponse>> {
    let summary = stage_and_commit(&state, |store| {
        let id = id.clone();
        async move { store.delete(&id).await }
    })
    .await?;

    tracing::info!(bundle_id = %id, "bundle deleted");
    Ok(WriteResponse::new(summary))
}

#[derive(Debug, Serialize)]
pub struct ChannelsResponse {
    pub channels: Vec<String>,
}

/// GET /admin/channels
pub async fn list_channels(State(state): State<AppState>) -> ApiResult<Json<ChannelsResponse>> {
    Ok(Json(ChannelsResponse {
        channels: state.store.get_channels().await?,
    }))
}
