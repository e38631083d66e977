//! Route configuration.

use crate::auth::{admin_auth_middleware, trace_id_middleware};
use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::get;
use tower_http::trace::TraceLayer;

/// Device-facing update-check routes under the configured base path.
fn update_routes(base: &str) -> Router<AppState> {
    Router::new()
        .route(base, get(handlers::check_update))
        .route(&format!("{base}/version"), get(handlers::get_version))
        .route(
            &format!("{base}/app-version/{{platform}}/{{app_version}}/{{channel}}/{{min_bundle_id}}/{{bundle_id}}"),
            get(handlers::check_update_by_app_version),
        )
        .route(
            &format!("{base}/app-version/{{platform}}/{{app_version}}/{{channel}}/{{min_bundle_id}}/{{bundle_id}}/{{device_id}}"),
            get(handlers::check_update_by_app_version_for_device),
        )
        .route(
            &format!("{base}/fingerprint/{{platform}}/{{hash}}/{{channel}}/{{min_bundle_id}}/{{bundle_id}}"),
            get(handlers::check_update_by_fingerprint),
        )
        .route(
            &format!("{base}/fingerprint/{{platform}}/{{hash}}/{{channel}}/{{min_bundle_id}}/{{bundle_id}}/{{device_id}}"),
            get(handlers::check_update_by_fingerprint_for_device),
        )
}

fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/admin/bundles",
            get(handlers::list_bundles).post(handlers::create_bundles),
        )
        .route(
            "/admin/bundles/{id}",
            get(handlers::get_bundle)
                .patch(handlers::update_bundle)
                .delete(handlers::delete_bundle),
        )
        .route("/admin/channels", get(handlers::list_channels))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
}

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        // Unauthenticated so load balancers can probe it.
        .route("/health", get(handlers::health_check))
        .merge(update_routes(state.api_base_path()));

    if state.admin_token_hash.is_some() {
        router = router.merge(admin_routes(&state));
    }

    router
        .layer(middleware::from_fn(trace_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
