//! HTTP router construction.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::api;
use crate::state::AppState;

/// Build the registry router with all routes and middleware.
pub fn build_router(state: Arc<AppState>, cors_origin: &str) -> Router {
    Router::new()
        .route("/health", get(api::health::health))
        .route("/jobs", get(api::jobs::jobs_list).post(api::jobs::jobs_create))
        .route("/jobs/{id}", get(api::jobs::jobs_get))
        .route("/jobs/{id}/start", post(api::jobs::jobs_start))
        .route("/jobs/{id}/stop", post(api::jobs::jobs_stop))
        .route("/jobs/{id}/_update_state", post(api::jobs::jobs_update_state))
        .layer(cors_layer(cors_origin))
        .with_state(state)
}

/// `*` (or an unparseable origin) allows any origin.
fn cors_layer(origin: &str) -> CorsLayer {
    if origin == "*" {
        return CorsLayer::permissive();
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => CorsLayer::new()
            .allow_origin(AllowOrigin::exact(value))
            .allow_methods(Any)
            .allow_headers(Any),
        Err(_) => {
            warn!(origin, "invalid CORS_ORIGIN, allowing any origin");
            CorsLayer::permissive()
        }
    }
}
