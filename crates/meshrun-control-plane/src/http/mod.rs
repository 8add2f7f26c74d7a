//! HTTP server for the control plane.
//!
//! Provides endpoints for:
//! - Job submission and status (`/api/v1/image-to-3d`)
//! - Worker claim, report and artifact upload (`/api/v1/tasks`)
//! - Static artifacts (`/assets`) and the index page (`/`)
//! - Health check (`/health`)
//! - Prometheus metrics (`/metrics`)

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod auth;
mod handlers;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let worker_routes = Router::new()
        .route("/tasks/claim", post(handlers::claim))
        .route("/tasks/:id", post(handlers::report))
        .route(
            "/tasks/:id/assets",
            post(handlers::upload_asset)
                .layer(DefaultBodyLimit::max(state.config.max_upload_bytes())),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    let api = Router::new()
        .route("/image-to-3d", post(handlers::submit))
        .route("/image-to-3d/:id", get(handlers::get_status))
        .merge(worker_routes);

    Router::new()
        .nest("/api/v1", api)
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .nest_service("/assets", ServeDir::new(&state.config.assets_dir))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
