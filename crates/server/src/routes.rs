//! Route configuration.

use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check (unauthenticated for load balancers/probes)
        .route("/v1/health", get(handlers::health_check))
        // Upload control plane
        .route("/v1/uploads", post(handlers::begin_upload))
        .route(
            "/v1/uploads/{session_id}",
            get(handlers::get_upload).delete(handlers::abort_upload),
        )
        .route(
            "/v1/uploads/{session_id}/parts/{part_number}",
            put(handlers::upload_part),
        )
        .route(
            "/v1/uploads/{session_id}/parts/{part_number}/authorize",
            post(handlers::authorize_part),
        )
        .route(
            "/v1/uploads/{session_id}/complete",
            post(handlers::complete_upload),
        )
        // Retrieval
        .route("/v1/files/{file_id}", get(handlers::resolve_file))
        .route("/v1/files/{file_id}/content", get(handlers::download_file))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
