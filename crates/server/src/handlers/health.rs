//! Health check handler.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;
use tracing::instrument;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend: &'static str,
}

/// Check that both the storage backend and the metadata store respond.
///
/// `GET /v1/health`
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state
        .storage
        .health_check()
        .await
        .map_err(|e| ApiError::Internal(format!("storage backend unhealthy: {e}")))?;

    state
        .metadata
        .health_check()
        .await
        .map_err(|e| ApiError::Internal(format!("metadata store unhealthy: {e}")))?;

    Ok(Json(HealthResponse {
        status: "ok",
        backend: state.storage.backend_name(),
    }))
}
