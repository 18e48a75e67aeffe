//! Upload control-plane handlers.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use depot_core::SessionId;
use depot_core::session::{
    BeginUploadRequest, BeginUploadResponse, CompleteUploadRequest, CompleteUploadResponse,
    PartAuthorizeResponse, PartUploadAck, SessionStateResponse,
};
use depot_upload::PartAck;
use tracing::instrument;

fn parse_session_id(raw: &str) -> ApiResult<SessionId> {
    SessionId::parse(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// A body that trips the read limit gets the same chunk-size reason as the
/// strict post-read check, so clients see one message for oversized parts.
fn body_read_error(e: axum::Error, max_chunk_size: usize) -> ApiError {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&e);
    while let Some(err) = source {
        if err.downcast_ref::<http_body_util::LengthLimitError>().is_some() {
            return ApiError::BadRequest(format!(
                "chunk size exceeds maximum {max_chunk_size}"
            ));
        }
        source = err.source();
    }
    ApiError::BadRequest(format!("failed to read request body: {e}"))
}

/// Create a new upload session.
///
/// `POST /v1/uploads`
#[instrument(skip(state, request))]
pub async fn begin_upload(
    State(state): State<AppState>,
    Json(request): Json<BeginUploadRequest>,
) -> ApiResult<(StatusCode, Json<BeginUploadResponse>)> {
    let outcome = state
        .uploader
        .begin_session(&request.file_name, request.declared_size)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(BeginUploadResponse {
            session_id: outcome.session_id.to_string(),
            file_id: outcome.file_id.to_string(),
            chunk_size_hint: outcome.chunk_size_hint,
            backend: outcome.backend,
        }),
    ))
}

/// Upload the bytes of one part (direct-ingestion backends).
///
/// `PUT /v1/uploads/{session_id}/parts/{part_number}`
#[instrument(skip(state, body))]
pub async fn upload_part(
    State(state): State<AppState>,
    Path((session_id, part_number)): Path<(String, u32)>,
    body: Body,
) -> ApiResult<Json<PartUploadAck>> {
    let session_id = parse_session_id(&session_id)?;

    // Read with headroom above the limit so slightly-over bodies reach the
    // strict check below and report their exact size.
    let max_chunk_size = state.config.server.max_chunk_size as usize;
    let data = axum::body::to_bytes(body, max_chunk_size + 1024)
        .await
        .map_err(|e| body_read_error(e, max_chunk_size))?;

    if data.len() > max_chunk_size {
        return Err(ApiError::BadRequest(format!(
            "chunk size {} exceeds maximum {}",
            data.len(),
            max_chunk_size
        )));
    }

    match state
        .uploader
        .accept_part(session_id, part_number, Some(data))
        .await?
    {
        PartAck::Stored { part_number, size } => Ok(Json(PartUploadAck { part_number, size })),
        PartAck::Authorized { .. } => Err(ApiError::Internal(
            "backend issued an upload URL for a direct part upload".to_string(),
        )),
    }
}

/// Request a presigned upload URL for one part (presigned-ingestion backends).
///
/// `POST /v1/uploads/{session_id}/parts/{part_number}/authorize`
#[instrument(skip(state))]
pub async fn authorize_part(
    State(state): State<AppState>,
    Path((session_id, part_number)): Path<(String, u32)>,
) -> ApiResult<Json<PartAuthorizeResponse>> {
    let session_id = parse_session_id(&session_id)?;

    match state
        .uploader
        .accept_part(session_id, part_number, None)
        .await?
    {
        PartAck::Authorized {
            part_number,
            upload_url,
            expires_in,
        } => Ok(Json(PartAuthorizeResponse {
            part_number,
            upload_url,
            expires_in_secs: expires_in.as_secs(),
        })),
        PartAck::Stored { .. } => Err(ApiError::Internal(
            "backend staged bytes for an authorization request".to_string(),
        )),
    }
}

/// Query the state of a live session.
///
/// `GET /v1/uploads/{session_id}`
#[instrument(skip(state))]
pub async fn get_upload(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionStateResponse>> {
    let session_id = parse_session_id(&session_id)?;
    let view = state.uploader.session_state(session_id).await?;

    Ok(Json(SessionStateResponse {
        state: view.state,
        file_id: view.file_id.to_string(),
        received_parts: view.received_parts,
        backend: view.backend,
    }))
}

/// Complete a session from a part manifest.
///
/// `POST /v1/uploads/{session_id}/complete`
#[instrument(skip(state, request))]
pub async fn complete_upload(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<CompleteUploadRequest>,
) -> ApiResult<Json<CompleteUploadResponse>> {
    let session_id = parse_session_id(&session_id)?;
    let row = state
        .uploader
        .complete_session(session_id, &request.manifest)
        .await?;

    Ok(Json(CompleteUploadResponse {
        file_id: row.file_id.to_string(),
        file_name: row.file_name,
        file_size: row.file_size.max(0) as u64,
        storage_key: row.storage_key,
        created_at: row.created_at,
    }))
}

/// Abort a session and discard its partial state.
///
/// `DELETE /v1/uploads/{session_id}`
#[instrument(skip(state))]
pub async fn abort_upload(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<StatusCode> {
    let session_id = parse_session_id(&session_id)?;
    state.uploader.abort_session(session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
