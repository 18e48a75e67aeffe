//! Completed-file retrieval handlers.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Redirect, Response};
use depot_core::FileId;
use depot_core::session::{DownloadReference, DownloadResponse};
use depot_storage::Download;
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    /// Validity of a presigned download URL, in seconds. Defaults to the
    /// configured TTL; ignored for streamed downloads.
    pub ttl_secs: Option<u64>,
}

fn parse_file_id(raw: &str) -> ApiResult<FileId> {
    FileId::parse(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn download_ttl(state: &AppState, query: &DownloadQuery) -> Duration {
    query
        .ttl_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| state.config.server.download_url_ttl())
}

/// Filenames land in a Content-Disposition header; strip anything that
/// could break out of the quoted value.
fn content_disposition(file_name: &str) -> String {
    let sanitized: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' | '\r' | '\n' => '_',
            c => c,
        })
        .collect();
    format!("attachment; filename=\"{sanitized}\"")
}

/// Resolve a completed file into a download reference.
///
/// `GET /v1/files/{file_id}`
#[instrument(skip(state))]
pub async fn resolve_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Json<DownloadResponse>> {
    let file_id = parse_file_id(&file_id)?;
    let ttl = download_ttl(&state, &query);
    let resolution = state.gateway.resolve_download(file_id, ttl).await?;

    let download = match resolution.download {
        Download::Url(url) => DownloadReference::Url { url },
        Download::Stream { .. } => DownloadReference::Stream {
            href: format!("/v1/files/{file_id}/content"),
        },
    };

    Ok(Json(DownloadResponse {
        file_id: resolution.file_id.to_string(),
        file_name: resolution.file_name,
        file_size: resolution.file_size,
        created_at: resolution.created_at,
        download,
    }))
}

/// Serve the bytes of a completed file.
///
/// Streams directly for filesystem-backed files; redirects to a fresh
/// presigned URL for S3-backed files.
///
/// `GET /v1/files/{file_id}/content`
#[instrument(skip(state))]
pub async fn download_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let file_id = parse_file_id(&file_id)?;
    let ttl = download_ttl(&state, &query);
    let resolution = state.gateway.resolve_download(file_id, ttl).await?;

    match resolution.download {
        Download::Stream { stream, size } => {
            let response = Response::builder()
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .header(header::CONTENT_LENGTH, size)
                .header(
                    header::CONTENT_DISPOSITION,
                    content_disposition(&resolution.file_name),
                )
                .body(Body::from_stream(stream))
                .map_err(|e| ApiError::Internal(format!("failed to build response: {e}")))?;
            Ok(response)
        }
        Download::Url(url) => Ok(Redirect::temporary(&url).into_response()),
    }
}
