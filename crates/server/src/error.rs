//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use depot_upload::UploadError;
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("storage error: {0}")]
    Storage(#[from] depot_storage::StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] depot_metadata::MetadataError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Upload(e) => e.code(),
            Self::Storage(_) => "backend_error",
            Self::Metadata(_) => "metadata_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upload(e) => match e {
                UploadError::Validation(_) => StatusCode::BAD_REQUEST,
                UploadError::SessionNotFound(_) | UploadError::FileNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                UploadError::InvalidState { .. } => StatusCode::CONFLICT,
                UploadError::IncompleteUpload { .. } => StatusCode::BAD_REQUEST,
                UploadError::Backend(_) => StatusCode::BAD_GATEWAY,
                UploadError::Metadata(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Storage(_) => StatusCode::BAD_GATEWAY,
            Self::Metadata(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::{SessionId, SessionState};

    #[test]
    fn test_upload_error_codes_pass_through() {
        let err = ApiError::from(UploadError::SessionNotFound(SessionId::new()));
        assert_eq!(err.code(), "not_found");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = ApiError::from(UploadError::InvalidState {
            expected: "created or receiving",
            found: SessionState::Done,
        });
        assert_eq!(err.code(), "invalid_state");
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let err = ApiError::from(UploadError::IncompleteUpload { part: Some(3) });
        assert_eq!(err.code(), "incomplete_upload");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
