//! Upload orchestration error types.

use depot_core::{FileId, SessionId, SessionState};
use depot_metadata::MetadataError;
use depot_storage::StorageError;
use thiserror::Error;

fn incomplete_message(part: &Option<u32>) -> String {
    match part {
        Some(part) => format!("incomplete upload: part {part} is not available"),
        None => "incomplete upload: manifest names no parts".to_string(),
    }
}

/// Errors produced by the upload orchestrator and retrieval gateway.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("upload session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("file not found: {0}")]
    FileNotFound(FileId),

    #[error("invalid session state: expected {expected}, found {found}")]
    InvalidState {
        expected: &'static str,
        found: SessionState,
    },

    #[error("{}", incomplete_message(part))]
    IncompleteUpload { part: Option<u32> },

    #[error("backend error: {0}")]
    Backend(#[from] StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),
}

impl UploadError {
    /// Machine-readable reason code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::SessionNotFound(_) | Self::FileNotFound(_) => "not_found",
            Self::InvalidState { .. } => "invalid_state",
            Self::IncompleteUpload { .. } => "incomplete_upload",
            Self::Backend(_) => "backend_error",
            Self::Metadata(_) => "metadata_error",
        }
    }
}

/// Result type for upload operations.
pub type UploadResult<T> = std::result::Result<T, UploadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_distinct_per_category() {
        let errors: Vec<UploadError> = vec![
            UploadError::Validation("x".into()),
            UploadError::SessionNotFound(SessionId::new()),
            UploadError::InvalidState {
                expected: "created or receiving",
                found: SessionState::Done,
            },
            UploadError::IncompleteUpload { part: Some(2) },
            UploadError::Backend(StorageError::EmptyManifest),
            UploadError::Metadata(MetadataError::Internal("x".into())),
        ];
        let codes: Vec<&str> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(
            codes,
            vec![
                "validation_error",
                "not_found",
                "invalid_state",
                "incomplete_upload",
                "backend_error",
                "metadata_error"
            ]
        );
    }

    #[test]
    fn test_incomplete_upload_messages() {
        let missing = UploadError::IncompleteUpload { part: Some(4) };
        assert!(missing.to_string().contains("part 4"));

        let empty = UploadError::IncompleteUpload { part: None };
        assert!(empty.to_string().contains("no parts"));
    }
}
