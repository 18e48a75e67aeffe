//! Retrieval gateway for completed files.

use crate::error::{UploadError, UploadResult};
use depot_core::FileId;
use depot_metadata::MetadataStore;
use depot_storage::{Download, MultipartStore, StorageError};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::instrument;

/// A completed file resolved for download.
#[derive(Debug)]
pub struct DownloadResolution {
    pub file_id: FileId,
    pub file_name: String,
    pub file_size: u64,
    pub created_at: OffsetDateTime,
    pub download: Download,
}

/// Thin read path: metadata lookup, then a fresh download reference from
/// the backend. Holds no state of its own.
pub struct RetrievalGateway {
    metadata: Arc<dyn MetadataStore>,
    store: Arc<dyn MultipartStore>,
}

impl RetrievalGateway {
    /// Create a new gateway.
    pub fn new(metadata: Arc<dyn MetadataStore>, store: Arc<dyn MultipartStore>) -> Self {
        Self { metadata, store }
    }

    /// Resolve a completed file for download.
    ///
    /// `ttl` bounds the validity of a presigned URL; it is ignored for
    /// streamed downloads. Each call produces a fresh reference, so expired
    /// URLs are never handed out twice.
    #[instrument(skip(self))]
    pub async fn resolve_download(
        &self,
        file_id: FileId,
        ttl: Duration,
    ) -> UploadResult<DownloadResolution> {
        let row = self
            .metadata
            .get_file(*file_id.as_uuid())
            .await?
            .ok_or(UploadError::FileNotFound(file_id))?;

        let download = self
            .store
            .resolve_download(&row.storage_key, ttl)
            .await
            .map_err(|e| match e {
                // The record exists but the object is gone; report the file,
                // not the internal key.
                StorageError::NotFound(_) => UploadError::FileNotFound(file_id),
                other => UploadError::Backend(other),
            })?;

        Ok(DownloadResolution {
            file_id,
            file_name: row.file_name,
            file_size: row.file_size.max(0) as u64,
            created_at: row.created_at,
            download,
        })
    }
}
