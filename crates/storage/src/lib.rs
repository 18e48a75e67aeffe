//! Multipart storage abstraction and backends for Depot.
//!
//! This crate provides:
//! - The [`MultipartStore`] trait: begin / sink or authorize parts /
//!   finalize / abort / resolve downloads
//! - Backends: local filesystem (direct ingestion) and S3-compatible
//!   (presigned ingestion)

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, s3::S3Backend};
pub use error::{StorageError, StorageResult};
pub use traits::{
    ByteStream, Download, FinalizedObject, MultipartStore, OrderedPart, PartIngest, PartReceipt,
    UploadHandle,
};

use depot_core::config::StorageConfig;
use std::sync::Arc;

/// Create a multipart store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn MultipartStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::S3 {
            bucket,
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
        } => {
            let backend = S3Backend::new(
                bucket,
                endpoint.clone(),
                region.clone(),
                prefix.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
                *force_path_style,
            )
            .await?;
            Ok(Arc::new(backend))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use depot_core::FileId;
    use tempfile::tempdir;

    #[tokio::test]
    async fn from_config_filesystem_ok() {
        let temp = tempdir().unwrap();
        let config = StorageConfig::Filesystem {
            path: temp.path().join("store"),
        };

        let store = from_config(&config).await.unwrap();
        assert_eq!(store.backend_name(), "filesystem");
        assert_eq!(store.ingest(), PartIngest::Direct);

        let handle = store.begin(FileId::new(), 2).await.unwrap();
        let receipt = store
            .sink_part(&handle, 1, Bytes::from_static(b"hi"))
            .await
            .unwrap();
        assert_eq!(receipt.size, 2);
    }

    #[tokio::test]
    async fn from_config_s3_ok() {
        let config = StorageConfig::S3 {
            bucket: "bucket".to_string(),
            endpoint: Some("minio:9000".to_string()),
            region: Some("us-east-1".to_string()),
            prefix: Some("depot".to_string()),
            access_key_id: Some("access".to_string()),
            secret_access_key: Some("secret".to_string()),
            force_path_style: true,
        };

        let store = from_config(&config).await.unwrap();
        assert_eq!(store.backend_name(), "s3");
        assert_eq!(store.ingest(), PartIngest::Presigned);
    }

    #[tokio::test]
    async fn from_config_rejects_partial_credentials() {
        let config = StorageConfig::S3 {
            bucket: "bucket".to_string(),
            endpoint: None,
            region: None,
            prefix: None,
            access_key_id: Some("access".to_string()),
            secret_access_key: None,
            force_path_style: false,
        };

        match from_config(&config).await {
            Ok(_) => panic!("expected error"),
            Err(StorageError::Config(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
}
