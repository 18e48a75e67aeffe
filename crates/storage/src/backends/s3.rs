//! S3-compatible multipart backend using the AWS SDK.
//!
//! Part ingestion is presigned: clients upload part bytes directly against
//! URLs issued by `authorize_part`, and the etags S3 returned to them come
//! back in the completion manifest. Every control-plane call is bounded by
//! an operation timeout so a wedged endpoint cannot hang a session forever.

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    Download, FinalizedObject, MultipartStore, OrderedPart, PartIngest, PartReceipt, UploadHandle,
};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_smithy_http_client::Builder as SmithyHttpClientBuilder;
use bytes::Bytes;
use depot_core::{BackendKind, FileId};
use std::future::Future;
use std::time::Duration;
use tracing::instrument;

/// Upper bound for any single S3 control-plane call.
const OP_TIMEOUT: Duration = Duration::from_secs(30);

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

async fn with_timeout<T, F>(op: &'static str, fut: F) -> StorageResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    tokio::time::timeout(OP_TIMEOUT, fut)
        .await
        .map_err(|_| StorageError::Timeout(op))?
}

fn map_s3_operation_error<E>(err: aws_sdk_s3::error::SdkError<E>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StorageError::S3(Box::new(err))
}

/// S3-compatible multipart store.
pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl std::fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl S3Backend {
    /// Create a new S3 backend.
    ///
    /// # Arguments
    /// * `force_path_style` - Use path-style URLs (`endpoint/bucket/key`)
    ///   instead of virtual-hosted style. Required for MinIO and some
    ///   S3-compatible services; AWS S3 requires virtual-hosted style (false).
    pub async fn new(
        bucket: &str,
        endpoint: Option<String>,
        region: Option<String>,
        prefix: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        force_path_style: bool,
    ) -> StorageResult<Self> {
        if access_key_id.is_some() ^ secret_access_key.is_some() {
            return Err(StorageError::Config(
                "s3 config requires both access_key_id and secret_access_key when either is set"
                    .to_string(),
            ));
        }

        let resolved_region = region.unwrap_or_else(|| "us-east-1".to_string());
        let mut s3_config_builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_config::Region::new(resolved_region.clone()));

        // Explicit credentials from config, or the ambient AWS credential chain
        if let (Some(key_id), Some(secret)) = (access_key_id, secret_access_key) {
            let credentials = Credentials::new(key_id, secret, None, None, "depot-config");
            s3_config_builder = s3_config_builder.credentials_provider(credentials);
        } else {
            let chain = aws_config::default_provider::credentials::DefaultCredentialsChain::builder()
                .region(aws_config::Region::new(resolved_region.clone()))
                .build()
                .await;
            s3_config_builder = s3_config_builder.credentials_provider(chain);
        }

        if let Some(endpoint_url) = endpoint {
            // Handle bare host:port endpoints (e.g., "minio:9000") by prepending http://
            let endpoint_lower = endpoint_url.to_lowercase();
            let normalized = if endpoint_lower.starts_with("http://")
                || endpoint_lower.starts_with("https://")
            {
                endpoint_url
            } else {
                format!("http://{endpoint_url}")
            };

            // For explicit HTTP endpoints (e.g. local MinIO), use an HTTP-only
            // client so SDK initialization doesn't depend on native trust roots.
            if normalized.to_ascii_lowercase().starts_with("http://") {
                s3_config_builder =
                    s3_config_builder.http_client(SmithyHttpClientBuilder::new().build_http());
            }

            s3_config_builder = s3_config_builder.endpoint_url(normalized);
        }

        if force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = Client::from_conf(s3_config_builder.build());

        // Strip trailing slashes to avoid double-slash keys like "prefix//key"
        let normalized_prefix = prefix.map(|p| p.trim_end_matches('/').to_string());

        Ok(Self {
            client,
            bucket: bucket.to_string(),
            prefix: normalized_prefix,
        })
    }

    /// Get the full object key for a key (applies prefix if configured).
    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key.to_string(),
        }
    }

    /// Convert an AWS SDK error to StorageError, mapping NotFound appropriately.
    fn map_sdk_error<E>(err: aws_sdk_s3::error::SdkError<E>, key: &str) -> StorageError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        if let aws_sdk_s3::error::SdkError::ServiceError(ref service_err) = err
            && service_err.raw().status().as_u16() == 404
        {
            return StorageError::NotFound(key.to_string());
        }
        map_s3_operation_error(err)
    }
}

#[async_trait]
impl MultipartStore for S3Backend {
    #[instrument(skip(self), fields(backend = "s3"))]
    async fn begin(&self, file_id: FileId, _declared_size: u64) -> StorageResult<UploadHandle> {
        let key = format!("files/{file_id}");
        let full_key = self.full_key(&key);

        let output = with_timeout("create_multipart_upload", async {
            self.client
                .create_multipart_upload()
                .bucket(&self.bucket)
                .key(&full_key)
                .send()
                .await
                .map_err(map_s3_operation_error)
        })
        .await?;

        let upload_id = output
            .upload_id()
            .ok_or_else(|| StorageError::Config("S3 did not return upload_id".to_string()))?
            .to_string();

        Ok(UploadHandle {
            file_id,
            key,
            token: upload_id,
        })
    }

    async fn sink_part(
        &self,
        _handle: &UploadHandle,
        _part_number: u32,
        _data: Bytes,
    ) -> StorageResult<PartReceipt> {
        Err(StorageError::Unsupported("sink_part"))
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn authorize_part(
        &self,
        handle: &UploadHandle,
        part_number: u32,
        ttl: Duration,
    ) -> StorageResult<String> {
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| StorageError::Config(format!("invalid presign expiry: {e}")))?;

        let presigned = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(self.full_key(&handle.key))
            .upload_id(&handle.token)
            .part_number(part_number as i32)
            .presigned(presigning)
            .await
            .map_err(map_s3_operation_error)?;

        Ok(presigned.uri().to_string())
    }

    #[instrument(skip(self, parts), fields(backend = "s3", parts = parts.len()))]
    async fn finalize(
        &self,
        handle: &UploadHandle,
        parts: &[OrderedPart],
    ) -> StorageResult<FinalizedObject> {
        if parts.is_empty() {
            return Err(StorageError::EmptyManifest);
        }

        let mut completed = Vec::with_capacity(parts.len());
        for part in parts {
            let etag = part
                .etag
                .as_ref()
                .ok_or(StorageError::MissingEtag(part.part_number))?;
            completed.push(
                CompletedPart::builder()
                    .part_number(part.part_number as i32)
                    .e_tag(etag)
                    .build(),
            );
        }

        let full_key = self.full_key(&handle.key);
        let upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed))
            .build();

        with_timeout("complete_multipart_upload", async {
            self.client
                .complete_multipart_upload()
                .bucket(&self.bucket)
                .key(&full_key)
                .upload_id(&handle.token)
                .multipart_upload(upload)
                .send()
                .await
                .map_err(map_s3_operation_error)
        })
        .await?;

        // S3 does not report the assembled size in the completion response
        let head = with_timeout("head_object", async {
            self.client
                .head_object()
                .bucket(&self.bucket)
                .key(&full_key)
                .send()
                .await
                .map_err(|e| Self::map_sdk_error(e, &handle.key))
        })
        .await?;

        Ok(FinalizedObject {
            storage_key: handle.key.clone(),
            size: head.content_length().unwrap_or(0) as u64,
        })
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn abort(&self, handle: &UploadHandle) -> StorageResult<()> {
        let full_key = self.full_key(&handle.key);

        let result = with_timeout("abort_multipart_upload", async {
            self.client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(&full_key)
                .upload_id(&handle.token)
                .send()
                .await
                .map_err(|e| Self::map_sdk_error(e, &handle.key))
        })
        .await;

        match result {
            Ok(_) => Ok(()),
            // Already aborted or completed: nothing left to discard
            Err(StorageError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn resolve_download(
        &self,
        storage_key: &str,
        ttl: Duration,
    ) -> StorageResult<Download> {
        let full_key = self.full_key(storage_key);

        // Confirm the object exists so a stale metadata record surfaces as
        // NotFound instead of a URL that 404s later.
        with_timeout("head_object", async {
            self.client
                .head_object()
                .bucket(&self.bucket)
                .key(&full_key)
                .send()
                .await
                .map_err(|e| Self::map_sdk_error(e, storage_key))
        })
        .await?;

        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| StorageError::Config(format!("invalid presign expiry: {e}")))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .presigned(presigning)
            .await
            .map_err(|e| Self::map_sdk_error(e, storage_key))?;

        Ok(Download::Url(presigned.uri().to_string()))
    }

    fn ingest(&self) -> PartIngest {
        PartIngest::Presigned
    }

    fn kind(&self) -> BackendKind {
        BackendKind::S3
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn health_check(&self) -> StorageResult<()> {
        let marker_key = self.full_key(".depot-health-check");

        let health_check_future = async {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&marker_key)
                .body(Bytes::from_static(b"health-check").into())
                .send()
                .await
                .map_err(map_s3_operation_error)?;

            match self
                .client
                .delete_object()
                .bucket(&self.bucket)
                .key(&marker_key)
                .send()
                .await
            {
                Ok(_) => {}
                Err(e) => {
                    if let aws_sdk_s3::error::SdkError::ServiceError(ref se) = e
                        && se.raw().status().as_u16() != 404
                    {
                        return Err(map_s3_operation_error(e));
                    }
                }
            }

            Ok(())
        };

        tokio::time::timeout(HEALTH_CHECK_TIMEOUT, health_check_future)
            .await
            .map_err(|_| StorageError::Timeout("health_check"))?
    }
}
