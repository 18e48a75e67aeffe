//! The multipart storage abstraction.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use depot_core::{BackendKind, FileId};
use futures::Stream;
use std::pin::Pin;
use std::time::Duration;

/// Stream of bytes from storage.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// How a backend takes in part bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartIngest {
    /// Parts are written through the server (`sink_part`).
    Direct,
    /// Parts are uploaded by the client against presigned URLs
    /// (`authorize_part`).
    Presigned,
}

/// Backend-side handle for an in-progress multipart upload.
///
/// `token` is backend-specific: the staging directory key for the filesystem
/// backend, the multipart upload ID for S3.
#[derive(Clone, Debug)]
pub struct UploadHandle {
    pub file_id: FileId,
    /// Key the assembled object will live under.
    pub key: String,
    pub token: String,
}

/// Receipt for a directly sunk part.
#[derive(Clone, Debug)]
pub struct PartReceipt {
    pub part_number: u32,
    pub size: u64,
}

/// One part of a finalize call, already deduplicated and sorted ascending
/// by part number.
#[derive(Clone, Debug)]
pub struct OrderedPart {
    pub part_number: u32,
    /// Integrity token for presigned backends; `None` for direct backends.
    pub etag: Option<String>,
}

/// The durable object produced by a successful finalize.
#[derive(Clone, Debug)]
pub struct FinalizedObject {
    pub storage_key: String,
    pub size: u64,
}

/// A resolved download for a completed file.
pub enum Download {
    /// Bytes streamed through the server.
    Stream { stream: ByteStream, size: u64 },
    /// Time-limited URL the client fetches directly.
    Url(String),
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Download::Stream { size, .. } => f
                .debug_struct("Stream")
                .field("size", size)
                .finish_non_exhaustive(),
            Download::Url(url) => f.debug_tuple("Url").field(url).finish(),
        }
    }
}

/// Multipart storage backend.
///
/// Each backend supports exactly one ingestion shape, reported by
/// [`MultipartStore::ingest`]; calling the other variant's operation returns
/// `StorageError::Unsupported`.
#[async_trait]
pub trait MultipartStore: Send + Sync + 'static {
    /// Open a multipart upload for a new file.
    async fn begin(&self, file_id: FileId, declared_size: u64) -> StorageResult<UploadHandle>;

    /// Stage the bytes of one part. Re-sending a part number overwrites the
    /// previous bytes. Direct backends only.
    async fn sink_part(
        &self,
        handle: &UploadHandle,
        part_number: u32,
        data: Bytes,
    ) -> StorageResult<PartReceipt>;

    /// Issue a presigned upload URL for one part. Presigned backends only.
    async fn authorize_part(
        &self,
        handle: &UploadHandle,
        part_number: u32,
        ttl: Duration,
    ) -> StorageResult<String>;

    /// Assemble the named parts, in the given (ascending) order, into the
    /// final object. On failure no final object becomes visible and the
    /// upload stays open for a retry.
    async fn finalize(
        &self,
        handle: &UploadHandle,
        parts: &[OrderedPart],
    ) -> StorageResult<FinalizedObject>;

    /// Discard all partial state for an upload. Idempotent.
    async fn abort(&self, handle: &UploadHandle) -> StorageResult<()>;

    /// Resolve a completed file for download.
    async fn resolve_download(&self, storage_key: &str, ttl: Duration)
    -> StorageResult<Download>;

    /// Which ingestion shape this backend supports.
    fn ingest(&self) -> PartIngest;

    /// Backend family for wire responses.
    fn kind(&self) -> BackendKind;

    /// Backend name for logging and diagnostics.
    fn backend_name(&self) -> &'static str;

    /// Check backend connectivity and health.
    async fn health_check(&self) -> StorageResult<()>;
}
