use async_trait::async_trait;
use bytes::Bytes;
use depot_core::{BackendKind, FileId};
use depot_storage::{
    Download, FinalizedObject, MultipartStore, OrderedPart, PartIngest, PartReceipt, UploadHandle,
};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Mock presigned backend that hands out deterministic upload URLs and
/// records every finalize and abort call, so tests can assert exactly what
/// the orchestrator forwarded.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct MockPresignedStore {
    /// One entry per finalize call, with the parts exactly as received.
    pub finalize_calls: Mutex<Vec<Vec<OrderedPart>>>,
    pub abort_calls: AtomicUsize,
}

#[allow(dead_code)]
impl MockPresignedStore {
    pub fn new() -> Self {
        Self {
            finalize_calls: Mutex::new(Vec::new()),
            abort_calls: AtomicUsize::new(0),
        }
    }

    pub fn finalized_parts(&self) -> Vec<Vec<OrderedPart>> {
        self.finalize_calls.lock().unwrap().clone()
    }

    pub fn aborts(&self) -> usize {
        self.abort_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MultipartStore for MockPresignedStore {
    async fn begin(&self, file_id: FileId, _declared_size: u64) -> depot_storage::StorageResult<UploadHandle> {
        Ok(UploadHandle {
            file_id,
            key: format!("files/{file_id}"),
            token: format!("upload-{file_id}"),
        })
    }

    async fn sink_part(
        &self,
        _handle: &UploadHandle,
        _part_number: u32,
        _data: Bytes,
    ) -> depot_storage::StorageResult<PartReceipt> {
        Err(depot_storage::StorageError::Unsupported("sink_part"))
    }

    async fn authorize_part(
        &self,
        handle: &UploadHandle,
        part_number: u32,
        ttl: Duration,
    ) -> depot_storage::StorageResult<String> {
        Ok(format!(
            "https://mock.example/{}/{}?part={}&expires={}",
            handle.key,
            handle.token,
            part_number,
            ttl.as_secs()
        ))
    }

    async fn finalize(
        &self,
        handle: &UploadHandle,
        parts: &[OrderedPart],
    ) -> depot_storage::StorageResult<FinalizedObject> {
        if parts.is_empty() {
            return Err(depot_storage::StorageError::EmptyManifest);
        }
        for part in parts {
            if part.etag.is_none() {
                return Err(depot_storage::StorageError::MissingEtag(part.part_number));
            }
        }

        self.finalize_calls.lock().unwrap().push(parts.to_vec());

        Ok(FinalizedObject {
            storage_key: handle.key.clone(),
            size: parts.len() as u64 * 100,
        })
    }

    async fn abort(&self, _handle: &UploadHandle) -> depot_storage::StorageResult<()> {
        self.abort_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn resolve_download(
        &self,
        storage_key: &str,
        ttl: Duration,
    ) -> depot_storage::StorageResult<Download> {
        Ok(Download::Url(format!(
            "https://mock.example/get/{}?expires={}",
            storage_key,
            ttl.as_secs()
        )))
    }

    fn ingest(&self) -> PartIngest {
        PartIngest::Presigned
    }

    fn kind(&self) -> BackendKind {
        BackendKind::S3
    }

    fn backend_name(&self) -> &'static str {
        "mock-presigned"
    }

    async fn health_check(&self) -> depot_storage::StorageResult<()> {
        Ok(())
    }
}
