//! Local filesystem multipart backend.
//!
//! Parts are staged as individual files under `staging/{file_id}/` and
//! concatenated into `files/{file_id}` at finalize. Both writes go through
//! a temp-file-then-rename so a crash never leaves a half-written object
//! visible.

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    ByteStream, Download, FinalizedObject, MultipartStore, OrderedPart, PartIngest, PartReceipt,
    UploadHandle,
};
use async_trait::async_trait;
use bytes::Bytes;
use depot_core::{BackendKind, FileId};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Local filesystem multipart store.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend rooted at `root`.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Get the full path for a key, with path traversal protection.
    ///
    /// Keys are server-generated (`files/{uuid}`, `staging/{uuid}/part-N`)
    /// but stored keys flow back in from the metadata store, so every key is
    /// still validated before touching the filesystem.
    fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }

        for component in Path::new(key).components() {
            match component {
                std::path::Component::Normal(_) => {}
                _ => {
                    return Err(StorageError::InvalidKey(format!(
                        "contains unsafe path component: {key}"
                    )));
                }
            }
        }

        Ok(self.root.join(key))
    }

    fn part_file(&self, handle: &UploadHandle, part_number: u32) -> StorageResult<PathBuf> {
        self.key_path(&format!("{}/part-{:05}", handle.token, part_number))
    }

    /// Write `data` to `path` atomically: temp file with a unique name,
    /// fsync, rename.
    async fn write_atomic(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = path.with_extension(format!("tmp.{}", Uuid::new_v4()));
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
        }
        fs::rename(&temp_path, path).await?;
        Ok(())
    }
}

#[async_trait]
impl MultipartStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn begin(&self, file_id: FileId, _declared_size: u64) -> StorageResult<UploadHandle> {
        let token = format!("staging/{file_id}");
        let staging = self.key_path(&token)?;
        fs::create_dir_all(&staging).await?;

        Ok(UploadHandle {
            file_id,
            key: format!("files/{file_id}"),
            token,
        })
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn sink_part(
        &self,
        handle: &UploadHandle,
        part_number: u32,
        data: Bytes,
    ) -> StorageResult<PartReceipt> {
        let path = self.part_file(handle, part_number)?;
        let size = data.len() as u64;
        self.write_atomic(&path, &data).await?;

        Ok(PartReceipt { part_number, size })
    }

    async fn authorize_part(
        &self,
        _handle: &UploadHandle,
        _part_number: u32,
        _ttl: Duration,
    ) -> StorageResult<String> {
        Err(StorageError::Unsupported("authorize_part"))
    }

    #[instrument(skip(self, parts), fields(backend = "filesystem", parts = parts.len()))]
    async fn finalize(
        &self,
        handle: &UploadHandle,
        parts: &[OrderedPart],
    ) -> StorageResult<FinalizedObject> {
        if parts.is_empty() {
            return Err(StorageError::EmptyManifest);
        }

        let final_path = self.key_path(&handle.key)?;
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = final_path.with_extension(format!("tmp.{}", Uuid::new_v4()));
        let mut dest = fs::File::create(&temp_path).await?;
        let mut total: u64 = 0;

        for part in parts {
            let part_path = self.part_file(handle, part.part_number)?;
            let mut src = fs::File::open(&part_path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    StorageError::NotFound(format!(
                        "part {} of upload {}",
                        part.part_number, handle.file_id
                    ))
                } else {
                    StorageError::Io(e)
                }
            })?;
            total += tokio::io::copy(&mut src, &mut dest).await?;
        }

        dest.sync_all().await?;
        drop(dest);
        fs::rename(&temp_path, &final_path).await?;

        // Staged parts are no longer needed once the object is durable.
        if let Err(e) = fs::remove_dir_all(self.key_path(&handle.token)?).await {
            tracing::warn!(
                file_id = %handle.file_id,
                error = %e,
                "failed to remove staging directory after finalize"
            );
        }

        Ok(FinalizedObject {
            storage_key: handle.key.clone(),
            size: total,
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn abort(&self, handle: &UploadHandle) -> StorageResult<()> {
        match fs::remove_dir_all(self.key_path(&handle.token)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn resolve_download(
        &self,
        storage_key: &str,
        _ttl: Duration,
    ) -> StorageResult<Download> {
        use tokio::io::AsyncReadExt;

        let path = self.key_path(storage_key)?;
        let metadata = fs::metadata(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(storage_key.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        let size = metadata.len();

        let file = fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(storage_key.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;

        // Stream the file in chunks instead of loading it into memory
        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Download::Stream {
            stream: Box::pin(stream) as ByteStream,
            size,
        })
    }

    fn ingest(&self) -> PartIngest {
        PartIngest::Direct
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Filesystem
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}
