//! The upload orchestrator.
//!
//! Drives sessions through `Created -> Receiving -> Completing -> Done`
//! (with `Aborted` reachable from any non-terminal state) and owns the only
//! paths that touch the storage backend and the metadata store.

use crate::error::{UploadError, UploadResult};
use crate::registry::SessionRegistry;
use crate::session::{PartSlot, UploadSession};
use bytes::Bytes;
use depot_core::config::ServerConfig;
use depot_core::session::ManifestEntry;
use depot_core::{BackendKind, FileId, SessionId, SessionState};
use depot_metadata::{CompletedFileRow, MetadataError, MetadataStore};
use depot_storage::{MultipartStore, OrderedPart, PartIngest};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::instrument;

/// Limits and knobs the orchestrator enforces.
#[derive(Clone, Debug)]
pub struct UploadLimits {
    pub max_file_size: u64,
    pub chunk_size_hint: u64,
    /// Validity window for presigned part-upload URLs.
    pub part_url_ttl: Duration,
}

impl UploadLimits {
    /// Derive limits from server configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            chunk_size_hint: config.default_chunk_size,
            part_url_ttl: config.part_url_ttl(),
        }
    }
}

/// Outcome of creating a session.
#[derive(Clone, Debug)]
pub struct BeginOutcome {
    pub session_id: SessionId,
    pub file_id: FileId,
    pub chunk_size_hint: u64,
    pub backend: BackendKind,
}

/// Acknowledgement for an accepted part.
#[derive(Clone, Debug)]
pub enum PartAck {
    /// Bytes were staged in the backend (direct ingestion).
    Stored { part_number: u32, size: u64 },
    /// A presigned upload URL was issued (presigned ingestion).
    Authorized {
        part_number: u32,
        upload_url: String,
        expires_in: Duration,
    },
}

/// Introspection snapshot of a live session.
#[derive(Clone, Debug)]
pub struct SessionView {
    pub state: SessionState,
    pub file_id: FileId,
    pub received_parts: Vec<u32>,
    pub backend: BackendKind,
}

/// Orchestrates upload sessions against one storage backend and one
/// metadata store.
pub struct Uploader {
    registry: SessionRegistry,
    store: Arc<dyn MultipartStore>,
    metadata: Arc<dyn MetadataStore>,
    limits: UploadLimits,
}

impl Uploader {
    /// Create a new uploader.
    pub fn new(
        store: Arc<dyn MultipartStore>,
        metadata: Arc<dyn MetadataStore>,
        limits: UploadLimits,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(),
            store,
            metadata,
            limits,
        }
    }

    /// Create a new upload session.
    ///
    /// Validation happens before the backend is touched, and the session is
    /// registered only after the backend accepted the upload, so a failure
    /// at any point leaves nothing behind.
    #[instrument(skip(self))]
    pub async fn begin_session(
        &self,
        file_name: &str,
        declared_size: u64,
    ) -> UploadResult<BeginOutcome> {
        let file_name = file_name.trim();
        if file_name.is_empty() {
            return Err(UploadError::Validation(
                "file_name must not be empty".to_string(),
            ));
        }
        if declared_size == 0 {
            return Err(UploadError::Validation(
                "declared_size must be positive".to_string(),
            ));
        }
        if declared_size > self.limits.max_file_size {
            return Err(UploadError::Validation(format!(
                "declared_size {} exceeds maximum {}",
                declared_size, self.limits.max_file_size
            )));
        }

        let file_id = FileId::new();
        let handle = self.store.begin(file_id, declared_size).await?;

        let session = UploadSession::new(
            file_name.to_string(),
            declared_size,
            self.limits.chunk_size_hint,
            handle,
        );
        let session_id = session.session_id;
        self.registry.insert(session).await;

        tracing::info!(
            session_id = %session_id,
            file_id = %file_id,
            declared_size,
            backend = self.store.backend_name(),
            "upload session created"
        );

        Ok(BeginOutcome {
            session_id,
            file_id,
            chunk_size_hint: self.limits.chunk_size_hint,
            backend: self.store.kind(),
        })
    }

    /// Accept one part for a session.
    ///
    /// For direct backends `data` carries the part bytes and they are staged
    /// immediately; for presigned backends `data` must be absent and the
    /// acknowledgement carries an upload URL instead. Re-sending a part
    /// number replaces the earlier part.
    #[instrument(skip(self, data), fields(size = data.as_ref().map(Bytes::len)))]
    pub async fn accept_part(
        &self,
        session_id: SessionId,
        part_number: u32,
        data: Option<Bytes>,
    ) -> UploadResult<PartAck> {
        if part_number == 0 {
            return Err(UploadError::Validation(
                "part numbers start at 1".to_string(),
            ));
        }

        let entry = self
            .registry
            .get(&session_id)
            .await
            .ok_or(UploadError::SessionNotFound(session_id))?;
        let mut session = entry.lock().await;

        if !session.state.is_active() {
            return Err(UploadError::InvalidState {
                expected: "created or receiving",
                found: session.state,
            });
        }

        match self.store.ingest() {
            PartIngest::Direct => {
                let data = data.ok_or_else(|| {
                    UploadError::Validation(
                        "this backend requires part bytes in the request".to_string(),
                    )
                })?;

                let receipt = self
                    .store
                    .sink_part(&session.handle, part_number, data)
                    .await?;

                session.state = SessionState::Receiving;
                session.parts.insert(
                    part_number,
                    PartSlot::Staged {
                        size: receipt.size,
                    },
                );

                Ok(PartAck::Stored {
                    part_number,
                    size: receipt.size,
                })
            }
            PartIngest::Presigned => {
                if data.is_some() {
                    return Err(UploadError::Validation(
                        "this backend accepts part bytes only via authorized upload URLs"
                            .to_string(),
                    ));
                }

                let upload_url = self
                    .store
                    .authorize_part(&session.handle, part_number, self.limits.part_url_ttl)
                    .await?;

                session.state = SessionState::Receiving;
                session.parts.insert(
                    part_number,
                    PartSlot::Authorized {
                        issued_at: OffsetDateTime::now_utc(),
                    },
                );

                Ok(PartAck::Authorized {
                    part_number,
                    upload_url,
                    expires_in: self.limits.part_url_ttl,
                })
            }
        }
    }

    /// Complete a session: assemble the manifested parts into the final
    /// object, record it, and evict the session.
    ///
    /// The manifest may list parts in any order and may repeat part numbers;
    /// duplicates resolve last-entry-wins and assembly is always in
    /// ascending part-number order. A failed attempt leaves the session in
    /// `Completing`, from where completion can be retried or the session
    /// aborted.
    #[instrument(skip(self, manifest), fields(manifest_len = manifest.len()))]
    pub async fn complete_session(
        &self,
        session_id: SessionId,
        manifest: &[ManifestEntry],
    ) -> UploadResult<CompletedFileRow> {
        let entry = self
            .registry
            .get(&session_id)
            .await
            .ok_or(UploadError::SessionNotFound(session_id))?;
        let mut session = entry.lock().await;

        match session.state {
            SessionState::Created | SessionState::Receiving | SessionState::Completing => {}
            found => {
                return Err(UploadError::InvalidState {
                    expected: "created, receiving, or completing",
                    found,
                });
            }
        }

        if manifest.is_empty() {
            return Err(UploadError::IncompleteUpload { part: None });
        }

        // Dedupe last-entry-wins; the BTreeMap then yields ascending order.
        let mut wanted: BTreeMap<u32, Option<String>> = BTreeMap::new();
        for item in manifest {
            if item.part_number == 0 {
                return Err(UploadError::Validation(
                    "part numbers start at 1".to_string(),
                ));
            }
            wanted.insert(item.part_number, item.etag.clone());
        }

        // Every manifested part must be confirmed before anything mutates:
        // staged bytes for direct backends, an etag for presigned ones.
        match self.store.ingest() {
            PartIngest::Direct => {
                for &part_number in wanted.keys() {
                    if !matches!(session.parts.get(&part_number), Some(PartSlot::Staged { .. })) {
                        return Err(UploadError::IncompleteUpload {
                            part: Some(part_number),
                        });
                    }
                }
            }
            PartIngest::Presigned => {
                for (&part_number, etag) in &wanted {
                    if etag.is_none() {
                        return Err(UploadError::IncompleteUpload {
                            part: Some(part_number),
                        });
                    }
                }
            }
        }

        session.state = SessionState::Completing;

        let finalized = match &session.finalized {
            // A previous attempt already assembled the object; only the
            // metadata write is outstanding.
            Some(finalized) => finalized.clone(),
            None => {
                let ordered: Vec<OrderedPart> = wanted
                    .iter()
                    .map(|(&part_number, etag)| OrderedPart {
                        part_number,
                        etag: etag.clone(),
                    })
                    .collect();

                // On failure the session stays in Completing and every staged
                // part survives, so the caller can retry.
                let finalized = self.store.finalize(&session.handle, &ordered).await?;
                session.finalized = Some(finalized.clone());
                finalized
            }
        };

        let row = CompletedFileRow {
            file_id: *session.file_id().as_uuid(),
            file_name: session.file_name.clone(),
            file_size: i64::try_from(finalized.size).unwrap_or(i64::MAX),
            storage_key: finalized.storage_key.clone(),
            download_url: None,
            created_at: OffsetDateTime::now_utc(),
        };

        match self.metadata.put_file(&row).await {
            Ok(()) => {}
            // A retried completion whose first attempt lost only the
            // acknowledgement: the record is already durable.
            Err(MetadataError::AlreadyExists(_)) => {}
            Err(e) => return Err(e.into()),
        }

        session.state = SessionState::Done;
        session.parts.clear();
        self.registry.remove(&session_id).await;

        tracing::info!(
            session_id = %session_id,
            file_id = %row.file_id,
            file_size = row.file_size,
            "upload session completed"
        );

        Ok(row)
    }

    /// Abort a session: mark it, evict it, and discard backend state.
    ///
    /// The backend cleanup is best-effort; the session is gone either way,
    /// and a second abort reports the session as not found.
    #[instrument(skip(self))]
    pub async fn abort_session(&self, session_id: SessionId) -> UploadResult<()> {
        let entry = self
            .registry
            .get(&session_id)
            .await
            .ok_or(UploadError::SessionNotFound(session_id))?;
        let mut session = entry.lock().await;

        if session.state.is_terminal() {
            return Err(UploadError::InvalidState {
                expected: "an unfinished session",
                found: session.state,
            });
        }

        session.state = SessionState::Aborted;
        session.parts.clear();
        self.registry.remove(&session_id).await;

        let handle = session.handle.clone();
        drop(session);

        if let Err(e) = self.store.abort(&handle).await {
            tracing::warn!(
                session_id = %session_id,
                error = %e,
                "failed to discard backend state for aborted session"
            );
        }

        tracing::info!(session_id = %session_id, "upload session aborted");
        Ok(())
    }

    /// Snapshot a live session for introspection.
    pub async fn session_state(&self, session_id: SessionId) -> UploadResult<SessionView> {
        let entry = self
            .registry
            .get(&session_id)
            .await
            .ok_or(UploadError::SessionNotFound(session_id))?;
        let session = entry.lock().await;

        Ok(SessionView {
            state: session.state,
            file_id: session.file_id(),
            received_parts: session.received_parts(),
            backend: self.store.kind(),
        })
    }

    /// Abort every live session. Used at shutdown.
    pub async fn drain(&self) {
        let entries = self.registry.drain_all().await;
        if entries.is_empty() {
            return;
        }

        tracing::info!(count = entries.len(), "draining live upload sessions");
        for entry in entries {
            let mut session = entry.lock().await;
            if session.state.is_terminal() {
                continue;
            }
            session.state = SessionState::Aborted;
            let handle = session.handle.clone();
            drop(session);

            if let Err(e) = self.store.abort(&handle).await {
                tracing::warn!(error = %e, "failed to discard backend state during drain");
            }
        }
    }

    /// Number of live sessions.
    pub async fn live_sessions(&self) -> usize {
        self.registry.len().await
    }
}
