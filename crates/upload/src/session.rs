//! In-memory upload session state.

use depot_core::{FileId, SessionId, SessionState};
use depot_storage::{FinalizedObject, UploadHandle};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// What is known about one accepted part.
#[derive(Clone, Debug)]
pub enum PartSlot {
    /// Bytes were staged in the backend (direct ingestion).
    Staged { size: u64 },
    /// A presigned upload URL was issued; the bytes live client-side until
    /// the completion manifest confirms them with an etag.
    Authorized { issued_at: OffsetDateTime },
}

/// An in-progress upload session.
///
/// The part map is a `BTreeMap` keyed by part number, so iteration is always
/// in ascending part order regardless of arrival order.
#[derive(Debug)]
pub struct UploadSession {
    pub session_id: SessionId,
    pub file_name: String,
    pub declared_size: u64,
    pub chunk_size_hint: u64,
    /// Backend-side handle opened at session creation.
    pub handle: UploadHandle,
    pub state: SessionState,
    pub parts: BTreeMap<u32, PartSlot>,
    /// Memo of a successful backend finalize, so a completion retried after a
    /// metadata failure does not re-run the backend assembly.
    pub finalized: Option<FinalizedObject>,
    pub created_at: OffsetDateTime,
}

impl UploadSession {
    /// Create a new session around a freshly opened backend handle.
    pub fn new(
        file_name: String,
        declared_size: u64,
        chunk_size_hint: u64,
        handle: UploadHandle,
    ) -> Self {
        Self {
            session_id: SessionId::new(),
            file_name,
            declared_size,
            chunk_size_hint,
            handle,
            state: SessionState::Created,
            parts: BTreeMap::new(),
            finalized: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// The file ID this session will complete into.
    pub fn file_id(&self) -> FileId {
        self.handle.file_id
    }

    /// Part numbers accepted so far, ascending.
    pub fn received_parts(&self) -> Vec<u32> {
        self.parts.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session() -> UploadSession {
        let file_id = FileId::new();
        UploadSession::new(
            "video.mp4".to_string(),
            1024,
            256,
            UploadHandle {
                file_id,
                key: format!("files/{file_id}"),
                token: format!("staging/{file_id}"),
            },
        )
    }

    #[test]
    fn test_new_session_starts_created() {
        let session = sample_session();
        assert_eq!(session.state, SessionState::Created);
        assert!(session.parts.is_empty());
        assert!(session.finalized.is_none());
    }

    #[test]
    fn test_received_parts_sorted_regardless_of_insert_order() {
        let mut session = sample_session();
        for part in [7, 2, 9, 1] {
            session.parts.insert(part, PartSlot::Staged { size: 1 });
        }
        assert_eq!(session.received_parts(), vec![1, 2, 7, 9]);
    }
}
