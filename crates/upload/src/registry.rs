//! Registry of live upload sessions.

use crate::session::UploadSession;
use depot_core::SessionId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Map of live sessions.
///
/// Two locking levels: the outer map lock is held only for map lookups and
/// mutations, and each session carries its own `Mutex` so operations on
/// different sessions never contend. Operations on the same session
/// serialize on the per-session lock.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Arc<Mutex<UploadSession>>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new session.
    pub async fn insert(&self, session: UploadSession) -> Arc<Mutex<UploadSession>> {
        let session_id = session.session_id;
        let entry = Arc::new(Mutex::new(session));
        self.sessions.lock().await.insert(session_id, entry.clone());
        entry
    }

    /// Look up a live session.
    pub async fn get(&self, session_id: &SessionId) -> Option<Arc<Mutex<UploadSession>>> {
        self.sessions.lock().await.get(session_id).cloned()
    }

    /// Evict a session. Returns the entry if it was present.
    pub async fn remove(&self, session_id: &SessionId) -> Option<Arc<Mutex<UploadSession>>> {
        self.sessions.lock().await.remove(session_id)
    }

    /// Evict and return all live sessions.
    pub async fn drain_all(&self) -> Vec<Arc<Mutex<UploadSession>>> {
        self.sessions.lock().await.drain().map(|(_, v)| v).collect()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether the registry holds no sessions.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::FileId;
    use depot_storage::UploadHandle;

    fn sample_session() -> UploadSession {
        let file_id = FileId::new();
        UploadSession::new(
            "a.bin".to_string(),
            1,
            1,
            UploadHandle {
                file_id,
                key: format!("files/{file_id}"),
                token: String::new(),
            },
        )
    }

    #[tokio::test]
    async fn test_insert_get_remove() {
        let registry = SessionRegistry::new();
        assert!(registry.is_empty().await);

        let session = sample_session();
        let session_id = session.session_id;
        registry.insert(session).await;

        assert_eq!(registry.len().await, 1);
        assert!(registry.get(&session_id).await.is_some());

        assert!(registry.remove(&session_id).await.is_some());
        assert!(registry.get(&session_id).await.is_none());
        assert!(registry.remove(&session_id).await.is_none());
    }

    #[tokio::test]
    async fn test_drain_all_empties_registry() {
        let registry = SessionRegistry::new();
        registry.insert(sample_session()).await;
        registry.insert(sample_session()).await;

        let drained = registry.drain_all().await;
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty().await);
    }
}
