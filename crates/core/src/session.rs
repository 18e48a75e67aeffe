//! Upload session lifecycle types and wire DTOs.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Upload session state.
///
/// Transitions: `Created -> Receiving -> Completing -> Done`, with `Aborted`
/// reachable from any non-terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Session exists but no part has been accepted yet.
    Created,
    /// At least one part has been accepted or authorized.
    Receiving,
    /// Finalization is in progress or a previous attempt failed retryably.
    Completing,
    /// The file was assembled and its metadata record written.
    Done,
    /// The session was explicitly abandoned.
    Aborted,
}

impl SessionState {
    /// Check if the session can still accept parts.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Created | Self::Receiving)
    }

    /// Check if the session reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Receiving => "receiving",
            Self::Completing => "completing",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Which storage backend family a session is bound to.
///
/// Determines the part ingestion shape: filesystem sessions take part bytes
/// directly, S3 sessions hand out presigned upload URLs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Filesystem,
    S3,
}

/// Request to create an upload session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BeginUploadRequest {
    /// Display name for the uploaded file.
    pub file_name: String,
    /// Declared total size in bytes. Must be positive and within the
    /// configured ceiling.
    pub declared_size: u64,
}

/// Response from creating an upload session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BeginUploadResponse {
    /// The new session ID.
    pub session_id: String,
    /// The file ID the completed upload will be retrievable under.
    pub file_id: String,
    /// Recommended part size in bytes.
    pub chunk_size_hint: u64,
    /// Backend family the session is bound to.
    pub backend: BackendKind,
}

/// Acknowledgement for a directly uploaded part.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartUploadAck {
    pub part_number: u32,
    /// Size of the staged part in bytes.
    pub size: u64,
}

/// Response carrying a presigned upload URL for one part.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartAuthorizeResponse {
    pub part_number: u32,
    /// URL the client must PUT the part bytes to.
    pub upload_url: String,
    /// How long the URL stays valid, in seconds.
    pub expires_in_secs: u64,
}

/// One entry in a completion manifest.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// 1-based part number.
    pub part_number: u32,
    /// Integrity token returned by the backend for presigned part uploads.
    /// Required for S3 sessions, ignored for filesystem sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

/// Request to complete an upload session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompleteUploadRequest {
    /// Parts forming the file, in any order. Duplicate part numbers are
    /// resolved last-entry-wins; assembly is always in ascending order.
    pub manifest: Vec<ManifestEntry>,
}

/// Response from completing an upload session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompleteUploadResponse {
    pub file_id: String,
    pub file_name: String,
    /// Assembled size in bytes.
    pub file_size: u64,
    /// Backend key the assembled object lives under.
    pub storage_key: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Response from querying session state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionStateResponse {
    pub state: SessionState,
    pub file_id: String,
    /// Part numbers accepted so far, ascending.
    pub received_parts: Vec<u32>,
    pub backend: BackendKind,
}

/// How a completed file can be fetched.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DownloadReference {
    /// Follow this URL directly (S3-backed files, time-limited).
    Url { url: String },
    /// Fetch the bytes from this server-relative path (filesystem-backed).
    Stream { href: String },
}

/// Response from resolving a completed file for download.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub file_id: String,
    pub file_name: String,
    pub file_size: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub download: DownloadReference,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_flags() {
        assert!(SessionState::Created.is_active());
        assert!(SessionState::Receiving.is_active());
        assert!(!SessionState::Completing.is_active());
        assert!(!SessionState::Completing.is_terminal());
        for state in [SessionState::Done, SessionState::Aborted] {
            assert!(!state.is_active());
            assert!(state.is_terminal());
        }
    }

    #[test]
    fn test_session_state_serde_lowercase() {
        let json = serde_json::to_string(&SessionState::Receiving).unwrap();
        assert_eq!(json, "\"receiving\"");
        let back: SessionState = serde_json::from_str("\"aborted\"").unwrap();
        assert_eq!(back, SessionState::Aborted);
    }

    #[test]
    fn test_manifest_entry_etag_optional() {
        let entry: ManifestEntry = serde_json::from_str(r#"{"part_number":3}"#).unwrap();
        assert_eq!(entry.part_number, 3);
        assert!(entry.etag.is_none());

        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("etag"));

        let with_etag: ManifestEntry =
            serde_json::from_str(r#"{"part_number":1,"etag":"abc"}"#).unwrap();
        assert_eq!(with_etag.etag.as_deref(), Some("abc"));
    }

    #[test]
    fn test_download_reference_tagged() {
        let url = DownloadReference::Url {
            url: "https://example.com/x".to_string(),
        };
        let json = serde_json::to_string(&url).unwrap();
        assert!(json.contains("\"kind\":\"url\""));

        let stream: DownloadReference =
            serde_json::from_str(r#"{"kind":"stream","href":"/v1/files/x/content"}"#).unwrap();
        match stream {
            DownloadReference::Stream { href } => assert_eq!(href, "/v1/files/x/content"),
            _ => panic!("expected stream reference"),
        }
    }
}
