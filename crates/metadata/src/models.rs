//! Row types for the metadata store.

use time::OffsetDateTime;
use uuid::Uuid;

/// A completed file record.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletedFileRow {
    /// Primary key; the file ID minted at session creation.
    pub file_id: Uuid,
    /// Display name supplied at session creation.
    pub file_name: String,
    /// Assembled size in bytes.
    pub file_size: i64,
    /// Backend key the assembled object lives under.
    pub storage_key: String,
    /// Durable direct URL, if the backend produced one at completion time.
    pub download_url: Option<String>,
    /// When the upload completed.
    pub created_at: OffsetDateTime,
}
