//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Chunk size hint handed to clients at session creation.
    #[serde(default = "default_chunk_size")]
    pub default_chunk_size: u64,
    /// Maximum accepted chunk size in bytes.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u64,
    /// Maximum declared file size in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Validity window for presigned part-upload URLs, in seconds.
    #[serde(default = "default_part_url_ttl_secs")]
    pub part_url_ttl_secs: u64,
    /// Validity window for presigned download URLs, in seconds.
    #[serde(default = "default_download_url_ttl_secs")]
    pub download_url_ttl_secs: u64,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_chunk_size() -> u64 {
    crate::DEFAULT_CHUNK_SIZE
}

fn default_max_chunk_size() -> u64 {
    crate::MAX_CHUNK_SIZE
}

fn default_max_file_size() -> u64 {
    crate::MAX_FILE_SIZE
}

fn default_part_url_ttl_secs() -> u64 {
    900 // 15 minutes
}

fn default_download_url_ttl_secs() -> u64 {
    300 // 5 minutes
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            default_chunk_size: default_chunk_size(),
            max_chunk_size: default_max_chunk_size(),
            max_file_size: default_max_file_size(),
            part_url_ttl_secs: default_part_url_ttl_secs(),
            download_url_ttl_secs: default_download_url_ttl_secs(),
        }
    }
}

impl ServerConfig {
    /// Get the part URL validity window as a Duration.
    pub fn part_url_ttl(&self) -> Duration {
        Duration::from_secs(self.part_url_ttl_secs)
    }

    /// Get the download URL validity window as a Duration.
    pub fn download_url_ttl(&self) -> Duration {
        Duration::from_secs(self.download_url_ttl_secs)
    }

    /// Validate server configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.default_chunk_size == 0 || self.max_chunk_size == 0 {
            return Err("chunk sizes must be positive".to_string());
        }
        if self.default_chunk_size > self.max_chunk_size {
            return Err(format!(
                "default_chunk_size {} exceeds max_chunk_size {}",
                self.default_chunk_size, self.max_chunk_size
            ));
        }
        if self.max_file_size == 0 {
            return Err("max_file_size must be positive".to_string());
        }
        Ok(())
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for staged parts and assembled files.
        path: PathBuf,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to the ambient credential chain if not set.
        access_key_id: Option<String>,
        /// AWS secret access key. Falls back to the ambient credential chain if not set.
        secret_access_key: Option<String>,
        /// Force path-style URLs (`endpoint/bucket/key`). Required for MinIO
        /// and some S3-compatible services; AWS S3 wants virtual-hosted style.
        #[serde(default)]
        force_path_style: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                access_key_id,
                secret_access_key,
                ..
            } => match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                (Some(_), Some(_)) | (None, None) => Ok(()),
                _ => Err(
                    "s3 config requires both access_key_id and secret_access_key when either is set"
                        .to_string(),
                ),
            },
            _ => Ok(()),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            metadata: MetadataConfig::default(),
        }
    }
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses filesystem storage and SQLite metadata.
    pub fn for_testing() -> Self {
        Self::default()
    }

    /// Validate all configuration sections.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.storage.validate()?;
        Ok(())
    }
}
