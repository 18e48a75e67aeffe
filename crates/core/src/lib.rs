//! Core domain types for Depot.
//!
//! This crate defines the identifiers, session lifecycle types, wire DTOs,
//! and configuration shared by the storage, upload, and server crates.

pub mod config;
pub mod error;
pub mod id;
pub mod session;

pub use error::{Error, Result};
pub use id::{FileId, SessionId};
pub use session::{BackendKind, SessionState};

/// Default chunk size hint handed to clients at session creation (16 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 16 * 1024 * 1024;

/// Maximum accepted chunk size (32 MiB).
pub const MAX_CHUNK_SIZE: u64 = 32 * 1024 * 1024;

/// Maximum declared file size (30 GiB).
pub const MAX_FILE_SIZE: u64 = 30 * 1024 * 1024 * 1024;
