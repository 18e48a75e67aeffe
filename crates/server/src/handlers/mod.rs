//! HTTP handlers.

pub mod files;
pub mod health;
pub mod uploads;

pub use files::{download_file, resolve_file};
pub use health::health_check;
pub use uploads::{
    abort_upload, authorize_part, begin_upload, complete_upload, get_upload, upload_part,
};
