//! Completed-file metadata store for Depot.

pub mod error;
pub mod models;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use models::CompletedFileRow;
pub use store::{MetadataStore, SqliteStore};

use depot_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store))
        }
    }
}
