//! Application state shared across handlers.

use depot_core::config::AppConfig;
use depot_metadata::MetadataStore;
use depot_storage::MultipartStore;
use depot_upload::{RetrievalGateway, UploadLimits, Uploader};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn MultipartStore>,
    pub metadata: Arc<dyn MetadataStore>,
    pub uploader: Arc<Uploader>,
    pub gateway: Arc<RetrievalGateway>,
}

impl AppState {
    /// Create application state around the given backends.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn MultipartStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        let limits = UploadLimits::from_config(&config.server);
        let uploader = Arc::new(Uploader::new(storage.clone(), metadata.clone(), limits));
        let gateway = Arc::new(RetrievalGateway::new(metadata.clone(), storage.clone()));

        Self {
            config: Arc::new(config),
            storage,
            metadata,
            uploader,
            gateway,
        }
    }
}
