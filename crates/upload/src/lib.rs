//! Upload session orchestration for Depot.
//!
//! The [`Uploader`] owns the session registry and drives the session state
//! machine against a [`depot_storage::MultipartStore`] and a
//! [`depot_metadata::MetadataStore`]; the [`RetrievalGateway`] is the
//! matching read path for completed files.

pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod registry;
pub mod session;

pub use error::{UploadError, UploadResult};
pub use gateway::{DownloadResolution, RetrievalGateway};
pub use orchestrator::{BeginOutcome, PartAck, SessionView, UploadLimits, Uploader};
pub use registry::SessionRegistry;
pub use session::{PartSlot, UploadSession};
