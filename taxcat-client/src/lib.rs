//! # taxcat client library
//!
//! Client-side core of the tax catalog:
//! - CSV normalization of bulk order files
//! - Chunked, sequential bulk upload with progress and ETA
//! - Debounced, filtered and paginated catalog queries
//! - Refresh orchestration driven by catalog change events

pub mod catalog;
pub mod normalizer;
pub mod orchestrator;
pub mod query;
pub mod session;
pub mod uploader;

pub use catalog::{CatalogError, CatalogService, HttpCatalogClient};
pub use orchestrator::{submit_manual_record, Orchestrator};
pub use query::{QueryController, QueryView};
pub use session::{AuthState, SessionContext};
pub use uploader::{ChunkedUploader, UploadError, UploadSummary};
