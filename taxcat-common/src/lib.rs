//! # taxcat common library
//!
//! Shared code for the taxcat catalog client including:
//! - Domain records (normalized input, computed catalog rows, query types)
//! - Event types (CatalogEvent enum) and the EventBus
//! - Configuration loading
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod time;

pub use error::{Error, Result};
pub use model::{
    CatalogStats, ComputedRecord, NormalizedRecord, QueryFilter, QueryPage, QueryResult,
    UploadProgress,
};
