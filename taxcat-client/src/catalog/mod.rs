//! Catalog service boundary
//!
//! The catalog service owns tax computation and storage. This module defines
//! the operations the client consumes from it; `HttpCatalogClient` is the
//! production implementation.

mod http;

pub use http::HttpCatalogClient;

use async_trait::async_trait;
use taxcat_common::{CatalogStats, ComputedRecord, NormalizedRecord, QueryFilter, QueryPage, QueryResult};
use thiserror::Error;

/// Catalog service errors
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    /// Service unreachable, connection reset, transport timeout
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body did not match the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// A single record was rejected by the service
    #[error("Record rejected: {0}")]
    Validation(String),
}

/// Operations offered by the catalog service
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Create one record; the service computes and returns its tax
    async fn create_record(&self, record: &NormalizedRecord) -> Result<ComputedRecord, CatalogError>;

    /// Create a batch of records; returns the number committed
    ///
    /// Must accept batches of the configured chunk size within the service's
    /// own request-duration budget.
    async fn bulk_create(&self, chunk: &[NormalizedRecord]) -> Result<usize, CatalogError>;

    /// One filtered page plus aggregates over the whole filtered set
    async fn query(&self, filter: &QueryFilter, page: QueryPage) -> Result<QueryResult, CatalogError>;

    /// Global, unfiltered summary
    async fn stats(&self) -> Result<CatalogStats, CatalogError>;
}
