//! Chunked uploader
//!
//! Sends normalized records to the catalog service in fixed-size chunks, one
//! request at a time. Chunk k+1 is only sent once chunk k is acknowledged,
//! which bounds request size and keeps each request inside the service's
//! duration budget.
//!
//! On the first failed chunk the remaining chunks are abandoned. Chunks
//! already acknowledged stay committed; nothing is rolled back.
//!
//! There is no client-side timeout on a chunk beyond the transport's own. A
//! chunk that hangs blocks the rest of its batch.

use crate::catalog::{CatalogError, CatalogService};
use crate::session::SessionContext;
use std::sync::Arc;
use std::time::Duration;
use taxcat_common::events::{CatalogEvent, ChangeSource, EventBus};
use taxcat_common::{Error as CommonError, NormalizedRecord, UploadProgress};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Uploader errors
#[derive(Debug, Error)]
pub enum UploadError {
    /// A chunk was rejected or never acknowledged
    ///
    /// `committed` rows from earlier chunks remain in the catalog.
    #[error(
        "Batch upload failed at chunk {failed_chunk} ({committed} records already committed): {cause}"
    )]
    BatchUploadFailed {
        batch_id: Uuid,
        /// Rows the service reported as committed before the failure
        committed: usize,
        /// Records acknowledged before the failure
        uploaded: usize,
        /// 0-based index of the chunk that failed
        failed_chunk: usize,
        cause: CatalogError,
    },
}

/// Result of a fully acknowledged batch
#[derive(Debug, Clone, PartialEq)]
pub struct UploadSummary {
    pub batch_id: Uuid,
    pub committed: usize,
    pub uploaded: usize,
    pub chunk_count: usize,
    pub elapsed: Duration,
}

/// Number of chunks needed for `total` records
pub fn chunk_count(total: usize, chunk_size: usize) -> usize {
    total.div_ceil(chunk_size.max(1))
}

/// Sequential, fail-fast bulk uploader
pub struct ChunkedUploader {
    catalog: Arc<dyn CatalogService>,
    chunk_size: usize,
    event_bus: EventBus,
}

impl ChunkedUploader {
    /// Create an uploader for an authenticated session
    ///
    /// `chunk_size` must be at least 1.
    pub fn new(
        session: &SessionContext,
        catalog: Arc<dyn CatalogService>,
        chunk_size: usize,
        event_bus: EventBus,
    ) -> taxcat_common::Result<Self> {
        session.require_authenticated()?;
        if chunk_size == 0 {
            return Err(CommonError::InvalidInput("chunk size must be at least 1".to_string()));
        }

        Ok(Self {
            catalog,
            chunk_size,
            event_bus,
        })
    }

    /// Upload every record; progress is only published on the event bus
    pub async fn upload(&self, records: Vec<NormalizedRecord>) -> Result<UploadSummary, UploadError> {
        self.upload_with_progress(records, |_| {}).await
    }

    /// Upload every record, reporting a progress snapshot before the first
    /// chunk and after each acknowledged chunk
    ///
    /// Records are moved out chunk by chunk and dropped once acknowledged.
    /// On success a `DataChanged` event is published.
    pub async fn upload_with_progress<F>(
        &self,
        records: Vec<NormalizedRecord>,
        mut on_progress: F,
    ) -> Result<UploadSummary, UploadError>
    where
        F: FnMut(UploadProgress),
    {
        let batch_id = Uuid::new_v4();
        let total = records.len();
        let chunks = chunk_count(total, self.chunk_size);
        let started = Instant::now();

        info!(%batch_id, total, chunks, chunk_size = self.chunk_size, "Starting bulk upload");
        self.event_bus.emit_lossy(CatalogEvent::UploadStarted {
            batch_id,
            total,
            chunk_count: chunks,
            timestamp: chrono::Utc::now(),
        });
        self.report(batch_id, UploadProgress::measure(0, total, Duration::ZERO), &mut on_progress);

        let mut uploaded = 0usize;
        let mut committed = 0usize;
        let mut remaining = records.into_iter();

        for chunk_index in 0..chunks {
            let chunk: Vec<NormalizedRecord> = remaining.by_ref().take(self.chunk_size).collect();

            debug!(%batch_id, chunk = chunk_index + 1, of = chunks, size = chunk.len(), "Sending chunk");

            match self.catalog.bulk_create(&chunk).await {
                Ok(count) => {
                    uploaded += chunk.len();
                    committed += count;

                    let progress = UploadProgress::measure(uploaded, total, started.elapsed());
                    debug!(
                        %batch_id,
                        chunk = chunk_index + 1,
                        uploaded,
                        total,
                        eta_seconds = ?progress.eta_seconds,
                        "Chunk acknowledged"
                    );
                    self.report(batch_id, progress, &mut on_progress);
                }
                Err(cause) => {
                    error!(
                        %batch_id,
                        chunk = chunk_index + 1,
                        committed,
                        error = %cause,
                        "Chunk failed; abandoning remaining chunks"
                    );
                    self.event_bus.emit_lossy(CatalogEvent::UploadFailed {
                        batch_id,
                        committed,
                        failed_chunk: chunk_index,
                        message: cause.to_string(),
                        timestamp: chrono::Utc::now(),
                    });
                    return Err(UploadError::BatchUploadFailed {
                        batch_id,
                        committed,
                        uploaded,
                        failed_chunk: chunk_index,
                        cause,
                    });
                }
            }
        }

        let elapsed = started.elapsed();
        info!(%batch_id, committed, elapsed_ms = elapsed.as_millis() as u64, "Bulk upload complete");

        self.event_bus.emit_lossy(CatalogEvent::UploadCompleted {
            batch_id,
            committed,
            elapsed_ms: elapsed.as_millis() as u64,
            timestamp: chrono::Utc::now(),
        });
        if total > 0 {
            self.event_bus
                .emit_lossy(CatalogEvent::data_changed(ChangeSource::BulkUpload));
        }

        Ok(UploadSummary {
            batch_id,
            committed,
            uploaded,
            chunk_count: chunks,
            elapsed,
        })
    }

    fn report<F>(&self, batch_id: Uuid, progress: UploadProgress, on_progress: &mut F)
    where
        F: FnMut(UploadProgress),
    {
        on_progress(progress);
        self.event_bus.emit_lossy(CatalogEvent::UploadProgress {
            batch_id,
            progress,
            timestamp: chrono::Utc::now(),
        });
    }
}
