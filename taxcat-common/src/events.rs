//! Event types for the taxcat event system
//!
//! Provides the shared event definitions and the EventBus used to connect the
//! upload path, the manual-entry path and the query controller.

use crate::model::UploadProgress;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Where a catalog mutation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeSource {
    /// A bulk upload finished with every chunk acknowledged
    BulkUpload,
    /// A single record was created through the manual-entry path
    ManualEntry,
}

/// taxcat event types
///
/// Events are broadcast via EventBus and can be serialized for logging or
/// forwarding to a front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CatalogEvent {
    /// Bulk upload accepted for transmission
    UploadStarted {
        batch_id: Uuid,
        total: usize,
        chunk_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Emitted once before the first chunk and after every acknowledged chunk
    UploadProgress {
        batch_id: Uuid,
        progress: UploadProgress,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Every chunk of the batch was acknowledged
    UploadCompleted {
        batch_id: Uuid,
        committed: usize,
        elapsed_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A chunk failed; remaining chunks were not sent
    ///
    /// `committed` rows stay in the catalog.
    UploadFailed {
        batch_id: Uuid,
        committed: usize,
        failed_chunk: usize,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Catalog contents changed; listeners should refresh without resetting
    /// their page
    DataChanged {
        source: ChangeSource,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl CatalogEvent {
    /// Convenience constructor for DataChanged stamped with the current time
    pub fn data_changed(source: ChangeSource) -> Self {
        CatalogEvent::DataChanged {
            source,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use taxcat_common::events::{CatalogEvent, ChangeSource, EventBus};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(CatalogEvent::data_changed(ChangeSource::ManualEntry));
///
/// assert!(matches!(rx.try_recv(), Ok(CatalogEvent::DataChanged { .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CatalogEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: CatalogEvent,
    ) -> Result<usize, broadcast::error::SendError<CatalogEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: CatalogEvent) {
        let _ = self.tx.send(event);
    }
}
