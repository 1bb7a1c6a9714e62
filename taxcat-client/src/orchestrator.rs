//! Refresh orchestration
//!
//! Subscribes to the event bus and turns every `DataChanged` into a
//! non-page-resetting refresh of the query controller plus a refresh of the
//! cached global stats. Also hosts the manual single-record entry path, which
//! publishes `DataChanged` the same way the uploader does.

use crate::catalog::{CatalogError, CatalogService};
use crate::query::QueryController;
use crate::session::SessionContext;
use std::sync::Arc;
use taxcat_common::events::{CatalogEvent, ChangeSource, EventBus};
use taxcat_common::{ComputedRecord, NormalizedRecord};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Background task wiring catalog changes into refreshes
pub struct Orchestrator {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl Orchestrator {
    /// Subscribe to `event_bus` and start the refresh task
    ///
    /// Events emitted before this call are not seen.
    pub fn spawn(
        session: Arc<SessionContext>,
        catalog: Arc<dyn CatalogService>,
        controller: QueryController,
        event_bus: &EventBus,
    ) -> taxcat_common::Result<Self> {
        session.require_authenticated()?;

        let rx = event_bus.subscribe();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run(session, catalog, controller, rx, shutdown.clone()));

        Ok(Self { shutdown, handle })
    }

    /// Stop the task and wait for it to exit
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.handle.await {
            warn!("Orchestrator task ended abnormally: {}", e);
        }
    }
}

async fn run(
    session: Arc<SessionContext>,
    catalog: Arc<dyn CatalogService>,
    controller: QueryController,
    mut rx: broadcast::Receiver<CatalogEvent>,
    shutdown: CancellationToken,
) {
    debug!("Orchestrator started");

    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = rx.recv() => received,
        };

        match received {
            Ok(CatalogEvent::DataChanged { source, .. }) => {
                info!(?source, "Catalog changed; refreshing");
                refresh(&session, catalog.as_ref(), &controller).await;
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                // missed events may have included DataChanged
                warn!(skipped, "Orchestrator lagged; refreshing once");
                refresh(&session, catalog.as_ref(), &controller).await;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    debug!("Orchestrator stopped");
}

async fn refresh(session: &SessionContext, catalog: &dyn CatalogService, controller: &QueryController) {
    controller.refresh();
    if let Err(e) = session.refresh_stats(catalog).await {
        warn!(error = %e, "Stats refresh failed; keeping cached stats");
    }
}

/// Create one record through the catalog service and announce the change
///
/// A rejected record surfaces as `CatalogError::Validation` and publishes
/// nothing.
pub async fn submit_manual_record(
    catalog: &dyn CatalogService,
    event_bus: &EventBus,
    record: &NormalizedRecord,
) -> Result<ComputedRecord, CatalogError> {
    let computed = catalog.create_record(record).await?;
    debug!(id = computed.id, "Publishing DataChanged for manual entry");
    event_bus.emit_lossy(CatalogEvent::data_changed(ChangeSource::ManualEntry));
    Ok(computed)
}
