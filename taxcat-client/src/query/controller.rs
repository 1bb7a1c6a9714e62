//! Filter query controller
//!
//! Owns filter and pagination state and keeps a display-ready view in sync
//! with it:
//!
//! ```text
//! Idle --(state change)--> Debouncing --(timer fires)--> Fetching --> Idle
//!             ^                 |  ^                        |
//!             |                 +--+ change: restart timer  |
//!             +---------------- change: mark fetch stale ---+
//! ```
//!
//! Only the controller's own setters mutate its state. The last
//! non-superseded fetch wins; a superseded fetch's response is dropped on
//! arrival no matter when it arrives.

use super::scheduler::{FlightGuard, SingleFlight};
use crate::catalog::{CatalogError, CatalogService};
use crate::session::SessionContext;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use taxcat_common::config::QueryConfig;
use taxcat_common::{ComputedRecord, QueryFilter, QueryPage, QueryResult};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Controller lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Debouncing,
    Fetching,
}

/// Filter + pagination state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryState {
    pub filter: QueryFilter,
    /// 1-indexed page number
    pub page: u32,
}

/// The last query failure (QueryFailed)
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFailure {
    pub message: String,
    pub at: chrono::DateTime<chrono::Utc>,
}

/// Display snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct QueryView {
    pub phase: Phase,
    /// Last applied result; cleared when the latest fetch failed
    pub result: Option<QueryResult>,
    pub failure: Option<QueryFailure>,
    /// Results applied so far
    pub applied: u64,
}

impl QueryView {
    /// Records of the current page (empty when nothing is displayed)
    pub fn records(&self) -> &[ComputedRecord] {
        self.result.as_ref().map(|r| r.records.as_slice()).unwrap_or(&[])
    }
}

/// Parse a numeric filter input; empty or unparsable text means "no bound"
pub fn parse_bound(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Convert a percentage input (8.875) to the rate fraction the service
/// filters on (0.08875)
pub fn percent_to_fraction(percent: f64) -> f64 {
    percent / 100.0
}

#[derive(Debug)]
struct ControllerState {
    query: QueryState,
    /// Page count from the last successful fetch; kept across failures
    known_total_pages: u32,
}

struct Inner {
    catalog: Arc<dyn CatalogService>,
    state: Mutex<ControllerState>,
    view: watch::Sender<QueryView>,
    flight: SingleFlight,
    debounce: Duration,
    page_size: u32,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: Phase) {
        self.view.send_modify(|v| v.phase = phase);
    }

    fn apply(&self, requested: &QueryState, outcome: Result<QueryResult, CatalogError>) {
        match outcome {
            Ok(result) => {
                info!(
                    page = result.page,
                    total = result.total_count,
                    rows = result.records.len(),
                    "Query result applied"
                );
                self.state().known_total_pages = result.total_pages.max(1);
                self.view.send_modify(|v| {
                    v.phase = Phase::Idle;
                    v.result = Some(result);
                    v.failure = None;
                    v.applied += 1;
                });
            }
            Err(e) => {
                warn!(page = requested.page, error = %e, "Query failed; clearing displayed records");
                self.view.send_modify(|v| {
                    v.phase = Phase::Idle;
                    v.result = None;
                    v.failure = Some(QueryFailure {
                        message: e.to_string(),
                        at: chrono::Utc::now(),
                    });
                });
            }
        }
    }
}

/// Live, debounced view over the catalog
///
/// Cheap to clone; clones share state. Must be used inside a tokio runtime.
/// Do not hold a borrow from `subscribe()` while calling a setter.
#[derive(Clone)]
pub struct QueryController {
    inner: Arc<Inner>,
}

impl QueryController {
    /// Create a controller for an authenticated session
    ///
    /// Nothing is fetched until the first state change or `refresh`.
    pub fn new(
        session: &SessionContext,
        catalog: Arc<dyn CatalogService>,
        config: &QueryConfig,
    ) -> taxcat_common::Result<Self> {
        session.require_authenticated()?;

        let (view, _) = watch::channel(QueryView {
            phase: Phase::Idle,
            result: None,
            failure: None,
            applied: 0,
        });

        Ok(Self {
            inner: Arc::new(Inner {
                catalog,
                state: Mutex::new(ControllerState {
                    query: QueryState {
                        filter: QueryFilter::default(),
                        page: 1,
                    },
                    known_total_pages: 1,
                }),
                view,
                flight: SingleFlight::new(),
                debounce: config.debounce(),
                page_size: config.page_size,
            }),
        })
    }

    /// Current filter + pagination state
    pub fn state(&self) -> QueryState {
        self.inner.state().query.clone()
    }

    /// Current display snapshot
    pub fn view(&self) -> QueryView {
        self.inner.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<QueryView> {
        self.inner.view.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.inner.view.borrow().phase
    }

    /// County text field; empty text removes the predicate
    pub fn set_county_prefix(&self, text: &str) {
        let county = Some(text.trim().to_string()).filter(|s| !s.is_empty());
        self.update_filter(|f| f.county_prefix = county);
    }

    pub fn set_min_subtotal(&self, bound: Option<f64>) {
        self.update_filter(|f| f.min_subtotal = bound);
    }

    pub fn set_min_tax(&self, bound: Option<f64>) {
        self.update_filter(|f| f.min_tax = bound);
    }

    /// Minimum rate as a percentage, e.g. 8.875 for 8.875 %
    pub fn set_min_rate_percent(&self, percent: Option<f64>) {
        self.update_filter(|f| f.min_rate_fraction = percent.map(percent_to_fraction));
    }

    pub fn set_include_error_rows(&self, include: bool) {
        self.update_filter(|f| f.include_error_rows = include);
    }

    /// Replace the whole filter at once
    pub fn set_filter(&self, filter: QueryFilter) {
        self.update_filter(|f| *f = filter);
    }

    /// Jump to a page (values below 1 become 1); filters are untouched
    pub fn set_page(&self, page: u32) {
        self.update_page(|_| page);
    }

    /// Next page, clamped to the last known page count
    ///
    /// Never moves backwards, even when `set_page` jumped past that count.
    pub fn next_page(&self) {
        self.update_page(|state| {
            let last = state.known_total_pages.max(state.query.page);
            state.query.page.saturating_add(1).min(last)
        });
    }

    pub fn previous_page(&self) {
        self.update_page(|state| state.query.page.saturating_sub(1));
    }

    /// Re-fetch with the current state; page is not reset
    pub fn refresh(&self) {
        debug!("Refresh requested");
        self.schedule();
    }

    /// Wait until no fetch is pending, debounced or in flight
    ///
    /// Setters leave `Idle` synchronously, so calling this right after a
    /// setter waits for that change's result.
    pub async fn wait_idle(&self) -> QueryView {
        let mut rx = self.subscribe();
        let view = match rx.wait_for(|v| v.phase == Phase::Idle).await {
            Ok(view) => view.clone(),
            Err(_) => self.view(),
        };
        view
    }

    fn update_filter(&self, mutate: impl FnOnce(&mut QueryFilter)) {
        let changed = {
            let mut state = self.inner.state();
            let before = state.query.clone();
            mutate(&mut state.query.filter);
            // any filter change starts over at page 1
            if state.query.filter != before.filter {
                state.query.page = 1;
            }
            state.query != before
        };
        if changed {
            self.schedule();
        }
    }

    fn update_page(&self, next: impl FnOnce(&ControllerState) -> u32) {
        let changed = {
            let mut state = self.inner.state();
            let page = next(&state).max(1);
            let changed = page != state.query.page;
            state.query.page = page;
            changed
        };
        if changed {
            self.schedule();
        }
    }

    fn schedule(&self) {
        let inner = Arc::clone(&self.inner);
        let armed = Arc::clone(&self.inner);
        let generation = self.inner.flight.schedule(
            self.inner.debounce,
            move || armed.set_phase(Phase::Debouncing),
            move |guard| run_fetch(inner, guard),
        );
        debug!(generation, "Fetch scheduled");
    }
}

async fn run_fetch(inner: Arc<Inner>, guard: FlightGuard) {
    // state is read when the timer fires, not when the change was made
    let Some(requested) = guard.commit(|| {
        inner.set_phase(Phase::Fetching);
        inner.state().query.clone()
    }) else {
        return;
    };

    let page = QueryPage::new(requested.page, inner.page_size);
    debug!(generation = guard.generation(), page = page.number, "Fetching");
    let outcome = inner.catalog.query(&requested.filter, page).await;

    if guard.commit(|| inner.apply(&requested, outcome)).is_none() {
        debug!(generation = guard.generation(), "Discarding superseded response");
    }
}
